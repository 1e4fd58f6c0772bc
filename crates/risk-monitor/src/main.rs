//! Risk Monitor
//!
//! Watches the day's PNL on a Dhan account and de-risks it when the daily
//! stoploss or target is hit.

mod messages;
mod notifier;

use anyhow::{Context, Result};
use clap::Parser;
use guard_core::api::DhanClient;
use guard_core::config::{AppConfig, Settings};
use guard_core::{Notifier, NullNotifier, OrderGateway, RiskEvent, SnapshotProvider};
use risk_manager::{Driver, DriverConfig, DriverExit, MarketSession, RiskEngine};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trading_engine::{ActionExecutor, ExecutorConfig, PaperGateway};

use crate::messages::MessageRenderer;
use crate::notifier::{display_offset, NotifierWorker, TelegramNotifier};

#[derive(Debug, Parser)]
#[command(name = "risk-monitor", version, about)]
struct Args {
    /// TOML file layered under the environment.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fetch real positions but route orders and the kill switch to a paper
    /// gateway.
    #[arg(long)]
    dry_run: bool,

    /// Run a single check and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Risk monitor failed to start");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "risk_monitor=info,risk_manager=info,trading_engine=info,guard_core=info".into()
        }))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn run(args: Args) -> Result<()> {
    info!("Starting Risk Monitor");

    let settings = Settings::load(args.config.as_deref()).context("loading configuration")?;
    let config = settings.validate().context("invalid configuration")?;
    log_configuration(&config, &args);

    let (notifier, worker) = build_notifier(&config)?;

    let client = Arc::new(DhanClient::new(&config.broker).context("building Dhan client")?);
    let gateway: Arc<dyn OrderGateway> = if args.dry_run {
        warn!("DRY RUN: orders and kill switch go to the paper gateway");
        Arc::new(PaperGateway::new())
    } else {
        client.clone()
    };
    let provider: Arc<dyn SnapshotProvider> = client;

    let executor = ActionExecutor::new(
        gateway,
        ExecutorConfig {
            call_timeout: config.broker.request_timeout,
        },
    );
    let engine = RiskEngine::new(config.risk.clone(), provider, executor, notifier.clone());
    let session = MarketSession::from_config(&config.market);
    let driver = Driver::new(
        engine,
        session,
        DriverConfig::from_config(&config.schedule, &config.market),
    );

    notifier.emit(RiskEvent::Startup {
        daily_stoploss: config.risk.daily_stoploss,
        daily_target: config.risk.daily_target,
        check_interval_secs: config.schedule.check_interval.as_secs(),
        market_open: config.market.start,
        market_close: config.market.end,
        kill_switch_enabled: config.risk.kill_switch_enabled,
    });

    monitor(driver, args.once, shutdown_signal()).await;

    drop(notifier);
    if let Some(worker) = worker {
        worker.finish(Duration::from_secs(10)).await;
    }
    Ok(())
}

/// Takes the driver by value: the engine's notifier handle is released when
/// this returns, which lets the notifier worker drain and stop.
async fn monitor(mut driver: Driver, once: bool, shutdown: impl Future<Output = ()>) {
    if once {
        match driver.run_once().await {
            Some(outcome) => info!(outcome = %outcome, "Single check complete"),
            None => info!("Outside market hours, nothing checked"),
        }
        driver.log_metrics();
        return;
    }

    info!("Press Ctrl+C to stop");
    match driver.run(shutdown).await {
        DriverExit::Terminal(outcome) => {
            warn!(outcome = %outcome, "Monitoring stopped for the day");
        }
        DriverExit::Shutdown => info!("Risk monitor stopped by user"),
    }
}

fn build_notifier(config: &AppConfig) -> Result<(Arc<dyn Notifier>, Option<NotifierWorker>)> {
    match &config.alerts.telegram {
        Some(telegram) => {
            let renderer = MessageRenderer::new(display_offset(config.market.utc_offset));
            let (notifier, worker) = TelegramNotifier::spawn(
                telegram.clone(),
                renderer,
                config.broker.request_timeout,
            )
            .context("starting Telegram notifier")?;
            Ok((Arc::new(notifier), Some(worker)))
        }
        None => Ok((Arc::new(NullNotifier), None)),
    }
}

fn log_configuration(config: &AppConfig, args: &Args) {
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    let risk = &config.risk;
    info!(
        daily_stoploss = %risk.daily_stoploss,
        daily_target = %risk.daily_target,
        check_interval_secs = config.schedule.check_interval.as_secs(),
        market_open = %config.market.start.format("%H:%M"),
        market_close = %config.market.end.format("%H:%M"),
        kill_switch = risk.kill_switch_enabled,
        telegram = config.alerts.telegram.is_some(),
        dry_run = args.dry_run,
        "Configuration loaded"
    );
    if let Some(trailing) = &risk.trailing {
        info!(
            activation_profit = %trailing.activation_profit,
            trail_percent = %trailing.trail_percent,
            "Trailing stoploss enabled"
        );
    }
    if risk.position_take_profit_pct.is_some() || risk.position_stoploss_pct.is_some() {
        info!(
            take_profit_pct = ?risk.position_take_profit_pct,
            stoploss_pct = ?risk.position_stoploss_pct,
            "Per-position percent exits enabled"
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
