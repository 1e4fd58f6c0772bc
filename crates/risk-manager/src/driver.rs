//! Scheduling driver.
//!
//! Runs the engine on the check cadence, and PNL status updates on an
//! optional second cadence, both gated by the market session. Both cadences
//! are arms of one `select!` loop, so the engine is only ever touched by one
//! caller at a time.

use chrono::{FixedOffset, NaiveDateTime};
use guard_core::config::{MarketConfig, ScheduleConfig};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::RiskEngine;
use crate::market_clock::{now_at, MarketSession};
use crate::outcome::Outcome;

/// Driver timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub check_interval: Duration,
    /// Separate PNL status cadence; `None` leaves updates to each check.
    pub status_interval: Option<Duration>,
    /// Exchange offset for the session window; host-local time when `None`.
    pub utc_offset: Option<FixedOffset>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            status_interval: None,
            utc_offset: None,
        }
    }
}

impl DriverConfig {
    pub fn from_config(schedule: &ScheduleConfig, market: &MarketConfig) -> Self {
        Self {
            check_interval: schedule.check_interval,
            status_interval: schedule.status_interval,
            utc_offset: market.utc_offset,
        }
    }
}

/// Why [`Driver::run`] returned.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverExit {
    /// The engine reached a terminal outcome.
    Terminal(Outcome),
    Shutdown,
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Owns the engine and decides when it runs.
pub struct Driver {
    engine: RiskEngine,
    session: MarketSession,
    config: DriverConfig,
    clock: Clock,
}

impl Driver {
    pub fn new(engine: RiskEngine, session: MarketSession, config: DriverConfig) -> Self {
        let offset = config.utc_offset;
        Self {
            engine,
            session,
            config,
            clock: Box::new(move || now_at(offset)),
        }
    }

    /// Replace the wall clock used for the session gate.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    fn market_open(&self) -> bool {
        self.session.is_open((self.clock)())
    }

    /// One gated check. `None` when outside market hours.
    pub async fn run_once(&mut self) -> Option<Outcome> {
        if !self.market_open() {
            info!(session = %self.session, "Outside market hours, skipping check");
            return None;
        }

        let outcome = self.engine.check().await;
        match &outcome {
            Outcome::WithinLimits => debug!("Check complete"),
            Outcome::DataUnavailable {
                error,
                transient: true,
            } => warn!(error = %error, "Check skipped, no data"),
            Outcome::DataUnavailable { error, .. } => {
                error!(error = %error, "Check skipped, fetch keeps failing until fixed");
            }
            Outcome::KillSwitchFailed(_) => {
                error!(detail = %outcome.detail(), "Kill switch activation FAILED, retrying next check");
            }
            _ => warn!(outcome = %outcome, "Stopping monitoring"),
        }
        Some(outcome)
    }

    /// Log what the executor did over the session.
    pub fn log_metrics(&self) {
        let metrics = self.engine.executor().metrics();
        info!(
            orders_placed = metrics.orders_placed,
            orders_failed = metrics.orders_failed,
            cancels_succeeded = metrics.cancels_succeeded,
            cancels_failed = metrics.cancels_failed,
            kill_switch_attempts = metrics.kill_switch_attempts,
            "Session actions"
        );
    }

    /// Run until a terminal outcome or until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F) -> DriverExit
    where
        F: Future<Output = ()>,
    {
        let mut checks = interval(self.config.check_interval);
        checks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut status = self.config.status_interval.map(|period| {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticks
        });

        info!(
            check_interval_secs = self.config.check_interval.as_secs(),
            status_interval = ?self.config.status_interval,
            session = %self.session,
            "Monitoring started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    self.log_metrics();
                    return DriverExit::Shutdown;
                }
                _ = checks.tick() => {
                    if let Some(outcome) = self.run_once().await {
                        if outcome.is_terminal() {
                            self.log_metrics();
                            return DriverExit::Terminal(outcome);
                        }
                    }
                }
                _ = next_tick(&mut status) => {
                    if self.market_open() {
                        self.engine.status_update();
                    } else {
                        debug!("Outside market hours, skipping status update");
                    }
                }
            }
        }
    }
}

async fn next_tick(ticks: &mut Option<Interval>) {
    match ticks {
        Some(ticks) => {
            ticks.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use guard_core::config::{NotificationPolicy, RiskConfig};
    use guard_core::types::{Position, Snapshot};
    use guard_core::{MemoryNotifier, MockOrderGateway, MockSnapshotProvider};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use trading_engine::{ActionExecutor, ExecutorConfig};

    fn monday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn saturday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 8)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn snapshot(pnl: i64) -> Snapshot {
        Snapshot::new(vec![
            Position::new("BANKNIFTY", 15).with_pnl(Decimal::ZERO, Decimal::new(pnl, 0))
        ])
    }

    fn counting_provider(pnl: i64, fetches: Arc<AtomicUsize>) -> MockSnapshotProvider {
        let mut provider = MockSnapshotProvider::new();
        provider.expect_fetch().returning(move || {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(snapshot(pnl))
        });
        provider
    }

    fn quiet_gateway() -> MockOrderGateway {
        let mut gateway = MockOrderGateway::new();
        gateway.expect_list_orders().returning(|| Ok(Vec::new()));
        gateway
            .expect_place_market_order()
            .returning(|_, _, _| Ok("ORD-1".to_string()));
        gateway
    }

    fn driver(
        config: RiskConfig,
        provider: MockSnapshotProvider,
        gateway: MockOrderGateway,
        driver_config: DriverConfig,
    ) -> (Driver, Arc<MemoryNotifier>) {
        let notifier = Arc::new(MemoryNotifier::new());
        let executor = ActionExecutor::new(Arc::new(gateway), ExecutorConfig::default());
        let engine = RiskEngine::new(config, Arc::new(provider), executor, notifier.clone());
        let session = MarketSession::parse("09:15", "15:30").unwrap();
        let driver = Driver::new(engine, session, driver_config).with_clock(monday_noon);
        (driver, notifier)
    }

    fn limits() -> RiskConfig {
        RiskConfig::new(Decimal::new(-1000, 0), Decimal::new(2000, 0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_checks_run_on_cadence_until_shutdown() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let (driver, _) = driver(
            limits(),
            counting_provider(100, fetches.clone()),
            MockOrderGateway::new(),
            DriverConfig::default(),
        );

        let exit = driver
            .run(tokio::time::sleep(Duration::from_secs(185)))
            .await;

        assert_eq!(exit, DriverExit::Shutdown);
        // Immediately, then at 60, 120 and 180 seconds
        assert_eq!(fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_outcome_stops_loop() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let (driver, notifier) = driver(
            limits(),
            counting_provider(-1100, fetches.clone()),
            quiet_gateway(),
            DriverConfig::default(),
        );

        let exit = driver.run(std::future::pending()).await;

        match exit {
            DriverExit::Terminal(Outcome::StoplossBreached(report)) => {
                assert_eq!(report.pnl, Decimal::new(-1100, 0));
            }
            other => panic!("unexpected exit: {:?}", other),
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.count("threshold_breach"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_kill_switch_keeps_running() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let mut gateway = quiet_gateway();
        let mut attempts = 0;
        gateway.expect_activate_kill_switch().times(2).returning(move || {
            attempts += 1;
            if attempts == 1 {
                Ok("DEACTIVATED".to_string())
            } else {
                Ok("ACTIVATED".to_string())
            }
        });

        let config = RiskConfig {
            kill_switch_enabled: true,
            ..limits()
        };
        let (driver, _) = driver(
            config,
            counting_provider(-1100, fetches.clone()),
            gateway,
            DriverConfig::default(),
        );

        let exit = driver.run(std::future::pending()).await;
        assert!(matches!(exit, DriverExit::Terminal(Outcome::StoplossBreached(_))));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outside_market_hours_skips() {
        let mut provider = MockSnapshotProvider::new();
        provider.expect_fetch().never();

        let (driver, _) = driver(
            limits(),
            provider,
            MockOrderGateway::new(),
            DriverConfig::default(),
        );
        let mut driver = driver.with_clock(saturday_noon);

        assert_eq!(driver.run_once().await, None);
        let exit = driver
            .run(tokio::time::sleep(Duration::from_secs(300)))
            .await;
        assert_eq!(exit, DriverExit::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_cadence_is_independent() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let config = RiskConfig {
            notifications: NotificationPolicy {
                pnl_updates: true,
                per_check: false,
                ..Default::default()
            },
            ..limits()
        };
        let (driver, notifier) = driver(
            config,
            counting_provider(250, fetches.clone()),
            MockOrderGateway::new(),
            DriverConfig {
                check_interval: Duration::from_secs(60),
                status_interval: Some(Duration::from_secs(30)),
                utc_offset: None,
            },
        );

        let exit = driver.run(tokio::time::sleep(Duration::from_secs(95))).await;

        assert_eq!(exit, DriverExit::Shutdown);
        // Checks at 0 and 60; status at 30, 60 and 90
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.count("pnl_update"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_metrics_cover_the_session() {
        let (mut driver, _) = driver(
            limits(),
            counting_provider(-1100, Arc::new(AtomicUsize::new(0))),
            quiet_gateway(),
            DriverConfig::default(),
        );

        let outcome = driver.run_once().await;
        assert!(matches!(outcome, Some(Outcome::StoplossBreached(_))));

        let metrics = driver.engine().executor().metrics();
        assert_eq!(metrics.orders_placed, 1);
        assert_eq!(metrics.kill_switch_attempts, 0);
        driver.log_metrics();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_reports_data_unavailable() {
        let mut provider = MockSnapshotProvider::new();
        provider
            .expect_fetch()
            .returning(|| Err(guard_core::Error::timeout("fetch positions")));

        let (mut driver, notifier) = driver(
            limits(),
            provider,
            MockOrderGateway::new(),
            DriverConfig::default(),
        );

        let outcome = driver.run_once().await;
        assert!(matches!(outcome, Some(Outcome::DataUnavailable { .. })));
        assert_eq!(notifier.count("error"), 1);
        assert!(!driver.engine().kill_switch_triggered());
    }
}
