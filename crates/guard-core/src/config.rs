//! Configuration management for the PNL guard.
//!
//! Resolution order is environment, then an optional TOML file, then
//! built-in defaults. Keys are the lower-cased environment variable names,
//! so `DAILY_STOPLOSS=-500` and `daily_stoploss = -500` are equivalent.
//!
//! [`Settings`] is the raw, flat view; [`Settings::validate`] turns it into
//! the typed [`AppConfig`] or reports every problem at once.

use crate::{Error, Result};
use chrono::{FixedOffset, NaiveTime};
use config::{Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default Dhan REST endpoint.
pub const DEFAULT_DHAN_BASE_URL: &str = "https://api.dhan.co/v2";

/// Raw settings, as resolved from the configuration layers.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub dhan_access_token: Option<String>,
    pub dhan_client_id: Option<String>,
    pub dhan_base_url: String,
    pub request_timeout_seconds: u64,

    pub daily_stoploss: Option<Decimal>,
    pub daily_target: Option<Decimal>,
    pub check_interval_seconds: i64,

    pub market_start_time: String,
    pub market_end_time: String,
    pub market_weekdays_only: bool,
    pub market_utc_offset_minutes: Option<i32>,

    pub enable_trailing_stoploss: bool,
    pub trailing_stoploss_activate_profit: Decimal,
    pub trailing_stoploss_trail_percent: Decimal,

    pub enable_position_percent_take: bool,
    pub position_percent_take: Decimal,
    pub enable_position_percent_stoploss: bool,
    pub position_percent_stoploss: Decimal,

    pub enable_kill_switch: bool,

    pub telegram_enabled: bool,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub send_pnl_updates: bool,
    pub send_only_alerts: bool,
    pub telegram_pnl_interval_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dhan_access_token: None,
            dhan_client_id: None,
            dhan_base_url: DEFAULT_DHAN_BASE_URL.to_string(),
            request_timeout_seconds: 10,
            daily_stoploss: None,
            daily_target: None,
            check_interval_seconds: 60,
            market_start_time: "09:15".to_string(),
            market_end_time: "15:30".to_string(),
            market_weekdays_only: true,
            market_utc_offset_minutes: None,
            enable_trailing_stoploss: false,
            trailing_stoploss_activate_profit: Decimal::ZERO,
            trailing_stoploss_trail_percent: Decimal::ZERO,
            enable_position_percent_take: false,
            position_percent_take: Decimal::ZERO,
            enable_position_percent_stoploss: false,
            position_percent_stoploss: Decimal::ZERO,
            enable_kill_switch: false,
            telegram_enabled: false,
            telegram_bot_token: None,
            telegram_chat_id: None,
            send_pnl_updates: false,
            send_only_alerts: false,
            telegram_pnl_interval_seconds: 0,
        }
    }
}

impl Settings {
    /// Resolve settings from `.env`, the process environment and an optional
    /// TOML file.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = Self::defaults()?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::default().try_parsing(true));

        Ok(builder.build()?.try_deserialize()?)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let d = Settings::default();
        Ok(config::Config::builder()
            .set_default("dhan_base_url", d.dhan_base_url)?
            .set_default("request_timeout_seconds", d.request_timeout_seconds)?
            .set_default("check_interval_seconds", d.check_interval_seconds)?
            .set_default("market_start_time", d.market_start_time)?
            .set_default("market_end_time", d.market_end_time)?
            .set_default("market_weekdays_only", d.market_weekdays_only)?
            .set_default("enable_trailing_stoploss", false)?
            .set_default("trailing_stoploss_activate_profit", "0")?
            .set_default("trailing_stoploss_trail_percent", "0")?
            .set_default("enable_position_percent_take", false)?
            .set_default("position_percent_take", "0")?
            .set_default("enable_position_percent_stoploss", false)?
            .set_default("position_percent_stoploss", "0")?
            .set_default("enable_kill_switch", false)?
            .set_default("telegram_enabled", false)?
            .set_default("send_pnl_updates", false)?
            .set_default("send_only_alerts", false)?
            .set_default("telegram_pnl_interval_seconds", 0)?)
    }

    /// Check every constraint and build the typed configuration.
    ///
    /// All violations are collected into a single [`Error::Config`].
    pub fn validate(&self) -> Result<AppConfig> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let access_token = non_empty(&self.dhan_access_token);
        if access_token.is_none() {
            errors.push("DHAN_ACCESS_TOKEN not configured".to_string());
        }

        let daily_stoploss = match self.daily_stoploss {
            None => {
                errors.push("DAILY_STOPLOSS not configured".to_string());
                Decimal::ZERO
            }
            Some(stoploss) if stoploss >= Decimal::ZERO => {
                errors.push(format!("DAILY_STOPLOSS ({}) must be negative", stoploss));
                stoploss
            }
            Some(stoploss) => stoploss,
        };
        let daily_target = match self.daily_target {
            None => {
                errors.push("DAILY_TARGET not configured".to_string());
                Decimal::ZERO
            }
            Some(target) if target <= Decimal::ZERO => {
                errors.push(format!("DAILY_TARGET ({}) must be positive", target));
                target
            }
            Some(target) => target,
        };
        if self.check_interval_seconds < 1 {
            errors.push("CHECK_INTERVAL_SECONDS must be at least 1".to_string());
        }
        if self.request_timeout_seconds < 1 {
            errors.push("REQUEST_TIMEOUT_SECONDS must be at least 1".to_string());
        }

        let trailing = if self.enable_trailing_stoploss {
            if self.trailing_stoploss_activate_profit <= Decimal::ZERO {
                errors.push("TRAILING_STOPLOSS_ACTIVATE_PROFIT must be positive".to_string());
            }
            let pct = self.trailing_stoploss_trail_percent;
            if pct <= Decimal::ZERO || pct >= Decimal::ONE_HUNDRED {
                errors.push("TRAILING_STOPLOSS_TRAIL_PERCENT must be between 0 and 100".to_string());
            }
            Some(TrailingConfig {
                activation_profit: self.trailing_stoploss_activate_profit,
                trail_percent: pct,
            })
        } else {
            None
        };

        let position_take_profit_pct = if self.enable_position_percent_take {
            if self.position_percent_take <= Decimal::ZERO {
                errors.push("POSITION_PERCENT_TAKE must be positive".to_string());
            }
            Some(self.position_percent_take)
        } else {
            None
        };
        let position_stoploss_pct = if self.enable_position_percent_stoploss {
            if self.position_percent_stoploss <= Decimal::ZERO {
                errors.push("POSITION_PERCENT_STOPLOSS must be positive".to_string());
            }
            Some(self.position_percent_stoploss)
        } else {
            None
        };

        let telegram = if self.telegram_enabled {
            let bot_token = non_empty(&self.telegram_bot_token);
            let chat_id = non_empty(&self.telegram_chat_id);
            if bot_token.is_none() {
                errors.push("TELEGRAM_BOT_TOKEN not configured (Telegram is enabled)".to_string());
            }
            if chat_id.is_none() {
                errors.push("TELEGRAM_CHAT_ID not configured (Telegram is enabled)".to_string());
            }
            match (bot_token, chat_id) {
                (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
                _ => None,
            }
        } else {
            None
        };

        let start = parse_time("MARKET_START_TIME", &self.market_start_time, &mut errors);
        let end = parse_time("MARKET_END_TIME", &self.market_end_time, &mut errors);
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                errors.push(format!(
                    "MARKET_START_TIME ({}) must not be after MARKET_END_TIME ({})",
                    self.market_start_time, self.market_end_time
                ));
            }
        }

        let utc_offset = match self.market_utc_offset_minutes {
            Some(minutes) => {
                let offset = FixedOffset::east_opt(minutes * 60);
                if offset.is_none() {
                    errors.push(format!("MARKET_UTC_OFFSET_MINUTES ({}) is out of range", minutes));
                }
                offset
            }
            None => None,
        };

        if !errors.is_empty() {
            return Err(Error::Config {
                message: errors.join("; "),
            });
        }

        let status_interval = match self.telegram_pnl_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let pnl_updates = telegram.is_some() && self.send_pnl_updates;

        if self.send_pnl_updates && telegram.is_none() {
            warnings.push(
                "SEND_PNL_UPDATES is set but Telegram is disabled; no PNL updates are sent"
                    .to_string(),
            );
        }
        if pnl_updates && self.send_only_alerts {
            warnings.push(
                "SEND_ONLY_ALERTS overrides SEND_PNL_UPDATES; only alerts are sent".to_string(),
            );
        }
        if status_interval.is_some() && !pnl_updates {
            warnings.push(format!(
                "TELEGRAM_PNL_INTERVAL_SECONDS ({}) has no effect without PNL updates",
                self.telegram_pnl_interval_seconds
            ));
        }

        Ok(AppConfig {
            broker: BrokerConfig {
                access_token: access_token.unwrap_or_default(),
                client_id: non_empty(&self.dhan_client_id),
                base_url: self.dhan_base_url.trim_end_matches('/').to_string(),
                request_timeout: Duration::from_secs(self.request_timeout_seconds),
            },
            risk: RiskConfig {
                daily_stoploss,
                daily_target,
                trailing,
                position_take_profit_pct,
                position_stoploss_pct,
                kill_switch_enabled: self.enable_kill_switch,
                notifications: NotificationPolicy {
                    pnl_updates,
                    alerts_only: self.send_only_alerts,
                    per_check: status_interval.is_none(),
                    top_positions: NotificationPolicy::DEFAULT_TOP_POSITIONS,
                },
            },
            market: MarketConfig {
                start: start.unwrap_or_default(),
                end: end.unwrap_or_default(),
                weekdays_only: self.market_weekdays_only,
                utc_offset,
            },
            schedule: ScheduleConfig {
                check_interval: Duration::from_secs(self.check_interval_seconds as u64),
                status_interval: if pnl_updates { status_interval } else { None },
            },
            alerts: AlertsConfig { telegram },
            warnings,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_time(key: &str, value: &str, errors: &mut Vec<String>) -> Option<NaiveTime> {
    let value = value.trim();
    match NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
    {
        Ok(time) => Some(time),
        Err(_) => {
            errors.push(format!("{} ({}) must be HH:MM", key, value));
            None
        }
    }
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub risk: RiskConfig,
    pub market: MarketConfig,
    pub schedule: ScheduleConfig,
    pub alerts: AlertsConfig,
    /// Non-fatal findings to log at startup.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub access_token: String,
    /// Fallback client id for orders when positions do not carry one.
    pub client_id: Option<String>,
    pub base_url: String,
    pub request_timeout: Duration,
}

/// Limits and features of the risk engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    /// Loss threshold (normally negative).
    pub daily_stoploss: Decimal,
    /// Profit threshold.
    pub daily_target: Decimal,
    pub trailing: Option<TrailingConfig>,
    /// Close a position once its PNL reaches this percent of invested value.
    pub position_take_profit_pct: Option<Decimal>,
    /// Close a position once its PNL falls to minus this percent.
    pub position_stoploss_pct: Option<Decimal>,
    pub kill_switch_enabled: bool,
    pub notifications: NotificationPolicy,
}

impl RiskConfig {
    /// Bare limits with every optional feature off.
    pub fn new(daily_stoploss: Decimal, daily_target: Decimal) -> Self {
        Self {
            daily_stoploss,
            daily_target,
            trailing: None,
            position_take_profit_pct: None,
            position_stoploss_pct: None,
            kill_switch_enabled: false,
            notifications: NotificationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingConfig {
    /// PNL at which trailing starts.
    pub activation_profit: Decimal,
    /// Distance of the stoploss below PNL, in percent.
    pub trail_percent: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPolicy {
    /// Send PNL updates at all.
    pub pnl_updates: bool,
    /// Only breach/exit/failure alerts, never PNL updates.
    pub alerts_only: bool,
    /// Send the PNL update on every check rather than on a separate cadence.
    pub per_check: bool,
    /// Positions listed in a PNL update.
    pub top_positions: usize,
}

impl NotificationPolicy {
    pub const DEFAULT_TOP_POSITIONS: usize = 5;

    pub fn sends_pnl_updates(&self) -> bool {
        self.pnl_updates && !self.alerts_only
    }
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            pnl_updates: false,
            alerts_only: false,
            per_check: true,
            top_positions: Self::DEFAULT_TOP_POSITIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketConfig {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub weekdays_only: bool,
    /// Evaluate the window at this offset instead of host-local time.
    pub utc_offset: Option<FixedOffset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub check_interval: Duration,
    /// Separate PNL-update cadence, when configured.
    pub status_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertsConfig {
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[cfg(test)]
impl Settings {
    /// Resolve settings from a TOML document on top of the defaults only.
    fn from_toml(toml: &str) -> Result<Self> {
        Ok(Self::defaults()?
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }
}
