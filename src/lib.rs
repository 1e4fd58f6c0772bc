//! PNL Guard: intraday risk control for a Dhan account
//!
//! This is the root crate that provides benchmark and integration test access
//! to the workspace. For actual functionality, use the individual crates:
//!
//! - `guard-core`: Shared types, collaborator traits, configuration, Dhan client
//! - `trading-engine`: Order cancellation, flattening, kill switch, paper gateway
//! - `risk-manager`: Risk engine, trailing stoploss, market clock, driver
//! - `risk-monitor`: The `risk-monitor` binary and Telegram alerts

pub use guard_core as core;
pub use risk_manager as risk;
pub use trading_engine as trading;
