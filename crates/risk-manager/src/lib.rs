//! Risk Manager
//!
//! Turns a stream of account PNL snapshots into risk actions: a trailing
//! stoploss ratchet, per-position percent exits, and a one-shot breach
//! response ending in the broker kill switch. The [`Driver`] runs the engine
//! on a schedule gated by the [`MarketSession`].

pub mod driver;
pub mod engine;
pub mod market_clock;
pub mod outcome;
pub mod position_exits;
pub mod trailing;

pub use driver::{Driver, DriverConfig, DriverExit};
pub use engine::{RiskEngine, RiskState};
pub use market_clock::MarketSession;
pub use outcome::{BreachReport, KillSwitchStatus, Outcome};
pub use position_exits::{ExitDecision, PositionExitRule};
pub use trailing::TrailingStop;
