//! Trading Engine
//!
//! Executes de-risking actions against the broker: cancel pending orders,
//! flatten positions and activate the kill switch. A paper gateway stands in
//! for the broker in dry runs.

pub mod executor;
pub mod paper;

pub use executor::{
    ActionExecutor, ActionSummary, ExecutionMetrics, ExecutorConfig, FlattenResult,
    KillSwitchResult,
};
pub use paper::PaperGateway;
