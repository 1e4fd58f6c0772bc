//! Guard Core Library
//!
//! Shared types, collaborator traits, configuration and the Dhan API client
//! for the intraday PNL guard.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod notify;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use events::{BreachReason, ExitReason, PositionSummary, RiskEvent};
pub use notify::{MemoryNotifier, NullNotifier};
pub use traits::{Notifier, OrderGateway, SnapshotProvider};

#[cfg(any(test, feature = "mocks"))]
pub use traits::{MockOrderGateway, MockSnapshotProvider};
