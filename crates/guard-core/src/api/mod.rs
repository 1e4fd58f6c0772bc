//! API clients for external services.

pub mod dhan;

pub use dhan::DhanClient;
