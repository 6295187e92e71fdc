//! Relay orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{setup_shutdown_signal, ConsumeMode, Relay, RelayConfig};
pub use stats::RelayStats;
