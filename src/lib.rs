pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod kernel;
pub mod metrics;

pub use collector::{Collector, CollectorSettings, CycleReport, PollState};
pub use error::{IpvsError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
