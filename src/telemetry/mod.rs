//! Logging setup for the binary. The library only emits `tracing` events.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
