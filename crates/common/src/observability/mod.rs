//! Observability bootstrap
//!
//! Faultline emits structured `tracing` events for breaker transitions and
//! retry attempts. Libraries never install a subscriber on their own; binaries
//! and test harnesses call [`init_tracing`] once at startup.

pub mod logging;

pub use logging::{init_tracing, LogConfig, LogFormat, TracingInitError};
