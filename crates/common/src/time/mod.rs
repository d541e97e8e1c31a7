//! Time abstraction for deterministic testing
//!
//! - **[`clock`]**: the [`Clock`] trait with the production [`SystemClock`]
//!   and the test-oriented [`MockClock`]
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use faultline_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
//! ```

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
