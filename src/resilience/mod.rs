//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dial to a worker relay address:
//!     → timeouts.rs (bounded connect)
//!     → On failure: health tracker withdraws the backend for its cooldown
//!     → Optional single retry against another healthy backend (relay config)
//! ```
//!
//! The cooldown circuit breaker itself lives in `crate::health`.

pub mod timeouts;
