//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Failure sources:
//!     worker failure signal (supervisor)  → tracker.report_unhealthy
//!     relay cannot dial worker            → tracker.record_dial_failure
//!     established relay errors            → tracker.record_relay_failure
//!                                           (counts only under any_relay_error)
//!
//! Selection:
//!     relay → tracker.healthy_subset(registry.list())
//!           → expired cooldowns flip back to Healthy
//!           → indices in registry order
//! ```
//!
//! # Design Decisions
//! - Fixed cooldown window, no backoff, no half-open trial traffic
//! - Recovery is lazy (evaluated at selection time), no background timer
//! - Health state is per-backend with its own lock

pub mod state;
pub mod tracker;

pub use state::{BackendHealth, FailureReason, HealthState};
pub use tracker::{HealthSnapshot, HealthTracker};
