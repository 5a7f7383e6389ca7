//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Connection accepted
//!     → registry.rs (ordered backend descriptors)
//!     → health tracker (healthy subset, in registry order)
//!     → random.rs (uniform pick among healthy indices)
//!     → relay dials the chosen backend's relay address
//! ```
//!
//! # Design Decisions
//! - Strategy is stateless; health lives in `crate::health`
//! - Strategies see indices only, never health state
//! - Unhealthy backends are excluded before selection

pub mod backend;
pub mod random;
pub mod registry;

use std::fmt::Debug;

pub use backend::BackendDescriptor;
pub use random::RandomSelection;
pub use registry::{BackendRegistry, RegistryError};

/// Backend selection strategy.
pub trait LoadBalancer: Debug + Send + Sync {
    /// Choose one index from `healthy`, or `None` if it is empty.
    fn next_backend(&self, healthy: &[usize]) -> Option<usize>;
}
