//! Health-aware TCP load balancer over a pool of proxy workers.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod supervisor;

pub use config::schema::ClusterConfig;
pub use lifecycle::{Cluster, Shutdown};
