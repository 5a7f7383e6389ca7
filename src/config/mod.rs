//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (merge defaults, semantic checks)
//!     → ClusterConfig + Vec<BackendDescriptor> (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - The backend list is fixed at startup; there is no reload path
//! - All runtime sections have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError, ConfigFormat, LoadedConfig};
pub use schema::{
    ClusterConfig, FailurePolicy, HealthConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    RelayConfig, ServerConfig, WorkerConfig, WorkerKind,
};
pub use validation::ValidationError;
