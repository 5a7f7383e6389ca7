//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection cap)
//!     → connection.rs (id, in-flight tracking)
//!     → relay.rs (healthy subset → random pick → dial)
//!     → splice.rs (bytes both ways until either side closes)
//! ```
//!
//! # Design Decisions
//! - Excess connections are closed, not queued
//! - No framing: bytes are relayed unmodified in both directions
//! - Only dial failures change backend health by default

pub mod connection;
pub mod listener;
pub mod relay;
pub mod splice;

pub use connection::{ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use relay::ConnectionRelay;
