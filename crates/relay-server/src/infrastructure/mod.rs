//! Infrastructure layer for relay-server.
//!
//! Everything that touches a socket or a timer lives here:
//!
//! - Binding the WebSocket listener and running per-session relay tasks
//! - Opening TCP/TLS connections to the named backend
//! - The trust-any-certificate TLS client configuration
//! - The process-wide session registry and the sweep interval task
//!
//! # What does NOT belong here?
//!
//! - Line splitting, control-token rules, parameter validation (relay-core)
//! - The sweep state machine itself (application layer)
//! - Configuration parsing (done in `main.rs`)

pub mod backend;
pub mod registry;
pub mod tls;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use registry::{run_sweeper, SessionRegistry};
pub use ws_server::RelayListener;
