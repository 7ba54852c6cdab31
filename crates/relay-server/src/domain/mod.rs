//! Domain layer for relay-server.
//!
//! Pure business-logic types with no dependencies on I/O, networking, or
//! external frameworks. Environment variables are read in `main.rs` and
//! turned into a [`RelayConfig`] there; nothing in this module touches the
//! process environment.

pub mod config;

pub use config::{lenient_port, RelayConfig, DEFAULT_PORT};
