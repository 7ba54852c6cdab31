//! Application layer for relay-server.
//!
//! Holds the liveness-sweep state machine. The sweep pass is written against
//! the [`sweeper::SweepTarget`] trait rather than a concrete session type, so
//! the termination rules can be unit-tested by injecting fake sessions — no
//! sockets, no timers.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning (the sweep *timer* lives in the infrastructure layer)

pub mod sweeper;

pub use sweeper::{sweep, SweepTarget};
