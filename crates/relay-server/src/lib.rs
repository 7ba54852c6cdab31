//! relay-server library crate.
//!
//! This crate implements a WebSocket-to-stream relay: browser-class clients
//! that can only speak WebSocket connect here, name a backend `host:port` in
//! the upgrade URL, and the relay opens the raw TCP (or TLS) socket on their
//! behalf and shuttles newline-delimited text both ways.
//!
//! # Architecture
//!
//! ```text
//! Client (lines over WebSocket)
//!         ↕
//! [relay-server]
//!   ├── domain/           Pure types: RelayConfig
//!   ├── application/      Liveness sweep state machine (SweepTarget trait)
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop + per-session relay
//!         ├── backend/    TCP/TLS stream endpoint to the named backend
//!         ├── tls/        Trust-any-certificate TLS client configuration
//!         └── registry/   Process-wide registry of live sessions
//!         ↕
//! Backend (raw byte stream, e.g. an IRC server on 6667 or TLS on +6697)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain` and `relay-core` only; the sweeper is
//!   written against a trait so it can be tested with fake sessions.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tungstenite`, and `rustls`.

/// Domain layer: pure configuration types (no I/O).
pub mod domain;

/// Application layer: the liveness-sweep state machine.
pub mod application;

/// Infrastructure layer: WebSocket server, backend sockets, session registry.
pub mod infrastructure;
