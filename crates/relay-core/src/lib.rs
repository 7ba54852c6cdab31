//! # relay-core
//!
//! Shared protocol logic for the WebSocket stream relay: line framing,
//! control-token handling, and connection-parameter validation.
//!
//! This crate is used by the relay server and by its tests. It has zero
//! dependencies on sockets, async runtimes, or timers — every function here is
//! pure and synchronous, so the relay's framing and validation rules can be
//! tested without opening a single connection.
//!
//! # The relay protocol in one paragraph
//!
//! A client that can only speak WebSocket (e.g., a browser-based chat client)
//! connects to the relay with `host` and `port` query parameters. The relay
//! opens a raw TCP (or TLS) socket to that backend and shuttles
//! newline-delimited text lines in both directions. A handful of reserved
//! lines — the *control tokens* — are interpreted by the relay itself instead
//! of being forwarded:
//!
//! - **`*CONNECTED`** – sent to the client once the backend socket is open.
//! - **`*PING`** – sent by the client; answered with `*PONG`, never forwarded.
//! - **`*PONG`** – the relay's answer to `*PING`.
//!
//! This crate defines:
//!
//! - **[`framing`]** – Splitting received text on runs of CR/LF into discrete
//!   line events, and framing outgoing lines with exactly one `\n`.
//! - **[`control`]** – The control tokens and the classification of inbound
//!   client lines (answer with `*PONG` vs. forward to the backend).
//! - **[`params`]** – Parsing and validating the `host`/`port`/`proxyPass`
//!   query parameters from the WebSocket upgrade URL.

pub mod control;
pub mod framing;
pub mod params;

// Re-export the most-used items at the crate root so callers can write
// `relay_core::split_lines` instead of `relay_core::framing::split_lines`.
pub use control::{classify_client_line, ClientLine, CONNECTED_TOKEN, PING_TOKEN, PONG_TOKEN};
pub use framing::{frame_line, split_lines};
pub use params::{parse_connect_params, ConnectParams, ParamError};
