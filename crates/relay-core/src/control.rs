//! Control tokens and inbound-line classification.
//!
//! A small set of reserved line values travels over the WebSocket alongside
//! ordinary payload lines. They are consumed by the relay itself and never
//! reach the backend socket:
//!
//! | Token        | Direction        | Meaning                                   |
//! |--------------|------------------|-------------------------------------------|
//! | `*CONNECTED` | relay → client   | Backend socket is open; relaying begins.  |
//! | `*PING`      | client → relay   | Application-level liveness probe.         |
//! | `*PONG`      | relay → client   | Immediate answer to `*PING`.              |
//!
//! Classification is exact string equality on the whole line — a payload line
//! that merely *contains* `*PING` is forwarded untouched.

// ── Tokens ────────────────────────────────────────────────────────────────────

/// Sent to the client once the backend connection is established, before any
/// payload is relayed.
pub const CONNECTED_TOKEN: &str = "*CONNECTED";

/// Application-level liveness probe a client may send at any time.
pub const PING_TOKEN: &str = "*PING";

/// The relay's immediate answer to [`PING_TOKEN`].
pub const PONG_TOKEN: &str = "*PONG";

// ── Classification ────────────────────────────────────────────────────────────

/// What the relay should do with one inbound client line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientLine<'a> {
    /// The line is `*PING`: answer with `*PONG` and do not forward.
    RespondPong,
    /// Ordinary payload: forward to the backend with a trailing `\n`.
    Forward(&'a str),
}

/// Classifies one inbound client line.
///
/// # Examples
///
/// ```rust
/// use relay_core::{classify_client_line, ClientLine};
///
/// assert_eq!(classify_client_line("*PING"), ClientLine::RespondPong);
/// assert_eq!(classify_client_line("NICK alice"), ClientLine::Forward("NICK alice"));
/// ```
pub fn classify_client_line(line: &str) -> ClientLine<'_> {
    if line == PING_TOKEN {
        ClientLine::RespondPong
    } else {
        ClientLine::Forward(line)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
