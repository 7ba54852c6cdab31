//! Connection-parameter parsing and validation.
//!
//! Every incoming session carries its target in the query string of the
//! WebSocket upgrade URL:
//!
//! ```text
//! ws://relay:6676/?host=irc.example.org&port=6667
//! ws://relay:6676/?host=irc.example.org&port=%2B6697&proxyPass=hunter2
//! ```
//!
//! A leading `+` on the `port` value requests an encrypted (TLS) backend
//! connection; the numeric part is the real port either way. `proxyPass` is
//! compared against the relay's configured shared secret, when one is set.
//!
//! Validation happens in one explicit step with a fixed order, so the first
//! failure decides the (single) control line sent back to the client:
//!
//! 1. `host` present and non-empty — else `missing required param host`
//! 2. `port` present and non-empty — else `missing required param port`
//! 3. shared secret matches — else `Bad password`
//! 4. port numeric and in range — else a log-only [`ParamError::InvalidPort`]
//!    (the client just sees the connection close, the same way it would see
//!    a failed backend connect)

use thiserror::Error;

// ── Error type ────────────────────────────────────────────────────────────────

/// A session request that cannot be turned into a usable backend target.
///
/// For [`MissingParam`](ParamError::MissingParam) and
/// [`BadPassword`](ParamError::BadPassword) the `Display` text is exactly the
/// control line the relay sends to the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    /// A required query parameter is absent or empty.
    #[error("missing required param {0}")]
    MissingParam(&'static str),

    /// A shared secret is configured and the request's `proxyPass` does not
    /// match it exactly (or is absent).
    #[error("Bad password")]
    BadPassword,

    /// The `port` value (after stripping an optional leading `+`) is not a
    /// valid non-zero 16-bit port number.
    #[error("invalid port value '{0}'")]
    InvalidPort(String),
}

impl ParamError {
    /// The control line to send to the client, if this error is
    /// client-visible.
    ///
    /// `InvalidPort` returns `None`: it surfaces to the client as a silent
    /// connection closure, like any backend connect failure.
    pub fn client_reply(&self) -> Option<String> {
        match self {
            ParamError::MissingParam(_) | ParamError::BadPassword => Some(self.to_string()),
            ParamError::InvalidPort(_) => None,
        }
    }
}

// ── Parsed parameters ─────────────────────────────────────────────────────────

/// Validated connection parameters for one session.
///
/// Produced once per incoming session by [`parse_connect_params`]; immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Backend hostname or IP address, exactly as the client supplied it.
    pub host: String,
    /// Backend port, with any `+` prefix already stripped.
    pub port: u16,
    /// Whether the backend connection should be TLS (the raw `port` value
    /// started with `+`).
    pub use_tls: bool,
    /// The `proxyPass` value the client supplied, if any. Retained for
    /// logging/diagnostics; the secret check has already passed by the time
    /// this struct exists.
    pub proxy_pass: Option<String>,
}

/// Required query parameters, checked in this order. The first missing one
/// decides the error reply.
const REQUIRED_PARAMS: [&str; 2] = ["host", "port"];

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parses and validates the upgrade URL's query string.
///
/// `shared_secret` is the relay's configured password; `None` (or an empty
/// string) disables the check entirely, so any `proxyPass` value — including
/// none — is accepted.
///
/// # Errors
///
/// Returns the first [`ParamError`] in the fixed validation order described
/// in the module docs.
///
/// # Examples
///
/// ```rust
/// use relay_core::parse_connect_params;
///
/// let params = parse_connect_params("host=irc.example.org&port=%2B6697", None).unwrap();
/// assert_eq!(params.host, "irc.example.org");
/// assert_eq!(params.port, 6697);
/// assert!(params.use_tls);
/// ```
pub fn parse_connect_params(
    query: &str,
    shared_secret: Option<&str>,
) -> Result<ConnectParams, ParamError> {
    // Decode the query string once. `form_urlencoded` handles percent-escapes
    // and `+`-as-space; later duplicates of a key are ignored (first wins).
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let find = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    // Required parameters must be present AND non-empty; `?host=&port=1` is
    // as bad as no host at all.
    let find_non_empty = |key: &str| find(key).filter(|v| !v.is_empty());

    for key in REQUIRED_PARAMS {
        if find_non_empty(key).is_none() {
            return Err(ParamError::MissingParam(key));
        }
    }

    // The secret check compares the raw value: an absent `proxyPass` never
    // matches a configured secret.
    if let Some(secret) = shared_secret.filter(|s| !s.is_empty()) {
        if find("proxyPass") != Some(secret) {
            return Err(ParamError::BadPassword);
        }
    }

    let host = find_non_empty("host").unwrap_or_default().to_string();
    let raw_port = find_non_empty("port").unwrap_or_default();

    // `+6697` means "TLS to port 6697"; the marker is not part of the number.
    let (use_tls, digits) = match raw_port.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, raw_port),
    };

    // Trimming mirrors the lenient numeric coercion legacy clients rely on:
    // an unescaped `+` decodes as a space under form-urlencoding, and the
    // remaining ` 6697` must still parse.
    let port: u16 = digits
        .trim()
        .parse()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ParamError::InvalidPort(raw_port.to_string()))?;

    Ok(ConnectParams {
        host,
        port,
        use_tls,
        proxy_pass: find("proxyPass").map(str::to_string),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
