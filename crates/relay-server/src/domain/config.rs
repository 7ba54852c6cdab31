//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! `main.rs` populates it from the `PROXY_PORT` / `PROXY_PASS` environment
//! variables; tests construct it directly with a port-0 bind address and a
//! short sweep interval.

use std::net::SocketAddr;
use std::time::Duration;

/// Listening port used when `PROXY_PORT` is unset, empty, zero, or not a
/// number at all.
pub const DEFAULT_PORT: u16 = 6676;

/// How often the liveness sweeper visits every registered session. A client
/// that fails to answer a ping within one full interval is terminated on the
/// following tick, so worst-case detection is roughly twice this value.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// All runtime configuration for the relay.
///
/// Build this struct once at startup and wrap it in an `Arc` so it can be
/// shared cheaply across all session tasks.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The address and port the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Shared secret every session request must present as `proxyPass`.
    ///
    /// `None` disables the check entirely — any `proxyPass` value, including
    /// none at all, is then accepted.
    pub shared_secret: Option<String>,

    /// Interval between liveness sweep ticks.
    pub sweep_interval: Duration,
}

impl Default for RelayConfig {
    /// Production defaults: listen on all interfaces at [`DEFAULT_PORT`],
    /// no shared secret, 15-second sweep.
    fn default() -> Self {
        Self {
            // Compile-time-known valid address; the parse cannot fail.
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}").parse().unwrap(),
            shared_secret: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Coerces a raw `PROXY_PORT` value into a listening port.
///
/// Mirrors the lenient numeric coercion the legacy deployment relied on:
/// anything that does not parse as a positive port number — including the
/// empty string — falls back to [`DEFAULT_PORT`] rather than failing startup.
pub fn lenient_port(raw: &str) -> u16 {
    raw.trim()
        .parse()
        .ok()
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_PORT)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_6676() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.bind_addr.port(), 6676);
    }

    #[test]
    fn test_default_has_no_shared_secret() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.shared_secret, None);
    }

    #[test]
    fn test_default_sweep_interval_is_15s() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.sweep_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_lenient_port_accepts_a_plain_number() {
        assert_eq!(lenient_port("7000"), 7000);
    }

    #[test]
    fn test_lenient_port_trims_whitespace() {
        assert_eq!(lenient_port(" 7000 "), 7000);
    }

    #[test]
    fn test_lenient_port_non_numeric_falls_back() {
        assert_eq!(lenient_port("six-six-seven-six"), DEFAULT_PORT);
    }

    #[test]
    fn test_lenient_port_empty_falls_back() {
        assert_eq!(lenient_port(""), DEFAULT_PORT);
    }

    #[test]
    fn test_lenient_port_zero_falls_back() {
        // Port 0 would mean "pick any free port" — the legacy coercion
        // treated it as unset, and so do we.
        assert_eq!(lenient_port("0"), DEFAULT_PORT);
    }

    #[test]
    fn test_lenient_port_out_of_range_falls_back() {
        assert_eq!(lenient_port("123456"), DEFAULT_PORT);
    }

    #[test]
    fn test_config_can_be_cloned() {
        // Cloneability is required so an Arc<RelayConfig> can be shared
        // across session tasks.
        let cfg = RelayConfig::default();
        let cloned = cfg.clone();
        assert_eq!(cfg.bind_addr, cloned.bind_addr);
        assert_eq!(cfg.sweep_interval, cloned.sweep_interval);
    }
}
