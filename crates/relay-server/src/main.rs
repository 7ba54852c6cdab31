//! WebSocket stream relay — entry point.
//!
//! This binary accepts WebSocket connections from browser-class clients and
//! proxies each one to a raw TCP (or TLS) backend named in the upgrade URL:
//!
//! ```text
//! ws://relay:6676/?host=irc.example.org&port=6667
//! ws://relay:6676/?host=irc.example.org&port=%2B6697&proxyPass=hunter2
//! ```
//!
//! # Why a relay?
//!
//! Browsers can only open HTTP/WebSocket connections — they cannot speak raw
//! TCP. Line-based services (IRC being the classic case) only speak raw TCP.
//! This process sits in between, opening the stream socket on the client's
//! behalf and translating WebSocket text messages to stream writes and
//! stream reads back to messages, one `\n`-terminated line at a time.
//!
//! # Configuration
//!
//! There are no CLI arguments and no config files; the entire configuration
//! surface is two environment variables:
//!
//! | Variable     | Default | Description                                    |
//! |--------------|---------|------------------------------------------------|
//! | `PROXY_PORT` | `6676`  | Listening port (non-numeric values → default)  |
//! | `PROXY_PASS` | unset   | Shared secret; unset/empty disables the check  |
//!
//! Log verbosity is controlled by `RUST_LOG` (e.g., `RUST_LOG=debug`).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::domain::config::{lenient_port, RelayConfig, DEFAULT_PORT};
use relay_server::infrastructure::{run_sweeper, RelayListener, SessionRegistry};

/// Builds the runtime configuration from the process environment.
///
/// `PROXY_PORT` is coerced leniently — anything that is not a positive port
/// number falls back to [`DEFAULT_PORT`] instead of failing startup. An
/// empty `PROXY_PASS` counts as unset.
fn config_from_env() -> RelayConfig {
    let port = std::env::var("PROXY_PORT")
        .map(|raw| lenient_port(&raw))
        .unwrap_or(DEFAULT_PORT);

    let shared_secret = std::env::var("PROXY_PASS").ok().filter(|s| !s.is_empty());

    RelayConfig {
        bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
        shared_secret,
        ..RelayConfig::default()
    }
}

/// Program entry point.
///
/// Starts the Tokio runtime, wires the shutdown flag, spawns the liveness
/// sweeper, and runs the accept loop until Ctrl+C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` controls the filter; default to `info` when absent/invalid.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_from_env();

    if config.shared_secret.is_some() {
        info!("shared-secret check enabled (PROXY_PASS is set)");
    }

    // Shared shutdown flag, cleared by Ctrl+C. The accept loop and the
    // sweeper poll it and exit cleanly.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // One registry shared by the listener (inserts) and the sweeper
    // (pings/terminations) for the lifetime of the process.
    let registry = SessionRegistry::new();
    tokio::spawn(run_sweeper(
        Arc::clone(&registry),
        config.sweep_interval,
        Arc::clone(&running),
    ));

    let listener = RelayListener::bind(config, registry).await?;
    listener.run(running).await?;

    info!("relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
