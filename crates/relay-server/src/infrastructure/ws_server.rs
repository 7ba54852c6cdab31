//! WebSocket server: accept loop and per-session relay.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming connections and upgrading each to a WebSocket
//!    session, capturing the upgrade URL's query string on the way.
//! 3. Registering every accepted session in the process-wide registry.
//! 4. Validating the `host`/`port`/`proxyPass` parameters and replying with
//!    the single control line on validation failure.
//! 5. Opening the backend stream endpoint and running the bidirectional
//!    relay: client lines → backend writes, backend lines → client messages,
//!    `*PING` → `*PONG`, protocol-level pong → liveness flag.
//! 6. Tearing the pair down when either side closes, or when the sweeper
//!    says so.
//!
//! # Scalability
//!
//! Each session runs in its own Tokio task, plus one task reading the
//! backend socket. The accept loop never blocks on a session: it accepts a
//! connection and immediately spawns a task for it before accepting the next
//! one. A panic or error inside one session task is confined to that task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, warn};

use relay_core::{
    classify_client_line, frame_line, parse_connect_params, split_lines, ClientLine,
    CONNECTED_TOKEN, PONG_TOKEN,
};

use crate::domain::config::RelayConfig;
use crate::infrastructure::backend::{self, BackendWriter};
use crate::infrastructure::registry::{SessionControl, SessionHandle, SessionRegistry};

// ── Listener ──────────────────────────────────────────────────────────────────

/// The bound WebSocket listener.
///
/// Binding and running are separate steps so callers (and the integration
/// tests) can bind port 0 and read the actual address before serving.
pub struct RelayListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: Arc<SessionRegistry>,
}

impl RelayListener {
    /// Binds the listener on `config.bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound (already in use, no
    /// permission).
    pub async fn bind(config: RelayConfig, registry: Arc<SessionRegistry>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read listener address")?;

        info!("WebSocket relay listening on {local_addr}");

        Ok(Self {
            listener,
            local_addr,
            config: Arc::new(config),
            registry,
        })
    }

    /// The address actually bound (resolves port 0 to the real port).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop until `running` is set to `false`.
    ///
    /// Each accepted connection is handed off to a dedicated Tokio task so
    /// that one slow client never blocks others.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // A short timeout on `accept()` lets the loop check the
            // `running` flag periodically even when no clients connect.
            let accept_result = timeout(Duration::from_millis(200), self.listener.accept()).await;

            match accept_result {
                Ok(Ok((stream, peer_addr))) => {
                    info!("new client connection from {peer_addr}");
                    let config = Arc::clone(&self.config);
                    let registry = Arc::clone(&self.registry);

                    tokio::spawn(async move {
                        handle_session(stream, peer_addr, config, registry).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient accept error (e.g., out of file descriptors).
                    // Log and continue rather than taking the relay down.
                    error!("accept error: {e}");
                }
                Err(_) => {
                    // Timeout — no new connection; loop back to check the flag.
                }
            }
        }

        Ok(())
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Top-level handler for a single client session.
///
/// Wraps [`run_session`] and logs the outcome; the outer/inner pair keeps
/// `?` usable for error propagation inside while errors still get logged.
async fn handle_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: Arc<SessionRegistry>,
) {
    match run_session(raw_stream, peer_addr, config, registry).await {
        Ok(()) => info!("session from {peer_addr} closed"),
        Err(e) => warn!("session from {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one session: WebSocket handshake,
/// registration, parameter validation, backend connect, relay, teardown.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: Arc<SessionRegistry>,
) -> anyhow::Result<()> {
    // Complete the WebSocket upgrade, keeping hold of the request URI's
    // query string — it carries the connection parameters.
    let mut query: Option<String> = None;
    let ws_stream = accept_hdr_async(raw_stream, |req: &Request, response: Response| {
        query = req.uri().query().map(str::to_string);
        Ok(response)
    })
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    // Register on accept; the sweeper sees this session from now on.
    let (handle, control_rx) = SessionHandle::new(peer_addr);
    let session_id = handle.id();
    registry.insert(Arc::clone(&handle));
    debug!("session {session_id}: established from {}", handle.peer());

    let result = serve_session(ws_stream, &handle, control_rx, &config, query.as_deref()).await;

    // Pruning an id the sweeper already removed is a no-op.
    registry.remove(session_id);
    result
}

/// Validates the session's parameters, opens the backend, and relays.
async fn serve_session(
    mut ws_stream: WebSocketStream<TcpStream>,
    handle: &SessionHandle,
    control_rx: mpsc::UnboundedReceiver<SessionControl>,
    config: &RelayConfig,
    query: Option<&str>,
) -> anyhow::Result<()> {
    let session_id = handle.id();

    let params = match parse_connect_params(query.unwrap_or(""), config.shared_secret.as_deref()) {
        Ok(params) => params,
        Err(e) => {
            warn!("session {session_id}: rejected: {e}");
            if let Some(reply) = e.client_reply() {
                ws_stream
                    .send(Message::Text(frame_line(&reply)))
                    .await
                    .with_context(|| format!("session {session_id}: failed to send reply"))?;
                // Soft fail: the error line is the only reply. The session
                // stays open but unconfigured until the client disconnects
                // or the sweeper reaps it.
                return drain_inert_session(ws_stream, handle, control_rx).await;
            }
            // Invalid port: the client sees the same silent closure as a
            // failed backend connect.
            let _ = ws_stream.close(None).await;
            return Ok(());
        }
    };

    let (backend_reader, backend_writer) = match backend::connect(&params).await {
        Ok(halves) => halves,
        Err(e) => {
            warn!("session {session_id}: {e:#}");
            let _ = ws_stream.close(None).await;
            return Ok(());
        }
    };

    // Tell the client it is connected, before any relay traffic.
    ws_stream
        .send(Message::Text(frame_line(CONNECTED_TOKEN)))
        .await
        .with_context(|| format!("session {session_id}: failed to send greeting"))?;

    // Backend reads happen in their own task; line events arrive over this
    // channel in stream order, and the channel closing means the backend is
    // gone.
    let (line_tx, line_rx) = mpsc::channel::<String>(128);
    let reader_task = tokio::spawn(backend::read_backend_lines(
        backend_reader,
        session_id,
        line_tx,
    ));

    let result = run_relay(
        &mut ws_stream,
        handle,
        control_rx,
        line_rx,
        backend_writer,
    )
    .await;

    reader_task.abort();
    result
}

// ── Relay loop ────────────────────────────────────────────────────────────────

/// Why the relay loop ended.
enum Teardown {
    /// The client closed (or broke) the WebSocket.
    ClientClosed,
    /// The backend stream ended or a backend write failed.
    BackendClosed,
    /// The liveness sweeper ordered an immediate termination.
    Terminated,
}

/// The bidirectional relay: one loop multiplexing sweeper commands, client
/// frames, and backend line events.
///
/// Owning both the WebSocket and the backend write half in a single loop
/// keeps all per-session state unshared — no mutexes, and teardown in either
/// direction happens in the same loop iteration that observes it.
async fn run_relay(
    ws_stream: &mut WebSocketStream<TcpStream>,
    handle: &SessionHandle,
    mut control_rx: mpsc::UnboundedReceiver<SessionControl>,
    mut line_rx: mpsc::Receiver<String>,
    mut backend_writer: BackendWriter,
) -> anyhow::Result<()> {
    let session_id = handle.id();

    let teardown = 'relay: loop {
        tokio::select! {
            // Sweeper commands.
            cmd = control_rx.recv() => match cmd {
                Some(SessionControl::Ping) => {
                    if ws_stream.send(Message::Ping(Vec::new())).await.is_err() {
                        break 'relay Teardown::ClientClosed;
                    }
                }
                Some(SessionControl::Terminate) | None => break 'relay Teardown::Terminated,
            },

            // Client → backend.
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    for line in split_lines(&text) {
                        debug!("session {session_id}: --> {line}");
                        match classify_client_line(line) {
                            ClientLine::RespondPong => {
                                let pong = Message::Text(frame_line(PONG_TOKEN));
                                if ws_stream.send(pong).await.is_err() {
                                    break 'relay Teardown::ClientClosed;
                                }
                            }
                            ClientLine::Forward(payload) => {
                                if let Err(e) =
                                    backend::write_line(&mut backend_writer, session_id, payload).await
                                {
                                    debug!("session {session_id}: {e:#}");
                                    break 'relay Teardown::BackendClosed;
                                }
                            }
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    // The client-facing protocol is text lines only.
                    warn!("session {session_id}: unexpected binary WebSocket frame (ignored)");
                }
                Some(Ok(Message::Ping(data))) => {
                    // tungstenite queues the protocol-level pong reply itself.
                    debug!("session {session_id}: WebSocket ping ({} bytes)", data.len());
                }
                Some(Ok(Message::Pong(_))) => {
                    // The client answered a liveness probe.
                    handle.mark_alive();
                }
                Some(Ok(Message::Close(_))) => break 'relay Teardown::ClientClosed,
                Some(Ok(Message::Frame(_))) => {
                    debug!("session {session_id}: raw frame (ignored)");
                }
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    break 'relay Teardown::ClientClosed;
                }
                Some(Err(e)) => {
                    warn!("session {session_id}: WebSocket error: {e}");
                    break 'relay Teardown::ClientClosed;
                }
                None => break 'relay Teardown::ClientClosed,
            },

            // Backend → client.
            line = line_rx.recv() => match line {
                Some(line) => {
                    if ws_stream.send(Message::Text(frame_line(&line))).await.is_err() {
                        break 'relay Teardown::ClientClosed;
                    }
                }
                None => break 'relay Teardown::BackendClosed,
            },
        }
    };

    match teardown {
        Teardown::ClientClosed => {
            // Dropping the backend halves destroys the socket immediately;
            // nothing pending is flushed.
            debug!("session {session_id}: client closed; destroying backend connection");
        }
        Teardown::BackendClosed => {
            debug!("session {session_id}: backend stream ended; closing client session");
            let _ = ws_stream.close(None).await;
        }
        Teardown::Terminated => {
            info!("session {session_id}: terminated by liveness sweeper");
        }
    }

    Ok(())
}

// ── Inert sessions ────────────────────────────────────────────────────────────

/// Holds a session that failed validation: nothing is relayed, incoming
/// frames are discarded, and only liveness bookkeeping continues until the
/// client disconnects or the sweeper terminates the session.
async fn drain_inert_session(
    mut ws_stream: WebSocketStream<TcpStream>,
    handle: &SessionHandle,
    mut control_rx: mpsc::UnboundedReceiver<SessionControl>,
) -> anyhow::Result<()> {
    let session_id = handle.id();

    loop {
        tokio::select! {
            cmd = control_rx.recv() => match cmd {
                Some(SessionControl::Ping) => {
                    if ws_stream.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                Some(SessionControl::Terminate) | None => {
                    debug!("session {session_id}: inert session terminated by liveness sweeper");
                    break;
                }
            },
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Pong(_))) => handle.mark_alive(),
                Some(Ok(_)) => {
                    // Unconfigured session; discard.
                }
                Some(Err(_)) | None => break,
            },
        }
    }

    Ok(())
}
