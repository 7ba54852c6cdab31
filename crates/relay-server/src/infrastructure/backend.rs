//! The stream endpoint: one raw TCP or TLS connection to a backend.
//!
//! Each session gets exactly one backend connection, opened after parameter
//! validation succeeds. The endpoint never sends anything on its own, never
//! retries, and never reconnects: any failure after connect surfaces as the
//! end of the line stream, which the relay loop treats as session teardown.
//!
//! # Line events
//!
//! TCP is a stream protocol, but this relay's contract is per-read framing:
//! each chunk the socket delivers is decoded as best-effort UTF-8 and split
//! on runs of CR/LF, and every non-empty segment becomes one line event, in
//! order. Non-text bytes are not an error — `from_utf8_lossy` substitutes
//! the replacement character and the relay carries on.

use std::sync::Arc;

use anyhow::Context;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relay_core::{frame_line, split_lines, ConnectParams};

use crate::infrastructure::tls;

/// Read half of a backend connection (plain or TLS).
pub type BackendReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of a backend connection (plain or TLS).
pub type BackendWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ── Connect ───────────────────────────────────────────────────────────────────

/// Opens the backend connection described by `params`.
///
/// A plain TCP socket for `host=...&port=6667`, a TLS session (any server
/// certificate accepted, see [`tls`]) for `port=%2B6697`.
///
/// # Errors
///
/// Returns an error if the TCP connect or the TLS handshake fails. The
/// caller treats that as session teardown; there is no retry.
pub async fn connect(params: &ConnectParams) -> anyhow::Result<(BackendReader, BackendWriter)> {
    let stream = TcpStream::connect((params.host.as_str(), params.port))
        .await
        .with_context(|| format!("failed to connect to {}:{}", params.host, params.port))?;

    if !params.use_tls {
        info!("connected to {}:{}", params.host, params.port);
        let (read_half, write_half) = stream.into_split();
        return Ok((Box::new(read_half), Box::new(write_half)));
    }

    let config = tls::insecure_client_config().context("building TLS client config")?;
    let connector = TlsConnector::from(Arc::new(config));

    // `ServerName` carries the SNI value; IP literals are accepted too.
    let server_name = ServerName::try_from(params.host.clone())
        .with_context(|| format!("invalid TLS server name '{}'", params.host))?;

    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .with_context(|| format!("TLS handshake with {}:{} failed", params.host, params.port))?;

    info!("[TLS] connected to {}:{}", params.host, params.port);
    let (read_half, write_half) = tokio::io::split(tls_stream);
    Ok((Box::new(read_half), Box::new(write_half)))
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Reads the backend stream and forwards each received line as one event on
/// `line_tx`, until the backend closes or fails.
///
/// Dropping of `line_tx` at return is the end-of-stream signal: the relay
/// loop observes the channel closing and tears the session down.
pub async fn read_backend_lines(
    mut reader: BackendReader,
    session_id: Uuid,
    line_tx: mpsc::Sender<String>,
) {
    let mut chunk = vec![0u8; 4096];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("session {session_id}: backend closed the connection (EOF)");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("session {session_id}: backend read failed: {e}");
                return;
            }
        };

        // Best-effort text decoding; malformed bytes become U+FFFD instead
        // of killing the session.
        let text = String::from_utf8_lossy(&chunk[..n]);
        for line in split_lines(&text) {
            debug!("session {session_id}: <-- {line}");
            if line_tx.send(line.to_string()).await.is_err() {
                // The relay loop is gone; the session is over.
                return;
            }
        }
    }
}

// ── Writing ───────────────────────────────────────────────────────────────────

/// Writes one line to the backend, framed with a single trailing `\n`.
///
/// # Errors
///
/// Returns an error if the write fails (e.g., the backend closed the
/// connection); the caller treats that as session teardown.
pub async fn write_line(
    writer: &mut BackendWriter,
    session_id: Uuid,
    line: &str,
) -> anyhow::Result<()> {
    writer
        .write_all(frame_line(line).as_bytes())
        .await
        .with_context(|| format!("session {session_id}: write to backend failed"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives `read_backend_lines` with an in-memory duplex stream standing
    /// in for the backend socket.
    fn reader_for(data: &'static [u8]) -> BackendReader {
        let (client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            server.write_all(data).await.unwrap();
            // Dropping `server` closes the stream → EOF on the reader side.
        });
        Box::new(client)
    }

    #[tokio::test]
    async fn test_crlf_chunk_becomes_ordered_line_events() {
        let (line_tx, mut line_rx) = mpsc::channel(16);
        read_backend_lines(reader_for(b"a\r\nb\r\n"), Uuid::new_v4(), line_tx).await;

        assert_eq!(line_rx.recv().await.as_deref(), Some("a"));
        assert_eq!(line_rx.recv().await.as_deref(), Some("b"));
        assert_eq!(line_rx.recv().await, None, "EOF must close the channel");
    }

    #[tokio::test]
    async fn test_terminator_only_chunk_emits_nothing() {
        let (line_tx, mut line_rx) = mpsc::channel(16);
        read_backend_lines(reader_for(b"\r\n\r\n"), Uuid::new_v4(), line_tx).await;

        assert_eq!(line_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoded_lossily() {
        let (line_tx, mut line_rx) = mpsc::channel(16);
        read_backend_lines(reader_for(b"bad\xffbyte\n"), Uuid::new_v4(), line_tx).await;

        let line = line_rx.recv().await.expect("one line event");
        assert_eq!(line, "bad\u{fffd}byte");
    }

    #[tokio::test]
    async fn test_write_line_appends_exactly_one_newline() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer: BackendWriter = Box::new(client);

        write_line(&mut writer, Uuid::new_v4(), "NICK alice")
            .await
            .unwrap();
        drop(writer);

        let mut received = String::new();
        let mut reader = Box::new(server) as BackendReader;
        reader.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "NICK alice\n");
    }

    #[tokio::test]
    async fn test_write_line_to_closed_backend_is_an_error() {
        let (client, server) = tokio::io::duplex(16);
        drop(server);
        let mut writer: BackendWriter = Box::new(client);

        let result = write_line(&mut writer, Uuid::new_v4(), "hello").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        // Bind-then-drop guarantees a port with no listener.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let params = ConnectParams {
            host: "127.0.0.1".to_string(),
            port,
            use_tls: false,
            proxy_pass: None,
        };
        assert!(connect(&params).await.is_err());
    }
}
