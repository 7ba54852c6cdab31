//! Process-wide registry of active sessions, and the sweep interval task.
//!
//! The listener inserts a [`SessionHandle`] on accept; the session's own task
//! removes it again on exit, and the sweeper removes the sessions it
//! terminates. The registry is passed to the sweeper explicitly (never
//! reached through ambient global state), which is what lets the sweep pass
//! be unit-tested against fakes in the application layer.
//!
//! The sweeper and a session task live in different Tokio workers, so the
//! map is guarded by a mutex and the liveness flag is atomic. The lock is
//! only ever held for synchronous map operations — never across an `.await`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::sweeper::{sweep, SweepTarget};

// ── Sweeper → session commands ────────────────────────────────────────────────

/// Commands the sweeper sends to a session's relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    /// Send a WebSocket protocol-level ping frame to the client.
    Ping,
    /// Tear the session down immediately, without flushing anything.
    Terminate,
}

// ── Session handle ────────────────────────────────────────────────────────────

/// The registry's view of one live session.
///
/// The relay loop owns the actual WebSocket and backend sockets; this handle
/// carries only what the sweeper needs — the liveness flag and a non-blocking
/// command channel into the relay loop.
pub struct SessionHandle {
    id: Uuid,
    peer: SocketAddr,
    /// Liveness flag: true at creation, set true on every pong receipt,
    /// cleared by each sweep tick.
    alive: AtomicBool,
    control_tx: mpsc::UnboundedSender<SessionControl>,
}

impl SessionHandle {
    /// Creates a handle for a newly accepted session, together with the
    /// receiving end of its control channel (owned by the relay loop).
    pub fn new(peer: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionControl>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            peer,
            alive: AtomicBool::new(true),
            control_tx,
        });
        (handle, control_rx)
    }

    /// Unique id of this session, used as the registry key and in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The client's socket address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Restores the liveness flag (SUSPECT → ALIVE). Called by the relay
    /// loop whenever the client answers a ping.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }
}

impl SweepTarget for SessionHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    fn mark_suspect(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }

    fn ping(&self) {
        // The relay loop may already be gone; a failed send just means the
        // session is shutting down on its own.
        let _ = self.control_tx.send(SessionControl::Ping);
    }

    fn terminate(&self) {
        let _ = self.control_tx.send(SessionControl::Terminate);
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Shared map of all currently accepted sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a freshly accepted session.
    pub fn insert(&self, handle: Arc<SessionHandle>) {
        self.lock().insert(handle.id(), handle);
    }

    /// Removes a session, typically when its relay task exits. Removing an
    /// id the sweeper already pruned is a no-op.
    pub fn remove(&self, id: Uuid) {
        self.lock().remove(&id);
    }

    /// Number of currently registered sessions.
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Runs one sweep pass; returns the number of sessions terminated.
    pub fn sweep(&self) -> usize {
        sweep(&mut self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Arc<SessionHandle>>> {
        // A poisoned registry mutex means a panic while holding the lock,
        // which the synchronous map operations above cannot do.
        self.sessions.lock().expect("session registry mutex poisoned")
    }
}

// ── Sweep interval task ───────────────────────────────────────────────────────

/// Runs the process-wide liveness sweep until `running` is cleared.
///
/// Ticks every `period`, visiting every registered session: unresponsive
/// ones are terminated and removed, the rest are marked suspect and pinged.
pub async fn run_sweeper(
    registry: Arc<SessionRegistry>,
    period: Duration,
    running: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(period);
    // The first tick resolves immediately (at t=0); skip it so sessions get
    // a full interval to answer their first ping.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if !running.load(Ordering::Relaxed) {
            debug!("shutdown flag set; stopping liveness sweeper");
            break;
        }

        let terminated = registry.sweep();
        if terminated > 0 {
            info!("liveness sweep terminated {terminated} unresponsive session(s)");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_new_handle_starts_alive() {
        let (handle, _rx) = SessionHandle::new(loopback());
        assert!(handle.is_alive());
    }

    #[test]
    fn test_mark_suspect_then_mark_alive_round_trip() {
        let (handle, _rx) = SessionHandle::new(loopback());
        handle.mark_suspect();
        assert!(!handle.is_alive());
        handle.mark_alive();
        assert!(handle.is_alive());
    }

    #[test]
    fn test_ping_is_delivered_on_the_control_channel() {
        let (handle, mut rx) = SessionHandle::new(loopback());
        handle.ping();
        assert!(matches!(rx.try_recv(), Ok(SessionControl::Ping)));
    }

    #[test]
    fn test_terminate_is_delivered_on_the_control_channel() {
        let (handle, mut rx) = SessionHandle::new(loopback());
        handle.terminate();
        assert!(matches!(rx.try_recv(), Ok(SessionControl::Terminate)));
    }

    #[test]
    fn test_ping_after_relay_loop_exit_does_not_panic() {
        let (handle, rx) = SessionHandle::new(loopback());
        drop(rx);
        handle.ping();
        handle.terminate();
    }

    #[test]
    fn test_registry_insert_and_remove() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = SessionHandle::new(loopback());
        let id = handle.id();

        registry.insert(handle);
        assert_eq!(registry.active_count(), 1);

        registry.remove(id);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_registry_remove_unknown_id_is_a_no_op() {
        let registry = SessionRegistry::new();
        registry.remove(Uuid::new_v4());
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_registry_sweep_prunes_suspect_sessions() {
        let registry = SessionRegistry::new();
        let (responsive, _rx1) = SessionHandle::new(loopback());
        let (silent, _rx2) = SessionHandle::new(loopback());
        silent.mark_suspect();

        registry.insert(responsive);
        registry.insert(silent);

        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.active_count(), 1);
    }
}
