//! Liveness sweep: detection and reclamation of unresponsive sessions.
//!
//! Every registered session carries a liveness flag and moves through a
//! three-state machine:
//!
//! ```text
//! ALIVE ⇄ SUSPECT → TERMINATED
//! ```
//!
//! On each sweep tick, a session whose flag is still cleared from the
//! previous tick has failed to answer a ping in time and is terminated —
//! a terminal transition. Every other session has its flag cleared and
//! receives a ping (→ SUSPECT). A pong arriving at any moment between ticks
//! restores the flag (→ ALIVE).
//!
//! This is the sole mechanism for reclaiming dead clients; there is no
//! per-message timeout. With a 15-second tick the worst-case detection
//! window is roughly 15–30 seconds.
//!
//! The sweep pass itself is a pure function over any [`SweepTarget`]; the
//! interval task that drives it against the real session registry lives in
//! `infrastructure::registry`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

// ── The sweeper's view of a session ───────────────────────────────────────────

/// The minimal interface the sweeper needs from a session.
///
/// The real implementation is `infrastructure::registry::SessionHandle`;
/// tests drive [`sweep`] with hand-rolled fakes.
pub trait SweepTarget {
    /// Current value of the liveness flag.
    fn is_alive(&self) -> bool;

    /// Clears the liveness flag (ALIVE → SUSPECT). The session is expected
    /// to set it again when a pong arrives.
    fn mark_suspect(&self);

    /// Sends a liveness probe to the session. Must not block.
    fn ping(&self);

    /// Forcibly terminates the session, non-gracefully. Must not block.
    fn terminate(&self);
}

// ── Sweep pass ────────────────────────────────────────────────────────────────

/// Runs one sweep tick over every registered session.
///
/// Sessions whose liveness flag is cleared are terminated and removed from
/// `sessions`; all others are marked suspect and pinged. Returns the number
/// of sessions terminated by this pass.
pub fn sweep<T: SweepTarget>(sessions: &mut HashMap<Uuid, Arc<T>>) -> usize {
    let before = sessions.len();

    sessions.retain(|id, session| {
        if session.is_alive() {
            session.mark_suspect();
            session.ping();
            true
        } else {
            debug!("session {id}: no pong since last sweep; terminating");
            session.terminate();
            false
        }
    });

    before - sessions.len()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fake session recording what the sweeper did to it.
    #[derive(Default)]
    struct FakeSession {
        alive: AtomicBool,
        pings: AtomicUsize,
        terminated: AtomicBool,
    }

    impl FakeSession {
        fn alive() -> Arc<Self> {
            let session = Self::default();
            session.alive.store(true, Ordering::Relaxed);
            Arc::new(session)
        }

        fn suspect() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Simulates a pong arriving from the client.
        fn pong(&self) {
            self.alive.store(true, Ordering::Relaxed);
        }
    }

    impl SweepTarget for FakeSession {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::Relaxed)
        }

        fn mark_suspect(&self) {
            self.alive.store(false, Ordering::Relaxed);
        }

        fn ping(&self) {
            self.pings.fetch_add(1, Ordering::Relaxed);
        }

        fn terminate(&self) {
            self.terminated.store(true, Ordering::Relaxed);
        }
    }

    fn registry_of(sessions: &[Arc<FakeSession>]) -> HashMap<Uuid, Arc<FakeSession>> {
        sessions
            .iter()
            .map(|s| (Uuid::new_v4(), Arc::clone(s)))
            .collect()
    }

    #[test]
    fn test_alive_session_becomes_suspect_and_is_pinged() {
        let session = FakeSession::alive();
        let mut sessions = registry_of(&[Arc::clone(&session)]);

        let terminated = sweep(&mut sessions);

        assert_eq!(terminated, 0);
        assert_eq!(sessions.len(), 1);
        assert!(!session.is_alive(), "flag must be cleared (SUSPECT)");
        assert_eq!(session.pings.load(Ordering::Relaxed), 1);
        assert!(!session.terminated.load(Ordering::Relaxed));
    }

    #[test]
    fn test_suspect_session_is_terminated_and_removed() {
        let session = FakeSession::suspect();
        let mut sessions = registry_of(&[Arc::clone(&session)]);

        let terminated = sweep(&mut sessions);

        assert_eq!(terminated, 1);
        assert!(sessions.is_empty(), "terminated session must leave the registry");
        assert!(session.terminated.load(Ordering::Relaxed));
        assert_eq!(session.pings.load(Ordering::Relaxed), 0, "dead sessions get no ping");
    }

    #[test]
    fn test_pong_between_ticks_keeps_the_session_alive() {
        let session = FakeSession::alive();
        let mut sessions = registry_of(&[Arc::clone(&session)]);

        // Tick 1: ALIVE → SUSPECT, ping sent.
        sweep(&mut sessions);
        // The client answers before the next tick.
        session.pong();
        // Tick 2: the session is ALIVE again, so it survives.
        let terminated = sweep(&mut sessions);

        assert_eq!(terminated, 0);
        assert_eq!(sessions.len(), 1);
        assert!(!session.terminated.load(Ordering::Relaxed));
        assert_eq!(session.pings.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_silent_session_dies_on_the_second_tick() {
        let session = FakeSession::alive();
        let mut sessions = registry_of(&[Arc::clone(&session)]);

        assert_eq!(sweep(&mut sessions), 0);
        // No pong arrives.
        assert_eq!(sweep(&mut sessions), 1);

        assert!(sessions.is_empty());
        assert!(session.terminated.load(Ordering::Relaxed));
    }

    #[test]
    fn test_sessions_are_swept_independently() {
        let responsive = FakeSession::alive();
        let silent = FakeSession::suspect();
        let mut sessions = registry_of(&[Arc::clone(&responsive), Arc::clone(&silent)]);

        let terminated = sweep(&mut sessions);

        assert_eq!(terminated, 1);
        assert_eq!(sessions.len(), 1);
        assert!(silent.terminated.load(Ordering::Relaxed));
        assert!(!responsive.terminated.load(Ordering::Relaxed));
        assert_eq!(responsive.pings.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_sweep_of_empty_registry_is_a_no_op() {
        let mut sessions: HashMap<Uuid, Arc<FakeSession>> = HashMap::new();
        assert_eq!(sweep(&mut sessions), 0);
    }
}
