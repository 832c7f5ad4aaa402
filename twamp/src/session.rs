//! Peer-keyed session state for the Reflector (§3 data model, §4.4 algorithm)
//! and per-target probe history for the Sender (§4.5).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Session idle timeout: a peer tuple that hasn't sent in this long resets to `rseq = 0`.
pub const IDLE_RESET_SECS: f64 = 30.0;
/// Background-sweep reap threshold, per §5: "10x the session timeout".
pub const REAP_AFTER_SECS: f64 = 10.0 * IDLE_RESET_SECS;

#[derive(Debug, Clone, Copy)]
struct ReflectorSession {
    next_sequence: u32,
    reset_deadline: f64,
    cached_padding: Option<usize>,
}

/// The reflector side's peer tuple -> (next reply sequence, reset-deadline) map.
#[derive(Debug)]
pub struct ReflectorSessionTable {
    sessions: HashMap<SocketAddr, ReflectorSession>,
    idle_timeout_secs: f64,
}

impl Default for ReflectorSessionTable {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            idle_timeout_secs: IDLE_RESET_SECS,
        }
    }
}

/// What a reflector does with one incoming probe, decided by [`ReflectorSessionTable::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub rseq: u32,
    /// True on first contact, idle reset, or an explicit peer reset (`sseq == 0`):
    /// the padding cache must be (re)seeded from this packet's length.
    pub is_reset: bool,
}

impl ReflectorSessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table with a non-default idle-reset window, per the `reflector`
    /// subcommand's `--timer` override (§10.5).
    pub fn with_idle_timeout(idle_timeout_secs: f64) -> Self {
        Self {
            sessions: HashMap::new(),
            idle_timeout_secs,
        }
    }

    /// Applies the §4.4 step-2 reset rules and returns the reply sequence to use,
    /// updating `next[p]` and `reset_deadline[p]` per step 6.
    pub fn accept(&mut self, peer: SocketAddr, incoming_sseq: u32, now: f64) -> Accepted {
        let idle_timeout_secs = self.idle_timeout_secs;
        match self.sessions.entry(peer) {
            Entry::Vacant(slot) => {
                slot.insert(ReflectorSession {
                    next_sequence: 1,
                    reset_deadline: now + idle_timeout_secs,
                    cached_padding: None,
                });
                Accepted {
                    rseq: 0,
                    is_reset: true,
                }
            }
            Entry::Occupied(mut slot) => {
                let session = slot.get_mut();
                let is_reset = session.reset_deadline < now || incoming_sseq == 0;
                let rseq = if is_reset { 0 } else { session.next_sequence };
                session.next_sequence = rseq + 1;
                session.reset_deadline = now + idle_timeout_secs;
                if is_reset {
                    session.cached_padding = None;
                }
                Accepted { rseq, is_reset }
            }
        }
    }

    /// Symmetric padding-size cache per §4.4 step 4 and §9's "padding cache" note:
    /// first-packet-wins for a given flow, unless padmix mode overrides it.
    pub fn padding_for(&mut self, peer: SocketAddr, incoming_data_len: usize) -> usize {
        const REPLY_HEADER_LEN: usize = 38;
        let session = self
            .sessions
            .get_mut(&peer)
            .expect("accept() must be called for this peer before padding_for()");
        if let Some(cached) = session.cached_padding {
            return cached;
        }
        let fresh = incoming_data_len.saturating_sub(REPLY_HEADER_LEN);
        session.cached_padding = Some(fresh);
        fresh
    }

    /// Drops peer tuples that have been idle far longer than the normal reset
    /// window, bounding memory under scan-like traffic (§5's "Resources" note).
    pub fn reap_stale(&mut self, now: f64) {
        let reap_after = self.idle_timeout_secs * 10.0;
        self.sessions.retain(|_, s| now - s.reset_deadline < reap_after);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// One sent-and-correlated probe record, per §3's "Sender probe record".
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeRecord {
    pub index: u32,
    pub send_time: f64,
    pub reply_time: Option<f64>,
    pub outbound_ms: Option<f64>,
    pub inbound_ms: Option<f64>,
    pub round_trip_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn first_contact_starts_at_zero() {
        let mut table = ReflectorSessionTable::new();
        let accepted = table.accept(peer(1), 0, 1000.0);
        assert_eq!(accepted.rseq, 0);
        assert!(accepted.is_reset);
    }

    #[test]
    fn sequence_increments_without_reset() {
        let mut table = ReflectorSessionTable::new();
        table.accept(peer(1), 0, 1000.0);
        let second = table.accept(peer(1), 1, 1000.1);
        assert_eq!(second.rseq, 1);
        assert!(!second.is_reset);
        let third = table.accept(peer(1), 2, 1000.2);
        assert_eq!(third.rseq, 2);
    }

    #[test]
    fn idle_past_deadline_resets_sequence() {
        let mut table = ReflectorSessionTable::new();
        table.accept(peer(1), 0, 1000.0);
        table.accept(peer(1), 1, 1000.1);
        let after_idle = table.accept(peer(1), 5, 1000.0 + IDLE_RESET_SECS + 1.0);
        assert_eq!(after_idle.rseq, 0);
        assert!(after_idle.is_reset);
    }

    #[test]
    fn explicit_peer_reset_on_sseq_zero() {
        let mut table = ReflectorSessionTable::new();
        table.accept(peer(1), 0, 1000.0);
        table.accept(peer(1), 1, 1000.1);
        let reset = table.accept(peer(1), 0, 1000.2);
        assert_eq!(reset.rseq, 0);
        assert!(reset.is_reset);
    }

    #[test]
    fn distinct_peer_tuples_get_independent_sequences() {
        let mut table = ReflectorSessionTable::new();
        let a = table.accept(peer(1), 0, 1000.0);
        let b = table.accept(peer(2), 0, 1000.0);
        assert_eq!(a.rseq, 0);
        assert_eq!(b.rseq, 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn padding_cache_is_symmetric_after_first_packet() {
        let mut table = ReflectorSessionTable::new();
        table.accept(peer(1), 0, 1000.0);
        let first = table.padding_for(peer(1), 100);
        table.accept(peer(1), 1, 1000.1);
        let second = table.padding_for(peer(1), 9000);
        assert_eq!(first, second);
    }

    #[test]
    fn reap_drops_long_idle_peers() {
        let mut table = ReflectorSessionTable::new();
        table.accept(peer(1), 0, 0.0);
        table.reap_stale(REAP_AFTER_SECS + IDLE_RESET_SECS + 1.0);
        assert!(table.is_empty());
    }
}
