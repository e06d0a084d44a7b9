//! Resumable session state
//!
//! What survives a reconnect: the session id handed out by READY and the
//! last sequence number seen. Held in memory only, scoped to the process.

/// Session state for one shard.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Session id from the last READY, if a resumable session exists.
    pub id: Option<String>,

    /// Last received dispatch sequence number.
    pub sequence: Option<u64>,
}

impl Session {
    /// Whether a resume is possible at all.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.id.is_some() && self.sequence.is_some()
    }

    /// Record a dispatched sequence number.
    pub fn observe_sequence(&mut self, seq: u64) {
        self.sequence = Some(seq);
    }

    /// Forget the session; the next connect must identify fresh.
    pub fn clear(&mut self) {
        self.id = None;
        self.sequence = None;
    }
}
