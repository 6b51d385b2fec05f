//! Consumer cursors over the event log.

use std::sync::atomic::{AtomicU64, Ordering};

/// A position in the log: the next sequence id to read. Sequence ids start
/// at 1, so the starting cursor reads from the beginning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub next_seq: u64,
}

impl Cursor {
    pub fn start() -> Self {
        Self { next_seq: 1 }
    }

    pub fn at(next_seq: u64) -> Self {
        Self { next_seq }
    }
}

/// A named consumer's committed position.
///
/// Each pipeline consumer owns one of these; committing after apply gives
/// at-least-once delivery (a crash between apply and commit redelivers, and
/// downstream dedup-by-seq makes the replay idempotent).
#[derive(Debug)]
pub struct ConsumerCursor {
    name: &'static str,
    next: AtomicU64,
}

impl ConsumerCursor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current committed position.
    pub fn load(&self) -> Cursor {
        Cursor::at(self.next.load(Ordering::Acquire))
    }

    /// Commits a new position after a batch has been applied.
    pub fn commit(&self, cursor: Cursor) {
        self.next.store(cursor.next_seq, Ordering::Release);
    }

    /// Events consumed so far.
    pub fn consumed(&self) -> u64 {
        self.next.load(Ordering::Acquire).saturating_sub(1)
    }
}
