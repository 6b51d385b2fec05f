//! Sequence-id deduplication for at-least-once delivery.

use std::collections::HashSet;

/// Tracks applied event sequence ids so a redelivered event is applied
/// exactly once.
///
/// Sequence ids at or below the watermark are known applied; ids above it
/// sit in an overflow set until the run becomes contiguous and the watermark
/// advances. With globally contiguous seq assignment the overflow set stays
/// tiny, bounded by in-flight reordering.
#[derive(Debug, Default)]
pub struct SeqDedup {
    watermark: u64,
    pending: HashSet<u64>,
}

impl SeqDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a sequence id applied. Returns `true` if it was not seen before.
    pub fn insert(&mut self, seq: u64) -> bool {
        if seq <= self.watermark || !self.pending.insert(seq) {
            return false;
        }
        while self.pending.remove(&(self.watermark + 1)) {
            self.watermark += 1;
        }
        true
    }

    /// Whether a sequence id has already been applied.
    pub fn contains(&self, seq: u64) -> bool {
        seq <= self.watermark || self.pending.contains(&seq)
    }

    /// Highest contiguous applied sequence id.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Number of applied ids above the watermark (reordering backlog).
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut d = SeqDedup::new();
        assert!(d.insert(1));
        assert!(!d.insert(1));
        assert!(d.insert(2));
        assert!(!d.insert(2));
        assert_eq!(d.watermark(), 2);
    }

    #[test]
    fn watermark_advances_through_gaps() {
        let mut d = SeqDedup::new();
        assert!(d.insert(2));
        assert_eq!(d.watermark(), 0);
        assert_eq!(d.pending_len(), 1);

        assert!(d.insert(1));
        assert_eq!(d.watermark(), 2);
        assert_eq!(d.pending_len(), 0);

        assert!(!d.insert(1));
        assert!(!d.insert(2));
        assert!(d.contains(2));
        assert!(!d.contains(3));
    }
}
