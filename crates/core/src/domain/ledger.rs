use std::collections::{BTreeMap, BTreeSet};

use crate::domain::catalog::SegmentId;
use crate::domain::error::{DomainError, Result};

/// Per-job bookkeeping of requested segments. Every id lives in exactly one
/// bucket at all times: still pending, materialized, or permanently failed
/// (with a reason). Pending keeps submission order so passes always work the
/// next unprocessed segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentLedger {
    pending: Vec<SegmentId>,
    completed: BTreeSet<SegmentId>,
    failed: BTreeMap<SegmentId, String>,
}

impl SegmentLedger {
    /// Build a fresh ledger from a submission. Duplicate ids collapse to
    /// their first occurrence.
    pub fn new(segment_ids: impl IntoIterator<Item = SegmentId>) -> Self {
        let mut seen = BTreeSet::new();
        let mut pending = Vec::new();
        for id in segment_ids {
            if seen.insert(id.clone()) {
                pending.push(id);
            }
        }
        Self {
            pending,
            completed: BTreeSet::new(),
            failed: BTreeMap::new(),
        }
    }

    /// Reassemble a persisted ledger, rejecting rows whose buckets overlap.
    pub fn from_parts(
        pending: Vec<SegmentId>,
        completed: BTreeSet<SegmentId>,
        failed: BTreeMap<SegmentId, String>,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for id in pending
            .iter()
            .chain(completed.iter())
            .chain(failed.keys())
        {
            if !seen.insert(id) {
                return Err(DomainError::LedgerOverlap(id.clone()));
            }
        }
        Ok(Self {
            pending,
            completed,
            failed,
        })
    }

    pub fn pending(&self) -> &[SegmentId] {
        &self.pending
    }

    pub fn completed(&self) -> &BTreeSet<SegmentId> {
        &self.completed
    }

    pub fn failed(&self) -> &BTreeMap<SegmentId, String> {
        &self.failed
    }

    /// The segment the next unit of work should process.
    pub fn next_pending(&self) -> Option<&SegmentId> {
        self.pending.first()
    }

    pub fn total(&self) -> usize {
        self.pending.len() + self.completed.len() + self.failed.len()
    }

    pub fn processed(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, segment_id: &str) -> bool {
        self.pending.iter().any(|id| id == segment_id)
            || self.completed.contains(segment_id)
            || self.failed.contains_key(segment_id)
    }

    /// Move a pending segment into the completed bucket.
    pub fn mark_completed(&mut self, segment_id: &str) -> Result<()> {
        let id = self.take_pending(segment_id)?;
        self.completed.insert(id);
        Ok(())
    }

    /// Move a pending segment into the failed bucket with a reason.
    pub fn mark_failed(&mut self, segment_id: &str, reason: impl Into<String>) -> Result<()> {
        let id = self.take_pending(segment_id)?;
        self.failed.insert(id, reason.into());
        Ok(())
    }

    fn take_pending(&mut self, segment_id: &str) -> Result<SegmentId> {
        let position = self
            .pending
            .iter()
            .position(|id| id == segment_id)
            .ok_or_else(|| DomainError::SegmentNotPending(segment_id.to_string()))?;
        Ok(self.pending.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<SegmentId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_dedups_and_keeps_order() {
        let ledger = SegmentLedger::new(ids(&["a", "b", "a", "c", "b"]));
        assert_eq!(ledger.pending(), &["a", "b", "c"]);
        assert_eq!(ledger.total(), 3);
    }

    #[test]
    fn test_buckets_partition_every_id() {
        let mut ledger = SegmentLedger::new(ids(&["a", "b", "c"]));
        ledger.mark_completed("a").unwrap();
        ledger.mark_failed("c", "metric missing").unwrap();

        assert_eq!(ledger.pending(), &["b"]);
        assert!(ledger.completed().contains("a"));
        assert_eq!(ledger.failed().get("c").map(String::as_str), Some("metric missing"));
        assert_eq!(ledger.total(), 3);
        assert_eq!(ledger.processed(), 2);
        assert!(!ledger.is_exhausted());
    }

    #[test]
    fn test_mark_unknown_segment_is_rejected() {
        let mut ledger = SegmentLedger::new(ids(&["a"]));
        ledger.mark_completed("a").unwrap();

        let err = ledger.mark_completed("a").unwrap_err();
        assert!(matches!(err, DomainError::SegmentNotPending(_)));
        let err = ledger.mark_failed("zzz", "nope").unwrap_err();
        assert!(matches!(err, DomainError::SegmentNotPending(_)));
    }

    #[test]
    fn test_next_pending_follows_submission_order() {
        let mut ledger = SegmentLedger::new(ids(&["a", "b", "c"]));
        assert_eq!(ledger.next_pending().map(String::as_str), Some("a"));
        ledger.mark_completed("a").unwrap();
        assert_eq!(ledger.next_pending().map(String::as_str), Some("b"));
        ledger.mark_failed("b", "x").unwrap();
        ledger.mark_completed("c").unwrap();
        assert_eq!(ledger.next_pending(), None);
        assert!(ledger.is_exhausted());
    }

    #[test]
    fn test_from_parts_rejects_overlap() {
        let err = SegmentLedger::from_parts(
            ids(&["a", "b"]),
            BTreeSet::from(["b".to_string()]),
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::LedgerOverlap(id) if id == "b"));
    }

    #[test]
    fn test_from_parts_accepts_disjoint_buckets() {
        let ledger = SegmentLedger::from_parts(
            ids(&["c"]),
            BTreeSet::from(["a".to_string()]),
            BTreeMap::from([("b".to_string(), "why".to_string())]),
        )
        .unwrap();
        assert_eq!(ledger.total(), 3);
        assert_eq!(ledger.next_pending().map(String::as_str), Some("c"));
    }
}
