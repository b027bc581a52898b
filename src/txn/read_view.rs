//! MVCC read views (spec §4.8): a snapshot of which transactions' changes
//! a reader should (not) see.

use crate::common::TrxId;

/// A consistent read snapshot, built when a transaction's isolation level
/// calls for one.
///
/// A row version written by `trx_id` is visible iff:
/// - `trx_id == creator_id` (the reader sees its own uncommitted writes), or
/// - `trx_id < up_limit_id` (committed before any trx considered active
///   when the view was built), or
/// - `up_limit_id <= trx_id < low_limit_id` and `trx_id` is not in
///   `active_trx_ids` (committed while the view was open, but after every
///   trx that was active when it opened).
#[derive(Debug, Clone)]
pub struct ReadView {
    /// One past the highest trx id assigned at view-creation time;
    /// anything `>= low_limit_id` is invisible (created after the view).
    pub low_limit_id: TrxId,
    /// Smallest id among trxs active when the view was created; anything
    /// below this is guaranteed visible.
    pub up_limit_id: TrxId,
    /// The transaction that created this view.
    pub creator_id: TrxId,
    /// Ids active (uncommitted) at view-creation time, sorted ascending.
    pub active_trx_ids: Vec<TrxId>,
}

impl ReadView {
    /// Build a view snapshotting `active` (the currently active trx ids,
    /// not including `creator_id`) against the next-to-assign id
    /// `next_id`.
    pub fn open(creator_id: TrxId, mut active: Vec<TrxId>, next_id: TrxId) -> Self {
        active.sort_unstable();
        let up_limit_id = active.first().copied().unwrap_or(next_id);
        Self {
            low_limit_id: next_id,
            up_limit_id,
            creator_id,
            active_trx_ids: active,
        }
    }

    /// Whether a row version last written by `trx_id` is visible under
    /// this view.
    pub fn sees(&self, trx_id: TrxId) -> bool {
        if trx_id == self.creator_id {
            return true;
        }
        if trx_id < self.up_limit_id {
            return true;
        }
        if trx_id >= self.low_limit_id {
            return false;
        }
        self.active_trx_ids.binary_search(&trx_id).is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sees_own_writes() {
        let view = ReadView::open(TrxId(5), vec![TrxId(3), TrxId(4)], TrxId(6));
        assert!(view.sees(TrxId(5)));
    }

    #[test]
    fn test_sees_long_committed() {
        let view = ReadView::open(TrxId(5), vec![TrxId(3), TrxId(4)], TrxId(6));
        assert!(view.sees(TrxId(1)));
    }

    #[test]
    fn test_hides_future_trx() {
        let view = ReadView::open(TrxId(5), vec![TrxId(3), TrxId(4)], TrxId(6));
        assert!(!view.sees(TrxId(6)));
        assert!(!view.sees(TrxId(100)));
    }

    #[test]
    fn test_hides_still_active_trx() {
        let view = ReadView::open(TrxId(5), vec![TrxId(3), TrxId(4)], TrxId(6));
        assert!(!view.sees(TrxId(3)));
        assert!(!view.sees(TrxId(4)));
    }
}
