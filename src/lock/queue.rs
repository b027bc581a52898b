//! Lock queue iterator (spec §4.7), grounded on
//! `original_source/innodb/src/lock/src/lock_iter.cpp`'s
//! `lock_queue_iterator_reset`/`lock_queue_iterator_get_prev`: walks a
//! table's or record's lock queue backward from a starting request,
//! for diagnostic introspection (e.g. reporting who a waiter is queued
//! behind).

use super::types::LockRequest;

/// Iterates a lock-queue snapshot from a starting arrival position back
/// toward the front of the queue. `reset` takes the queue (as produced
/// by [`super::LockManager::table_lock_queue`]/`record_lock_queue`) and
/// an index into it, mirroring `lock_queue_iterator_reset`'s `(lock,
/// bit_no)` pair; `get_prev` mirrors `lock_queue_iterator_get_prev`.
pub struct LockQueueIterator {
    queue: Vec<LockRequest>,
    current: Option<usize>,
}

impl LockQueueIterator {
    /// Start iterating `queue` from arrival position `start`. `start`
    /// out of bounds (an empty queue, or a stale index) leaves the
    /// iterator positioned on nothing, matching `get_prev` returning
    /// `NULL` immediately.
    pub fn reset(queue: Vec<LockRequest>, start: usize) -> Self {
        let current = if start < queue.len() { Some(start) } else { None };
        Self { queue, current }
    }

    /// The request the iterator currently sits on, or `None` if the
    /// queue was empty or iteration has run off the front.
    pub fn current(&self) -> Option<&LockRequest> {
        self.current.and_then(|i| self.queue.get(i))
    }

    /// Step to the request that arrived just before the current one,
    /// returning it, or `None` if the current request is already the
    /// first in the queue.
    pub fn get_prev(&mut self) -> Option<&LockRequest> {
        let idx = self.current?;
        if idx == 0 {
            self.current = None;
            return None;
        }
        self.current = Some(idx - 1);
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TrxId;

    fn req(trx_id: u64, granted: bool) -> LockRequest {
        LockRequest {
            trx_id: TrxId(trx_id),
            mode: None,
            rec_flag: None,
            granted,
        }
    }

    #[test]
    fn test_reset_starts_on_requested_index() {
        let queue = vec![req(1, true), req(2, true), req(3, false)];
        let iter = LockQueueIterator::reset(queue, 2);
        assert_eq!(iter.current().unwrap().trx_id, TrxId(3));
    }

    #[test]
    fn test_get_prev_walks_back_to_front_then_stops() {
        let queue = vec![req(1, true), req(2, true), req(3, false)];
        let mut iter = LockQueueIterator::reset(queue, 2);
        assert_eq!(iter.get_prev().unwrap().trx_id, TrxId(2));
        assert_eq!(iter.get_prev().unwrap().trx_id, TrxId(1));
        assert!(iter.get_prev().is_none());
        assert!(iter.current().is_none());
    }

    #[test]
    fn test_reset_out_of_bounds_is_empty() {
        let iter = LockQueueIterator::reset(Vec::new(), 0);
        assert!(iter.current().is_none());
    }
}
