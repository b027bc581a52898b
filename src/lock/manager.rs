//! Lock manager: table locks plus record locks hashed by `(space_id,
//! page_no)` (spec §4.7).

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::common::{Error, Result, SpaceId, TrxId};

use super::deadlock::DeadlockDetector;
use super::types::{LockMode, LockRequest, RecLockFlag, RecordKey};

#[derive(Debug, Clone)]
struct TableLockEntry {
    trx_id: TrxId,
    mode: LockMode,
    granted: bool,
}

/// One record-lock request against a `(space_id, page_no)` bucket,
/// carrying the heap number it covers.
#[derive(Debug, Clone)]
struct RecLockEntry {
    trx_id: TrxId,
    heap_no: u32,
    flag: RecLockFlag,
    granted: bool,
}

#[derive(Default)]
struct LockTable {
    table_locks: HashMap<u64, Vec<TableLockEntry>>,
    /// Bucketed by `(space_id, page_no)`, arrival-ordered within a bucket.
    rec_locks: HashMap<(u32, u32), Vec<RecLockEntry>>,
    deadlock: DeadlockDetector,
    /// Transactions chosen as a deadlock victim by someone else's lock
    /// request while they sat in a wait queue. Consumed (and cleared) by
    /// `take_deadlock_victim`, which the retry loop a victim is suspended
    /// in polls to discover it must roll back.
    victims: HashSet<TrxId>,
}

/// Table + record lock manager, matching the latch/lock hierarchy and
/// deadlock-detection contract in spec §4.7/§5.
pub struct LockManager {
    inner: Mutex<LockTable>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LockTable::default()),
        }
    }

    /// Acquire a table lock for `trx_id` on `table_id`. Grants immediately
    /// if compatible with all granted holders; otherwise runs deadlock
    /// detection and either waits (by returning `Ok` with the request
    /// queued, caller polls) or surfaces `Error::Deadlock` if `trx_id`
    /// itself is chosen victim.
    pub fn acquire_table_lock(&self, trx_id: TrxId, table_id: u64, mode: LockMode) -> Result<()> {
        let mut inner = self.inner.lock();
        let entries = inner.table_locks.entry(table_id).or_default();

        if let Some(existing) = entries.iter().find(|e| e.trx_id == trx_id && e.granted) {
            if existing.mode == mode || matches!((existing.mode, mode), (LockMode::IX, LockMode::IS)) {
                return Ok(());
            }
        }

        let compatible = entries
            .iter()
            .filter(|e| e.granted && e.trx_id != trx_id)
            .all(|e| e.mode.compatible_with(mode));

        if compatible {
            entries.push(TableLockEntry {
                trx_id,
                mode,
                granted: true,
            });
            return Ok(());
        }

        let blocker = entries
            .iter()
            .find(|e| e.granted && e.trx_id != trx_id)
            .map(|e| e.trx_id)
            .expect("incompatible implies a granted blocker exists");

        // `entries`'s borrow ends here; the cycle-found branch below
        // needs unrestricted access to `inner` to unwind the victim's
        // waiting requests wherever they sit, not just in this bucket.
        let cycle_victim = inner.deadlock.would_deadlock(trx_id, blocker);
        match cycle_victim {
            Some(victim) if victim == trx_id => {
                // The caller itself closes the cycle: back out its own
                // just-added wait-for edge and abort this request.
                inner.deadlock.remove_waiter(trx_id);
                return Err(Error::Deadlock);
            }
            Some(victim) => {
                // Some other transaction in the cycle is the youngest:
                // that one is the victim, not the caller. Mark it so its
                // own thread discovers the deadlock (the retry loop it's
                // suspended in polls `take_deadlock_victim`) and release
                // its waiting lock requests, wherever in the lock table
                // they are, so the cycle actually breaks. The caller's
                // new wait-for edge stays — it's a legitimate wait now
                // that the victim's edges are gone.
                inner.deadlock.remove_waiter(victim);
                inner.victims.insert(victim);
                release_waiting_requests(&mut inner, victim);
            }
            None => {}
        }

        let entries = inner.table_locks.entry(table_id).or_default();
        entries.push(TableLockEntry {
            trx_id,
            mode,
            granted: false,
        });
        Err(Error::LockWait)
    }

    pub fn release_table_locks(&self, trx_id: TrxId) {
        let mut inner = self.inner.lock();
        inner.deadlock.remove_waiter(trx_id);
        inner.victims.remove(&trx_id);
        for entries in inner.table_locks.values_mut() {
            entries.retain(|e| e.trx_id != trx_id);
            promote_waiters_table(entries);
        }
    }

    /// Returns `true` (and clears the mark) if `trx_id` was chosen as a
    /// deadlock victim by some other transaction's lock request since it
    /// started waiting. Polled by [`super::wait_for_lock`] so a
    /// suspended caller discovers it must roll back instead of retrying
    /// a request this manager already tore down.
    pub fn take_deadlock_victim(&self, trx_id: TrxId) -> bool {
        self.inner.lock().victims.remove(&trx_id)
    }

    /// Snapshot of `table_id`'s lock queue in arrival order, for
    /// [`super::queue::LockQueueIterator`] diagnostics.
    pub fn table_lock_queue(&self, table_id: u64) -> Vec<LockRequest> {
        let inner = self.inner.lock();
        inner
            .table_locks
            .get(&table_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| LockRequest {
                        trx_id: e.trx_id,
                        mode: Some(e.mode),
                        rec_flag: None,
                        granted: e.granted,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the lock queue covering `key`'s heap number, in
    /// arrival order, for [`super::queue::LockQueueIterator`] diagnostics.
    pub fn record_lock_queue(&self, key: RecordKey) -> Vec<LockRequest> {
        let inner = self.inner.lock();
        inner
            .rec_locks
            .get(&(key.space_id, key.page_no))
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|e| e.heap_no == key.heap_no)
                    .map(|e| LockRequest {
                        trx_id: e.trx_id,
                        mode: None,
                        rec_flag: Some(e.flag),
                        granted: e.granted,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Acquire a record lock on `(space_id, page_no, heap_no)`. See
    /// `acquire_table_lock` for the wait/deadlock contract.
    pub fn acquire_record_lock(
        &self,
        trx_id: TrxId,
        key: RecordKey,
        flag: RecLockFlag,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let bucket = inner
            .rec_locks
            .entry((key.space_id, key.page_no))
            .or_default();

        if bucket
            .iter()
            .any(|e| e.trx_id == trx_id && e.heap_no == key.heap_no && e.granted && e.flag == flag)
        {
            return Ok(());
        }

        let conflict = bucket.iter().find(|e| {
            e.granted && e.trx_id != trx_id && e.heap_no == key.heap_no && !e.flag.compatible_with(flag)
        });

        if conflict.is_none() {
            bucket.push(RecLockEntry {
                trx_id,
                heap_no: key.heap_no,
                flag,
                granted: true,
            });
            return Ok(());
        }

        let blocker = conflict.unwrap().trx_id;
        let cycle_victim = inner.deadlock.would_deadlock(trx_id, blocker);
        match cycle_victim {
            Some(victim) if victim == trx_id => {
                inner.deadlock.remove_waiter(trx_id);
                return Err(Error::Deadlock);
            }
            Some(victim) => {
                // See the matching branch in `acquire_table_lock`: the
                // victim is some other transaction in the cycle, so mark
                // and unwind *its* waiting requests rather than the
                // caller's.
                inner.deadlock.remove_waiter(victim);
                inner.victims.insert(victim);
                release_waiting_requests(&mut inner, victim);
            }
            None => {}
        }

        let bucket = inner
            .rec_locks
            .entry((key.space_id, key.page_no))
            .or_default();
        bucket.push(RecLockEntry {
            trx_id,
            heap_no: key.heap_no,
            flag,
            granted: false,
        });
        Err(Error::LockWait)
    }

    pub fn release_record_locks(&self, trx_id: TrxId) {
        let mut inner = self.inner.lock();
        inner.deadlock.remove_waiter(trx_id);
        inner.victims.remove(&trx_id);
        for bucket in inner.rec_locks.values_mut() {
            bucket.retain(|e| e.trx_id != trx_id);
            promote_waiters_rec(bucket);
        }
    }

    /// Release every lock (table and record) held by `trx_id`, in the
    /// reverse order the spec's commit path requires.
    pub fn release_all(&self, trx_id: TrxId) {
        self.release_record_locks(trx_id);
        self.release_table_locks(trx_id);
    }

    /// Shift every record lock on heap numbers `>= split_at` up by one,
    /// mirroring `lock_update_split_right` when a page split inserts a
    /// new record in the middle of the heap-number space.
    pub fn update_split_right(&self, space_id: SpaceId, page_no: u32, split_at: u32) {
        let mut inner = self.inner.lock();
        if let Some(bucket) = inner.rec_locks.get_mut(&(space_id.0, page_no)) {
            for entry in bucket.iter_mut() {
                if entry.heap_no >= split_at {
                    entry.heap_no += 1;
                }
            }
        }
    }

    /// Drop every lock referencing `page_no` in `space_id`, mirroring
    /// `lock_update_discard` when a page is freed.
    pub fn discard_page(&self, space_id: SpaceId, page_no: u32) {
        let mut inner = self.inner.lock();
        inner.rec_locks.remove(&(space_id.0, page_no));
    }

    /// Count of granted+waiting locks held anywhere by `trx_id` (test/
    /// introspection helper).
    pub fn lock_count(&self, trx_id: TrxId) -> usize {
        let inner = self.inner.lock();
        let table: usize = inner
            .table_locks
            .values()
            .map(|v| v.iter().filter(|e| e.trx_id == trx_id).count())
            .sum();
        let rec: usize = inner
            .rec_locks
            .values()
            .map(|v| v.iter().filter(|e| e.trx_id == trx_id).count())
            .sum();
        table + rec
    }
}

/// Tears down every still-waiting request belonging to `victim`, in
/// whichever table- or record-lock bucket it sits, and promotes any
/// other waiter that becomes grantable as a result. Used when a
/// deadlock's chosen victim is not the transaction making the request
/// that detected the cycle.
fn release_waiting_requests(table: &mut LockTable, victim: TrxId) {
    for entries in table.table_locks.values_mut() {
        entries.retain(|e| !(e.trx_id == victim && !e.granted));
        promote_waiters_table(entries);
    }
    for bucket in table.rec_locks.values_mut() {
        bucket.retain(|e| !(e.trx_id == victim && !e.granted));
        promote_waiters_rec(bucket);
    }
}

fn promote_waiters_table(entries: &mut [TableLockEntry]) {
    let granted_modes: Vec<LockMode> = entries.iter().filter(|e| e.granted).map(|e| e.mode).collect();
    for e in entries.iter_mut() {
        if !e.granted && granted_modes.iter().all(|m| m.compatible_with(e.mode)) {
            e.granted = true;
        }
    }
}

fn promote_waiters_rec(entries: &mut [RecLockEntry]) {
    for i in 0..entries.len() {
        if entries[i].granted {
            continue;
        }
        let (heap_no, flag) = (entries[i].heap_no, entries[i].flag);
        let conflict = entries
            .iter()
            .enumerate()
            .any(|(j, e)| j != i && e.granted && e.heap_no == heap_no && !e.flag.compatible_with(flag));
        if !conflict {
            entries[i].granted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lock_compatible_grants_immediately() {
        let lm = LockManager::new();
        lm.acquire_table_lock(TrxId(1), 1, LockMode::IS).unwrap();
        lm.acquire_table_lock(TrxId(2), 1, LockMode::IS).unwrap();
    }

    #[test]
    fn test_table_lock_conflict_waits() {
        let lm = LockManager::new();
        lm.acquire_table_lock(TrxId(1), 1, LockMode::X).unwrap();
        let err = lm.acquire_table_lock(TrxId(2), 1, LockMode::S).unwrap_err();
        assert!(err.is_wait());
    }

    #[test]
    fn test_release_unblocks_waiter() {
        let lm = LockManager::new();
        lm.acquire_table_lock(TrxId(1), 1, LockMode::X).unwrap();
        assert!(lm.acquire_table_lock(TrxId(2), 1, LockMode::S).is_err());
        lm.release_all(TrxId(1));
        // Waiter entry now granted; re-attempt from trx 2 finds itself
        // already holding the lock.
        lm.acquire_table_lock(TrxId(2), 1, LockMode::S).unwrap();
    }

    #[test]
    fn test_record_lock_gap_compatible_with_insert_intention() {
        let lm = LockManager::new();
        let key = RecordKey {
            space_id: 1,
            page_no: 1,
            heap_no: 5,
        };
        lm.acquire_record_lock(TrxId(1), key, RecLockFlag::Gap).unwrap();
        lm.acquire_record_lock(TrxId(2), key, RecLockFlag::InsertIntention)
            .unwrap();
    }

    #[test]
    fn test_record_lock_ordinary_conflicts() {
        let lm = LockManager::new();
        let key = RecordKey {
            space_id: 1,
            page_no: 1,
            heap_no: 5,
        };
        lm.acquire_record_lock(TrxId(1), key, RecLockFlag::Ordinary).unwrap();
        let err = lm
            .acquire_record_lock(TrxId(2), key, RecLockFlag::Ordinary)
            .unwrap_err();
        assert!(err.is_wait());
    }

    #[test]
    fn test_deadlock_detected() {
        let lm = LockManager::new();
        lm.acquire_table_lock(TrxId(1), 1, LockMode::X).unwrap();
        lm.acquire_table_lock(TrxId(2), 2, LockMode::X).unwrap();
        assert!(lm.acquire_table_lock(TrxId(1), 2, LockMode::X).is_err());
        let err = lm.acquire_table_lock(TrxId(2), 1, LockMode::X).unwrap_err();
        assert!(matches!(err, Error::Deadlock));
    }

    #[test]
    fn test_deadlock_marks_true_victim_not_the_caller() {
        let lm = LockManager::new();
        // trx 1 holds table 10; trx 3 holds table 20.
        lm.acquire_table_lock(TrxId(1), 10, LockMode::X).unwrap();
        lm.acquire_table_lock(TrxId(3), 20, LockMode::X).unwrap();
        // trx 3 now waits on trx 1's table (edge 3 -> 1, no cycle yet).
        assert!(lm.acquire_table_lock(TrxId(3), 10, LockMode::X).is_err());
        assert_eq!(lm.lock_count(TrxId(3)), 2);

        // trx 1 requests trx 3's table: edge 1 -> 3 closes the cycle
        // {1, 3}; the youngest id (3) is the victim, not the caller (1).
        let err = lm.acquire_table_lock(TrxId(1), 20, LockMode::X).unwrap_err();
        assert!(err.is_wait(), "caller should wait, not be told it deadlocked");

        // trx 3 was marked, and its waiting request on table 10 is gone.
        assert!(lm.take_deadlock_victim(TrxId(3)));
        assert!(!lm.take_deadlock_victim(TrxId(3)), "mark is consumed once");
        assert_eq!(lm.lock_count(TrxId(3)), 1);
    }

    #[test]
    fn test_update_split_right_shifts_heap_numbers() {
        let lm = LockManager::new();
        let key = RecordKey {
            space_id: 1,
            page_no: 1,
            heap_no: 5,
        };
        lm.acquire_record_lock(TrxId(1), key, RecLockFlag::Ordinary).unwrap();
        lm.update_split_right(SpaceId(1), 1, 5);
        assert_eq!(lm.lock_count(TrxId(1)), 1);
    }
}
