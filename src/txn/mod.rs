//! Transaction manager (C8/C9, spec §4.8-§4.9): isolation levels, read
//! views, undo-backed rollback, and the commit/rollback state machine.

mod read_view;
mod undo;

pub use read_view::ReadView;
pub use undo::{Savepoint, UndoAction, UndoLog};

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::common::{Error, Result, TrxId, TrxIdGenerator};
use crate::lock::LockManager;
use crate::log::LogManager;

/// Isolation level chosen at `begin`, driving whether (and how) a read
/// view is created (spec §4.8/§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::RepeatableRead
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxState {
    NotStarted,
    Active,
    CommittedInMemory,
    RolledBack,
}

/// One active (or just-finished) transaction.
///
/// Generic over `'a` so that `push_undo` can capture borrowed handles
/// (a `&'a BTreeIndex<'a>`, a `&'a TableDef`, ...) directly in its undo
/// closures, rather than needing `'static` ownership or an unsafe
/// pointer cast to get there.
pub struct Transaction<'a> {
    pub id: TrxId,
    pub isolation: IsolationLevel,
    state: Mutex<TrxState>,
    pub(crate) undo: Mutex<UndoLog<'a>>,
    read_view: RwLock<Option<ReadView>>,
}

impl<'a> Transaction<'a> {
    pub fn state(&self) -> TrxState {
        *self.state.lock()
    }

    pub fn read_view(&self) -> Option<ReadView> {
        self.read_view.read().clone()
    }

    /// Record an undo action for the current statement. DML call sites
    /// push the inverse of whatever they just did.
    pub fn push_undo(&self, action: UndoAction<'a>) {
        self.undo.lock().push(action);
    }

    pub fn savepoint(&self, name: impl Into<String>) {
        self.undo.lock().savepoint(name);
    }

    pub fn release_savepoint(&self, name: &str) -> bool {
        self.undo.lock().release(name)
    }
}

/// Owns the active-transaction set, the id generator, and drives
/// commit/rollback through the lock manager and redo log.
pub struct TransactionManager {
    id_gen: TrxIdGenerator,
    active: RwLock<HashSet<TrxId>>,
    locks: Arc<LockManager>,
    log: Arc<LogManager>,
}

impl TransactionManager {
    pub fn new(locks: Arc<LockManager>, log: Arc<LogManager>) -> Self {
        Self {
            id_gen: TrxIdGenerator::new(),
            active: RwLock::new(HashSet::new()),
            locks,
            log,
        }
    }

    /// `NOT_STARTED -> ACTIVE`: allocate an id, register it as active, and
    /// (for `RepeatableRead`/`Serializable`) open a read view immediately.
    /// `ReadCommitted` opens a fresh view per statement instead (callers
    /// call `refresh_read_view`).
    pub fn begin<'a>(&self, isolation: IsolationLevel) -> Arc<Transaction<'a>> {
        let id = self.id_gen.next();
        self.active.write().insert(id);

        let view = match isolation {
            IsolationLevel::ReadUncommitted => None,
            IsolationLevel::ReadCommitted => Some(self.build_view(id)),
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                Some(self.build_view(id))
            }
        };

        Arc::new(Transaction {
            id,
            isolation,
            state: Mutex::new(TrxState::Active),
            undo: Mutex::new(UndoLog::new()),
            read_view: RwLock::new(view),
        })
    }

    /// `ReadCommitted` transactions take a fresh view before each
    /// statement; other levels keep their original view for the whole
    /// transaction.
    pub fn refresh_read_view(&self, trx: &Transaction<'_>) {
        if trx.isolation == IsolationLevel::ReadCommitted {
            *trx.read_view.write() = Some(self.build_view(trx.id));
        }
    }

    fn build_view(&self, creator: TrxId) -> ReadView {
        let active: Vec<TrxId> = self
            .active
            .read()
            .iter()
            .copied()
            .filter(|&id| id != creator)
            .collect();
        ReadView::open(creator, active, self.id_gen.peek())
    }

    /// `ACTIVE -> COMMITTED_IN_MEMORY`: force the redo log up to the
    /// commit point (per `flush_log_at_trx_commit`), release every lock,
    /// and drop the transaction from the active set.
    pub fn commit(&self, trx: &Transaction<'_>) -> Result<()> {
        {
            let mut state = trx.state.lock();
            if *state != TrxState::Active {
                return Err(Error::Generic("commit on non-active transaction".into()));
            }
            *state = TrxState::CommittedInMemory;
        }
        let commit_lsn = self.log.current_lsn();
        self.log.commit_flush(commit_lsn)?;
        self.locks.release_all(trx.id);
        self.active.write().remove(&trx.id);
        Ok(())
    }

    /// `ACTIVE -> ROLLED_BACK`: unwind the whole undo chain, release every
    /// lock, and drop from the active set.
    pub fn rollback(&self, trx: &Transaction<'_>) -> Result<()> {
        {
            let mut state = trx.state.lock();
            if *state != TrxState::Active {
                return Err(Error::Generic("rollback on non-active transaction".into()));
            }
            *state = TrxState::RolledBack;
        }
        trx.undo.lock().rollback_all();
        self.locks.release_all(trx.id);
        self.active.write().remove(&trx.id);
        Ok(())
    }

    /// Roll back only to a savepoint, leaving the transaction `Active`.
    pub fn rollback_to_savepoint(&self, trx: &Transaction<'_>, name: &str) -> Result<()> {
        if trx.state() != TrxState::Active {
            return Err(Error::Generic("rollback_to on non-active transaction".into()));
        }
        if !trx.undo.lock().rollback_to(name) {
            return Err(Error::NoSavepoint(name.to_string()));
        }
        Ok(())
    }

    pub fn active_trx_count(&self) -> usize {
        self.active.read().len()
    }

    pub fn oldest_active_trx_id(&self) -> Option<TrxId> {
        self.active.read().iter().min().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManager;
    use tempfile::tempdir;

    fn setup() -> (TransactionManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let log = LogManager::create(dir.path().join("redo.log"), 8).unwrap();
        let locks = Arc::new(LockManager::new());
        (TransactionManager::new(locks, Arc::new(log)), dir)
    }

    #[test]
    fn test_begin_assigns_unique_ids() {
        let (tm, _d) = setup();
        let t1 = tm.begin(IsolationLevel::RepeatableRead);
        let t2 = tm.begin(IsolationLevel::RepeatableRead);
        assert_ne!(t1.id, t2.id);
        assert_eq!(tm.active_trx_count(), 2);
    }

    #[test]
    fn test_read_uncommitted_has_no_view() {
        let (tm, _d) = setup();
        let t = tm.begin(IsolationLevel::ReadUncommitted);
        assert!(t.read_view().is_none());
    }

    #[test]
    fn test_repeatable_read_view_hides_concurrent_active() {
        let (tm, _d) = setup();
        let t1 = tm.begin(IsolationLevel::RepeatableRead);
        let t2 = tm.begin(IsolationLevel::RepeatableRead);
        let view = t1.read_view().unwrap();
        assert!(!view.sees(t2.id));
    }

    #[test]
    fn test_commit_removes_from_active_set() {
        let (tm, _d) = setup();
        let t = tm.begin(IsolationLevel::RepeatableRead);
        tm.commit(&t).unwrap();
        assert_eq!(tm.active_trx_count(), 0);
        assert_eq!(t.state(), TrxState::CommittedInMemory);
    }

    #[test]
    fn test_rollback_runs_undo_chain() {
        let (tm, _d) = setup();
        let t = tm.begin(IsolationLevel::RepeatableRead);
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let f = flag.clone();
        t.push_undo(Box::new(move || f.store(true, std::sync::atomic::Ordering::SeqCst)));
        tm.rollback(&t).unwrap();
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(t.state(), TrxState::RolledBack);
    }

    #[test]
    fn test_double_commit_fails() {
        let (tm, _d) = setup();
        let t = tm.begin(IsolationLevel::RepeatableRead);
        tm.commit(&t).unwrap();
        assert!(tm.commit(&t).is_err());
    }
}
