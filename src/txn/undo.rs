//! Per-transaction undo chain (spec §4.8).
//!
//! Unlike the original's on-disk undo segments (needed so a crash can
//! redo-then-undo incomplete transactions), this engine's undo chain is
//! kept in memory only: each entry is a closure that reverses one row
//! change. That's enough for in-process rollback and savepoints; crash
//! recovery here relies solely on the redo log plus discarding any
//! transaction that wasn't durably committed (recorded as a simplification
//! in the design ledger).

/// One undoable action: applying it reverses the effect of the DML
/// operation that pushed it. Parameterized over `'a` so it can borrow
/// the index/table handles the DML layer is already holding, instead of
/// needing `'static` ownership (and the unsafe-pointer tricks that would
/// otherwise take to get there).
pub type UndoAction<'a> = Box<dyn FnOnce() + Send + 'a>;

/// A named point in a transaction's undo chain that `rollback_to` can
/// return to.
pub struct Savepoint {
    pub name: String,
    /// Number of undo actions recorded when the savepoint was taken.
    pub depth: usize,
}

/// Stack of undo actions for one transaction, with named savepoints.
pub struct UndoLog<'a> {
    actions: Vec<UndoAction<'a>>,
    savepoints: Vec<Savepoint>,
}

impl<'a> Default for UndoLog<'a> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
            savepoints: Vec::new(),
        }
    }
}

impl<'a> UndoLog<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: UndoAction<'a>) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Record a savepoint at the current depth.
    pub fn savepoint(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.savepoints.retain(|s| s.name != name);
        self.savepoints.push(Savepoint {
            name,
            depth: self.actions.len(),
        });
    }

    /// Forget a savepoint without rolling back to it (`RELEASE SAVEPOINT`).
    pub fn release(&mut self, name: &str) -> bool {
        let before = self.savepoints.len();
        self.savepoints.retain(|s| s.name != name);
        self.savepoints.len() != before
    }

    /// Unwind the undo chain back to `name`'s depth, running each action
    /// in reverse (most-recent-first) order, and drop later savepoints.
    pub fn rollback_to(&mut self, name: &str) -> bool {
        let Some(depth) = self.savepoints.iter().find(|s| s.name == name).map(|s| s.depth) else {
            return false;
        };
        self.unwind_to(depth);
        self.savepoints.retain(|s| s.depth <= depth);
        true
    }

    /// Unwind the entire chain (full transaction rollback).
    pub fn rollback_all(&mut self) {
        self.unwind_to(0);
        self.savepoints.clear();
    }

    fn unwind_to(&mut self, depth: usize) {
        while self.actions.len() > depth {
            if let Some(action) = self.actions.pop() {
                action();
            }
        }
    }
}
