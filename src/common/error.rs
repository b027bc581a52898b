//! Unified error type for InterchangeDB.
//!
//! One enum surfaces every error the core can return, matching the `DB_*`
//! taxonomy consumed by the table cursor API and the DML/DDL engines.

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in InterchangeDB.
///
/// Grouped (loosely) by the error kinds in the error-handling design:
/// validation, conflict, wait, abort, resource, structural, not-found.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Not-found ---
    /// Requested page does not exist on disk.
    #[error("page {0} not found")]
    PageNotFound(u32),
    /// Table not found in the dictionary.
    #[error("table not found: {0}")]
    TableNotFound(String),
    /// Index not found on a table.
    #[error("index not found: {0}")]
    IndexNotFound(String),
    /// Savepoint name not registered on the transaction.
    #[error("no savepoint named {0}")]
    NoSavepoint(String),
    /// Record does not exist at the cursor's search key.
    #[error("record not found")]
    RecordNotFound,
    /// Cursor advanced past the last (or before the first) record.
    #[error("end of index")]
    EndOfIndex,

    // --- Resource ---
    /// Buffer pool has no free frames and cannot evict any pages.
    #[error("no free frames available in buffer pool")]
    NoFreeFrames,
    /// Arena allocator exhausted.
    #[error("out of memory")]
    OutOfMemory,
    /// Backing file/tablespace exhausted.
    #[error("out of file space")]
    OutOfFileSpace,
    /// Too many transactions active concurrently.
    #[error("too many concurrent transactions")]
    TooManyConcurrentTrxs,
    /// Lock table exhausted (fixed-size lock heap full).
    #[error("lock table full")]
    LockTableFull,

    // --- Validation ---
    /// The provided page ID is invalid (e.g., exceeds max pages).
    #[error("invalid page id: {0}")]
    InvalidPageId(u32),
    /// Attempted to unpin a page that wasn't pinned.
    #[error("page {0} is not pinned")]
    PageNotPinned(u32),
    /// A write targeted a column whose type does not accept it.
    #[error("data mismatch writing column")]
    DataMismatch,
    /// Caller input failed basic validation (bad name, bad arity, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// An operation requires the dictionary latch and it isn't held.
    #[error("schema not locked")]
    SchemaNotLocked,
    /// Requested format/feature unsupported by this build.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// A column name appears twice in one index definition.
    #[error("column appears twice in index")]
    ColAppearsTwiceInIndex,
    /// Primary key column evaluated to NULL.
    #[error("primary key is null")]
    PrimaryKeyIsNull,

    // --- Conflict ---
    /// Insert/update violated a unique index.
    #[error("duplicate key in table {table} index {index}")]
    DuplicateKey { table: String, index: String },
    /// Foreign key target row doesn't exist.
    #[error("no referenced row")]
    NoReferencedRow,
    /// Row is referenced by a foreign key and cannot be deleted.
    #[error("row is referenced")]
    RowIsReferenced,
    /// A foreign key constraint duplicates an existing one.
    #[error("foreign key duplicate")]
    ForeignDuplicateKey,
    /// Constraint could not be added (e.g. existing data violates it).
    #[error("cannot add constraint")]
    CannotAddConstraint,
    /// Constraint could not be dropped (e.g. unknown name).
    #[error("cannot drop constraint")]
    CannotDropConstraint,

    // --- Wait / Abort ---
    /// Caller must wait for a lock; handled internally by the retry loop.
    #[error("lock wait")]
    LockWait,
    /// Deadlock detected; this transaction was chosen as victim.
    #[error("deadlock detected")]
    Deadlock,
    /// Statement rolled back to a savepoint after an error.
    #[error("rollback")]
    Rollback,
    /// Lock wait exceeded `lock_wait_timeout`.
    #[error("lock wait timeout")]
    LockWaitTimeout,
    /// Caller or server requested interruption mid-operation.
    #[error("interrupted")]
    Interrupted,

    // --- Structural ---
    /// A page or index failed a structural integrity check.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Table exists in a tablespace that no longer exists.
    #[error("tablespace deleted")]
    TablespaceDeleted,
    /// A file-per-table tablespace with this name already exists.
    #[error("tablespace already exists")]
    TablespaceAlreadyExists,
    /// Generic fatal error; the engine should not continue.
    #[error("fatal error")]
    Fatal,

    // --- Catch-alls kept for parity with the full DB_* surface ---
    #[error("record too big")]
    TooBigRecord,
    #[error("table is being used")]
    TableIsBeingUsed,
    #[error("missing history (undo no longer available)")]
    MissingHistory,
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("readonly")]
    Readonly,
    #[error("operation failed")]
    Fail,
    #[error("overflow")]
    Overflow,
    #[error("underflow")]
    Underflow,
    #[error("generic error: {0}")]
    Generic(String),
}

impl Error {
    /// True for errors that represent a lock wait the DML retry loop should
    /// resolve by waiting, rather than surfacing to the caller immediately.
    pub fn is_wait(&self) -> bool {
        matches!(self, Error::LockWait)
    }

    /// True for errors that abort the current statement (deadlock, timeout,
    /// interruption) per the error-handling design's "Abort" kind.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            Error::Deadlock | Error::LockWaitTimeout | Error::Interrupted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotFound(42);
        assert_eq!(format!("{}", err), "page 42 not found");

        let err = Error::NoFreeFrames;
        assert_eq!(format!("{}", err), "no free frames available in buffer pool");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }
        assert_eq!(might_fail().unwrap(), 42);
    }

    #[test]
    fn test_is_wait_and_abort() {
        assert!(Error::LockWait.is_wait());
        assert!(!Error::LockWait.is_abort());
        assert!(Error::Deadlock.is_abort());
        assert!(Error::LockWaitTimeout.is_abort());
        assert!(Error::Interrupted.is_abort());
        assert!(!Error::Fatal.is_abort());
    }
}
