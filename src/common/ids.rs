//! Transaction and tablespace identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a tablespace. `0` is the shared system tablespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SpaceId(pub u32);

impl SpaceId {
    /// The shared system tablespace holding SYS_* tables.
    pub const SYSTEM: SpaceId = SpaceId(0);
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space({})", self.0)
    }
}

/// Identifies a transaction. Monotonically increasing within one engine's
/// lifetime; `0` never denotes a real transaction (used as a sentinel for
/// "no trx" / "committed before any visible trx").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrxId(pub u64);

impl TrxId {
    /// Sentinel meaning "no transaction" / "implicitly committed".
    pub const NONE: TrxId = TrxId(0);
}

impl fmt::Display for TrxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trx({})", self.0)
    }
}

/// Log sequence number: a monotonic byte offset into the logical redo
/// stream. `Lsn(0)` means "nothing written yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    pub fn advance(self, by: u64) -> Lsn {
        Lsn(self.0 + by)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lsn({})", self.0)
    }
}

/// Monotonic generator for transaction ids, shared by the transaction
/// manager. Kept separate from `TransactionManager` so the lock manager and
/// undo subsystem can each hold a cheap handle to it without sharing the
/// whole manager.
#[derive(Debug, Default)]
pub struct TrxIdGenerator {
    next: AtomicU64,
}

impl TrxIdGenerator {
    /// Create a generator that will hand out ids starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next transaction id.
    pub fn next(&self) -> TrxId {
        TrxId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Peek at the id that would be handed out next, without consuming it.
    pub fn peek(&self) -> TrxId {
        TrxId(self.next.load(Ordering::Relaxed))
    }
}
