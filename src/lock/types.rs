//! Lock modes and compatibility (spec §4.7).

use crate::common::TrxId;

/// Table-level intent/full lock modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Intention-shared: plan to take row `S` locks.
    IS,
    /// Intention-exclusive: plan to take row `X` locks.
    IX,
    /// Shared.
    S,
    /// Exclusive.
    X,
    /// Auto-increment: serializes `INSERT`s that consume the counter.
    AutoInc,
}

impl LockMode {
    /// Standard 5x5 table-lock compatibility matrix.
    pub fn compatible_with(self, other: LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (IS, IS) | (IS, IX) | (IX, IS) | (IX, IX) => true,
            (IS, S) | (S, IS) => true,
            (S, S) => true,
            (AutoInc, AutoInc) => false,
            (AutoInc, _) | (_, AutoInc) => true,
            _ => false,
        }
    }
}

/// Per-record lock flags, orthogonal to `LockMode` (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecLockFlag {
    /// Locks the record and the gap before it.
    Ordinary,
    /// Locks only the gap before the record, not the record itself.
    Gap,
    /// Locks only the record, not the gap (`REC_NOT_GAP`).
    RecNotGap,
    /// Gap lock taken by an `INSERT` about to create a record there;
    /// only conflicts with other insert-intention locks.
    InsertIntention,
}

impl RecLockFlag {
    /// Record-lock compatibility, independent of `LockMode` compatibility
    /// (both must hold for two record locks to coexist).
    pub fn compatible_with(self, other: RecLockFlag) -> bool {
        use RecLockFlag::*;
        match (self, other) {
            (InsertIntention, InsertIntention) => false,
            (Gap, Gap) => true,
            (Gap, InsertIntention) | (InsertIntention, Gap) => true,
            (RecNotGap, Gap) | (Gap, RecNotGap) => true,
            (InsertIntention, RecNotGap) | (RecNotGap, InsertIntention) => true,
            _ => false,
        }
    }

    pub fn is_gap_only(self) -> bool {
        matches!(self, RecLockFlag::Gap | RecLockFlag::InsertIntention)
    }
}

/// Identifies the heap position a record lock covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub space_id: u32,
    pub page_no: u32,
    pub heap_no: u32,
}

/// One granted-or-waiting lock request, either table- or record-scoped.
/// `mode` is `None` for record-lock entries, which this engine tracks
/// only by `rec_flag` (no separate S/X mode per record lock).
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub trx_id: TrxId,
    pub mode: Option<LockMode>,
    pub rec_flag: Option<RecLockFlag>,
    pub granted: bool,
}
