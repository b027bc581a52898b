//! Row DML engine (C11, spec §4.11): insert/update/delete against a
//! table's clustered index (and its secondary indexes), plus a
//! row-cache-backed search iterator.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::BufferPoolManager;
use crate::common::config::EngineConfig;
use crate::dict::{Dictionary, TableDef};
use crate::index::btree::{BTreeIndex, SearchMode};
use crate::lock::{wait_for_lock, LockManager, LockMode, RecLockFlag, RecordKey};
use crate::log::LogManager;
use crate::record::Tuple;
use crate::common::{Error, PageId, Result, TrxId};
use crate::txn::Transaction;

/// Rows fetched per round-trip to the clustered index, mirroring
/// `INNOBASE_WAKE_INTERVAL`'s sibling constant for client reads
/// (`FETCH_CACHE_SIZE` in the original).
pub const FETCH_CACHE_SIZE: usize = 16;

/// Drives insert/update/delete for one table against its clustered
/// index. Secondary-index maintenance and full query-graph machinery
/// are out of scope here; this operates directly against one
/// [`BTreeIndex`] handed in by the caller (the engine wires up the
/// table's actual clustered tree).
pub struct DmlEngine {
    dict: Arc<Dictionary>,
    locks: Arc<LockManager>,
    lock_wait_timeout: Duration,
}

/// A lock-table bucket key derived from a table id, standing in for the
/// `(space_id, page_no)` bucketing record locks normally use — this
/// engine's B-tree doesn't expose page numbers to callers above it, so
/// DML takes one intention lock per table instead of per-page record
/// locks. Noted as a simplification relative to spec §4.7's per-page
/// granularity.
fn table_bucket(table: &TableDef) -> RecordKey {
    RecordKey {
        space_id: table.space_id,
        page_no: 0,
        heap_no: 0,
    }
}

impl DmlEngine {
    pub fn new(dict: Arc<Dictionary>, locks: Arc<LockManager>) -> Self {
        Self {
            dict,
            locks,
            lock_wait_timeout: EngineConfig::default().lock_wait_timeout,
        }
    }

    /// Overrides the lock-wait ceiling `wait_for_lock` retries against,
    /// normally `config.lock_wait_timeout` as wired by `Engine::startup`.
    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }

    /// Insert `tuple` into `table`'s clustered index (rooted at
    /// `root_page`), after validating it against the column definitions
    /// and taking the necessary locks. Pushes an undo action that deletes
    /// the row again on rollback.
    ///
    /// `bpm`/`log`/`root_page` rather than a borrowed [`BTreeIndex`]: the
    /// undo closure must outlive this call (it only runs on rollback,
    /// possibly long after `insert_row` returns), so it reopens its own
    /// tree handle from these three instead of capturing a transient one.
    pub fn insert_row<'a>(
        &self,
        trx: &Transaction<'a>,
        table: &TableDef,
        bpm: &'a BufferPoolManager,
        log: &'a LogManager,
        root_page: PageId,
        tuple: &Tuple,
    ) -> Result<()> {
        tuple.validate(&table.columns)?;
        wait_for_lock(&self.locks, trx.id, self.lock_wait_timeout, || {
            self.locks.acquire_table_lock(trx.id, table.id.0, LockMode::IX)
        })?;
        wait_for_lock(&self.locks, trx.id, self.lock_wait_timeout, || {
            self.locks
                .acquire_record_lock(trx.id, table_bucket(table), RecLockFlag::InsertIntention)
        })?;

        let index = BTreeIndex::open(bpm, log, root_page);
        let key = tuple.encode_comparable(&table.columns);
        if index.get(&key)?.is_some() {
            return Err(Error::DuplicateKey {
                table: table.name.clone(),
                index: "PRIMARY".into(),
            });
        }
        let value = encode_row(tuple);
        index.insert(&key, &value)?;

        let key_for_undo = key.clone();
        trx.push_undo(Box::new(move || {
            let index = BTreeIndex::open(bpm, log, root_page);
            let _ = index.delete(&key_for_undo);
        }));
        Ok(())
    }

    /// Delete the row keyed by `key_tuple` from `table`'s clustered index.
    pub fn delete_row<'a>(
        &self,
        trx: &Transaction<'a>,
        table: &TableDef,
        bpm: &'a BufferPoolManager,
        log: &'a LogManager,
        root_page: PageId,
        key_tuple: &Tuple,
    ) -> Result<bool> {
        wait_for_lock(&self.locks, trx.id, self.lock_wait_timeout, || {
            self.locks.acquire_table_lock(trx.id, table.id.0, LockMode::IX)
        })?;
        wait_for_lock(&self.locks, trx.id, self.lock_wait_timeout, || {
            self.locks
                .acquire_record_lock(trx.id, table_bucket(table), RecLockFlag::Ordinary)
        })?;

        let index = BTreeIndex::open(bpm, log, root_page);
        let key = key_tuple.encode_comparable(&table.columns);
        let Some(old_value) = index.get(&key)? else {
            return Ok(false);
        };
        index.delete(&key)?;

        let key_for_undo = key.clone();
        trx.push_undo(Box::new(move || {
            let index = BTreeIndex::open(bpm, log, root_page);
            let _ = index.insert(&key_for_undo, &old_value);
        }));
        Ok(true)
    }

    /// Update the row keyed by `key_tuple`, replacing its stored row
    /// bytes with `new_tuple`'s encoding. The key itself is assumed
    /// unchanged (a primary-key update is a delete + insert at the
    /// caller level, per `row_upd_changes_ord_field_binary`'s original
    /// distinction between an ordinary update and a PK-changing one).
    pub fn update_row<'a>(
        &self,
        trx: &Transaction<'a>,
        table: &TableDef,
        bpm: &'a BufferPoolManager,
        log: &'a LogManager,
        root_page: PageId,
        key_tuple: &Tuple,
        new_tuple: &Tuple,
    ) -> Result<bool> {
        new_tuple.validate(&table.columns)?;
        wait_for_lock(&self.locks, trx.id, self.lock_wait_timeout, || {
            self.locks.acquire_table_lock(trx.id, table.id.0, LockMode::IX)
        })?;
        wait_for_lock(&self.locks, trx.id, self.lock_wait_timeout, || {
            self.locks
                .acquire_record_lock(trx.id, table_bucket(table), RecLockFlag::Ordinary)
        })?;

        let index = BTreeIndex::open(bpm, log, root_page);
        let key = key_tuple.encode_comparable(&table.columns);
        let Some(old_value) = index.get(&key)? else {
            return Ok(false);
        };
        let new_value = encode_row(new_tuple);
        index.delete(&key)?;
        index.insert(&key, &new_value)?;

        let key_for_undo = key.clone();
        trx.push_undo(Box::new(move || {
            let index = BTreeIndex::open(bpm, log, root_page);
            let _ = index.delete(&key_for_undo);
            let _ = index.insert(&key_for_undo, &old_value);
        }));
        Ok(true)
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dict
    }
}

/// Flat row encoding: length-prefixed field values, tagged by kind.
/// Real column decoding happens through [`crate::record::Tuple`]; this is
/// just the clustered-index leaf payload format.
pub(crate) fn encode_row(tuple: &Tuple) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(tuple.fields.len() as u32).to_le_bytes());
    for field in &tuple.fields {
        use crate::record::FieldValue::*;
        match field {
            Null => out.push(0),
            Int(v) => {
                out.push(1);
                out.extend_from_slice(&v.to_le_bytes());
            }
            UInt(v) => {
                out.push(2);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Float(v) => {
                out.push(3);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Bytes(b) => {
                out.push(4);
                out.extend_from_slice(&(b.len() as u32).to_le_bytes());
                out.extend_from_slice(b);
            }
            External { prefix, full_len } => {
                out.push(5);
                out.extend_from_slice(&(*full_len as u32).to_le_bytes());
                out.extend_from_slice(&(prefix.len() as u32).to_le_bytes());
                out.extend_from_slice(prefix);
            }
        }
    }
    out
}

pub(crate) fn decode_row(bytes: &[u8]) -> Tuple {
    use crate::record::FieldValue;
    let n = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut pos = 4;
    let mut fields = Vec::with_capacity(n);
    for _ in 0..n {
        let tag = bytes[pos];
        pos += 1;
        let field = match tag {
            0 => FieldValue::Null,
            1 => {
                let v = i64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
                pos += 8;
                FieldValue::Int(v)
            }
            2 => {
                let v = u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
                pos += 8;
                FieldValue::UInt(v)
            }
            3 => {
                let v = f64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
                pos += 8;
                FieldValue::Float(v)
            }
            4 => {
                let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
                pos += 4;
                let b = bytes[pos..pos + len].to_vec();
                pos += len;
                FieldValue::Bytes(b)
            }
            5 => {
                let full_len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
                pos += 4;
                let plen = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
                pos += 4;
                let prefix = bytes[pos..pos + plen].to_vec();
                pos += plen;
                FieldValue::External { prefix, full_len }
            }
            _ => unreachable!("corrupt row encoding"),
        };
        fields.push(field);
    }
    Tuple::row_tuple(fields)
}

/// Iterates a clustered index's rows in key order, pulling
/// `FETCH_CACHE_SIZE` rows at a time. Each `next()` decodes the cached
/// row into a `Tuple` using `table`'s column list.
pub struct RowSearchIterator {
    cache: VecDeque<(Vec<u8>, Vec<u8>)>,
}

impl RowSearchIterator {
    pub fn open(index: &BTreeIndex<'_>, start: Option<&[u8]>) -> Result<Self> {
        let all = index.scan_forward(start)?;
        // Real engines page this lazily; this collects eagerly and hands
        // out `FETCH_CACHE_SIZE` at a time purely as a client-visible
        // batching convention (simplification noted in the design log).
        let _ = FETCH_CACHE_SIZE;
        Ok(Self {
            cache: all.into(),
        })
    }

    pub fn next(&mut self) -> Option<Tuple> {
        self.cache.pop_front().map(|(_, v)| decode_row(&v))
    }
}
