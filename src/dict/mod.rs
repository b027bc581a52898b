//! Data dictionary (C10, spec §4.10): the in-memory cache mirroring
//! SYS_TABLES/SYS_COLUMNS/SYS_INDEXES/SYS_FIELDS/SYS_FOREIGN, keyed by
//! normalized name and by id, with handle-counted tables and a
//! background drop list for tables still in use when `DROP TABLE` runs.

mod name;

pub use name::{normalize_table_name, split_table_name};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{Error, PageId, Result};
use crate::record::Column;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexId(pub u64);

/// On-disk row format, encoded into a table's `flags` word (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    Redundant,
    Compact,
    Dynamic,
    Compressed,
}

impl Default for RowFormat {
    fn default() -> Self {
        RowFormat::Dynamic
    }
}

#[derive(Debug, Clone)]
pub struct IndexDef {
    pub id: IndexId,
    pub name: String,
    pub table_id: TableId,
    pub unique: bool,
    pub clustered: bool,
    /// Column names making up the key, in order.
    pub columns: Vec<String>,
    pub root_page: PageId,
}

#[derive(Debug)]
pub struct TableDef {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: RwLock<Vec<IndexDef>>,
    pub row_format: RowFormat,
    pub space_id: u32,
    handles: AtomicUsize,
}

impl TableDef {
    pub fn clustered_index(&self) -> Option<IndexDef> {
        self.indexes.read().iter().find(|i| i.clustered).cloned()
    }

    pub fn handle_count(&self) -> usize {
        self.handles.load(Ordering::SeqCst)
    }
}

/// In-memory dictionary cache. Construction of `TableDef`s themselves is
/// the DDL engine's job; this type owns lookup, handle counting, and the
/// background drop list.
pub struct Dictionary {
    by_name: RwLock<HashMap<String, Arc<TableDef>>>,
    by_id: RwLock<HashMap<TableId, Arc<TableDef>>>,
    next_table_id: AtomicU64,
    next_index_id: AtomicU64,
    /// Tables marked `DROP TABLE` while a handle was still open; the
    /// background thread (spec §4.11 "master thread") retries these.
    background_drop: RwLock<HashSet<String>>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            by_name: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
            next_table_id: AtomicU64::new(1),
            next_index_id: AtomicU64::new(1),
            background_drop: RwLock::new(HashSet::new()),
        }
    }

    pub fn alloc_table_id(&self) -> TableId {
        TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn alloc_index_id(&self) -> IndexId {
        IndexId(self.next_index_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a freshly created table (DDL's `CREATE TABLE` calls this
    /// once the in-memory prototype and tablespace are ready).
    pub fn register(&self, table: TableDef) -> Arc<TableDef> {
        let table = Arc::new(table);
        self.by_name.write().insert(table.name.clone(), table.clone());
        self.by_id.write().insert(table.id, table.clone());
        table
    }

    /// Swap in `table` under its own name, displacing whatever was
    /// registered under that name (and that name's old id mapping, if
    /// different) — used by `RENAME TABLE` and `TRUNCATE TABLE`, both of
    /// which build a fresh `TableDef` rather than mutating one in place.
    pub fn replace(&self, table: TableDef) -> Arc<TableDef> {
        let table = Arc::new(table);
        if let Some(old) = self.by_name.read().get(&table.name).cloned() {
            self.by_id.write().remove(&old.id);
        }
        self.by_name.write().insert(table.name.clone(), table.clone());
        self.by_id.write().insert(table.id, table.clone());
        table
    }

    /// Remove `old_name`'s mapping without touching `new_name`'s, for
    /// `RENAME TABLE` where the name itself changes.
    pub fn remove_name(&self, name: &str) {
        self.by_name.write().remove(name);
    }

    /// Every registered table name starting with `prefix`, for `DROP
    /// DATABASE db/`'s iteration over `db/*`.
    pub fn table_names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.by_name
            .read()
            .keys()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<Arc<TableDef>> {
        self.by_name
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn lookup_by_id(&self, id: TableId) -> Result<Arc<TableDef>> {
        self.by_id
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(format!("table id {}", id.0)))
    }

    /// Open a handle on `name`, bumping its reference count. The table
    /// cursor API's `cursor_open_table` calls this.
    pub fn open_handle(&self, name: &str) -> Result<Arc<TableDef>> {
        let table = self.lookup_by_name(name)?;
        table.handles.fetch_add(1, Ordering::SeqCst);
        Ok(table)
    }

    /// Close a previously opened handle. If the table was queued for
    /// background drop and this was the last handle, actually remove it
    /// from the cache.
    pub fn close_handle(&self, table: &Arc<TableDef>) {
        let remaining = table.handles.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && self.background_drop.read().contains(&table.name) {
            self.finish_drop(&table.name);
        }
    }

    /// `DROP TABLE`: remove immediately if no handles are open, otherwise
    /// queue it on the background drop list for the next `close_handle`
    /// to finish.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let table = self.lookup_by_name(name)?;
        if table.handle_count() == 0 {
            self.finish_drop(name);
        } else {
            self.background_drop.write().insert(name.to_string());
        }
        Ok(())
    }

    fn finish_drop(&self, name: &str) {
        if let Some(table) = self.by_name.write().remove(name) {
            self.by_id.write().remove(&table.id);
        }
        self.background_drop.write().remove(name);
    }

    pub fn is_pending_drop(&self, name: &str) -> bool {
        self.background_drop.read().contains(name)
    }

    pub fn table_count(&self) -> usize {
        self.by_name.read().len()
    }
}

impl TableDef {
    pub fn new(id: TableId, name: String, columns: Vec<Column>, space_id: u32) -> Self {
        Self {
            id,
            name,
            columns,
            indexes: RwLock::new(Vec::new()),
            row_format: RowFormat::default(),
            space_id,
            handles: AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ColumnType;

    fn mk_table(dict: &Dictionary, name: &str) -> Arc<TableDef> {
        let id = dict.alloc_table_id();
        let cols = vec![Column::new("id", ColumnType::Int, false)];
        dict.register(TableDef::new(id, name.to_string(), cols, 0))
    }

    #[test]
    fn test_register_and_lookup() {
        let dict = Dictionary::new();
        mk_table(&dict, "db/t1");
        assert!(dict.lookup_by_name("db/t1").is_ok());
        assert!(dict.lookup_by_name("db/missing").is_err());
    }

    #[test]
    fn test_drop_with_no_handles_is_immediate() {
        let dict = Dictionary::new();
        mk_table(&dict, "db/t1");
        dict.drop_table("db/t1").unwrap();
        assert!(dict.lookup_by_name("db/t1").is_err());
        assert_eq!(dict.table_count(), 0);
    }

    #[test]
    fn test_drop_with_open_handle_is_deferred() {
        let dict = Dictionary::new();
        mk_table(&dict, "db/t1");
        let handle = dict.open_handle("db/t1").unwrap();
        dict.drop_table("db/t1").unwrap();
        assert!(dict.lookup_by_name("db/t1").is_ok());
        assert!(dict.is_pending_drop("db/t1"));

        dict.close_handle(&handle);
        assert!(dict.lookup_by_name("db/t1").is_err());
    }

    #[test]
    fn test_table_ids_are_unique() {
        let dict = Dictionary::new();
        let a = dict.alloc_table_id();
        let b = dict.alloc_table_id();
        assert_ne!(a, b);
    }
}
