//! DDL engine (C12, spec §4.12): create/drop/rename/truncate table and
//! index, online secondary index build, and `DROP DATABASE`.

mod schema;

pub use schema::{IndexSchema, TableSchema};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::BufferPoolManager;
use crate::common::config::EngineConfig;
use crate::common::{Error, Result};
use crate::dict::{normalize_table_name, Dictionary, IndexDef, TableDef};
use crate::index::btree::BTreeIndex;
use crate::lock::{wait_for_lock, LockManager, LockMode};
use crate::log::LogManager;
use crate::record::Column;
use crate::txn::Transaction;

/// Prefix a secondary index under construction carries until the online
/// build finishes, mirroring the original's crash-recovery contract:
/// any index whose name still carries this prefix after a restart was
/// mid-build and gets dropped (`ddl_drop_all_temp_indexes`, not
/// implemented here since this engine has no crash recovery pass yet —
/// noted as a simplification).
pub const TEMP_INDEX_PREFIX: &str = "#tmp#";

/// Drives schema mutations against the [`Dictionary`], creating or
/// discarding the B-tree(s) backing each index.
pub struct DdlEngine {
    dict: Arc<Dictionary>,
    locks: Arc<LockManager>,
    lock_wait_timeout: Duration,
}

impl DdlEngine {
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

    fn wait_table_lock(&self, trx: &Transaction<'_>, table_id: u64, mode: LockMode) -> Result<()> {
        wait_for_lock(&self.locks, trx.id, self.lock_wait_timeout, || {
            self.locks.acquire_table_lock(trx.id, table_id, mode)
        })
    }

    /// `CREATE TABLE`: validate the prototype, allocate a table id, build
    /// a B-tree per declared index (an implicit `GEN_CLUST_INDEX` if the
    /// schema names no clustered index), and register the result.
    pub fn create_table(
        &self,
        trx: &Transaction<'_>,
        schema: &TableSchema,
        bpm: &BufferPoolManager,
        log: &LogManager,
    ) -> Result<Arc<TableDef>> {
        let (db, tbl) = schema
            .name
            .split_once('/')
            .ok_or_else(|| Error::InvalidInput(format!("table name must be db/table: {}", schema.name)))?;
        let name = normalize_table_name(db, tbl)?;

        let bad = schema.reserved_collisions();
        if !bad.is_empty() {
            return Err(Error::InvalidInput(format!(
                "reserved column name(s): {}",
                bad.join(", ")
            )));
        }
        if self.dict.lookup_by_name(&name).is_ok() {
            return Err(Error::InvalidInput(format!("table already exists: {name}")));
        }

        let mut columns = schema.columns.clone();
        let mut index_schemas = schema.indexes.clone();
        if !index_schemas.iter().any(|i| i.clustered) {
            columns.push(Column::system("db_row_id", crate::record::ColumnType::BigInt));
            index_schemas.insert(
                0,
                IndexSchema::new("GEN_CLUST_INDEX", vec!["db_row_id".to_string()])
                    .set_clustered(true)
                    .set_unique(true),
            );
        }
        // Table invariant: the clustered index is always indexes[0].
        index_schemas.sort_by_key(|i| !i.clustered);

        let id = self.dict.alloc_table_id();
        self.wait_table_lock(trx, id.0, LockMode::X)?;
        ::log::debug!("create_table {name} (id={})", id.0);

        let table = TableDef::new(id, name.clone(), columns, 0);
        for idef in &index_schemas {
            let tree = BTreeIndex::create(bpm, log)?;
            table.indexes.write().push(IndexDef {
                id: self.dict.alloc_index_id(),
                name: idef.name.clone(),
                table_id: id,
                unique: idef.unique,
                clustered: idef.clustered,
                columns: idef.columns.clone(),
                root_page: tree.root_page(),
            });
        }

        Ok(self.dict.register(table))
    }

    /// `CREATE INDEX` (online): scans the clustered index, builds sorted
    /// `(secondary_key ++ primary_key, primary_key)` entries, and bulk
    /// loads them into a fresh tree — the original's three-phase external
    /// merge sort collapsed into one in-memory sort, since this engine's
    /// scope doesn't include spilling merge runs to temp files.
    pub fn create_secondary_index(
        &self,
        trx: &Transaction<'_>,
        table: &Arc<TableDef>,
        def: IndexSchema,
        bpm: &BufferPoolManager,
        log: &LogManager,
    ) -> Result<IndexDef> {
        if def.clustered {
            return Err(Error::InvalidInput("only one clustered index per table".into()));
        }
        if table.indexes.read().iter().any(|i| i.name == def.name) {
            return Err(Error::InvalidInput(format!("index already exists: {}", def.name)));
        }
        self.wait_table_lock(trx, table.id.0, LockMode::IX)?;

        let clustered = table
            .clustered_index()
            .ok_or_else(|| Error::Corruption("table has no clustered index".into()))?;
        let clustered_tree = BTreeIndex::open(bpm, log, clustered.root_page);
        let sec_cols = column_subset(table, &def.columns)?;

        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for (pk_bytes, row_bytes) in clustered_tree.scan_forward(None)? {
            let row = crate::dml::decode_row(&row_bytes);
            let sec_tuple = project(table, &row, &def.columns)?;
            let mut key = sec_tuple.encode_comparable(&sec_cols);
            key.extend_from_slice(&pk_bytes);
            entries.push((key, pk_bytes));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let new_tree = BTreeIndex::create(bpm, log)?;
        for (key, value) in &entries {
            new_tree.insert(key, value)?;
        }
        ::log::debug!(
            "create_secondary_index {} on {} ({} rows)",
            def.name,
            table.name,
            entries.len()
        );

        let index_def = IndexDef {
            id: self.dict.alloc_index_id(),
            name: def.name,
            table_id: table.id,
            unique: def.unique,
            clustered: false,
            columns: def.columns,
            root_page: new_tree.root_page(),
        };
        table.indexes.write().push(index_def.clone());
        Ok(index_def)
    }

    /// `DROP INDEX`: refuses to drop the clustered index (that's `DROP
    /// TABLE`'s job).
    pub fn drop_index(&self, trx: &Transaction<'_>, table: &Arc<TableDef>, index_name: &str) -> Result<()> {
        self.wait_table_lock(trx, table.id.0, LockMode::X)?;
        let mut indexes = table.indexes.write();
        let pos = indexes
            .iter()
            .position(|i| i.name == index_name)
            .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?;
        if indexes[pos].clustered {
            return Err(Error::InvalidInput("cannot drop the clustered index".into()));
        }
        indexes.remove(pos);
        Ok(())
    }

    /// `RENAME INDEX`.
    pub fn rename_index(&self, table: &Arc<TableDef>, old_name: &str, new_name: &str) -> Result<()> {
        let mut indexes = table.indexes.write();
        let idx = indexes
            .iter_mut()
            .find(|i| i.name == old_name)
            .ok_or_else(|| Error::IndexNotFound(old_name.to_string()))?;
        idx.name = new_name.to_string();
        Ok(())
    }

    /// `DROP TABLE`: immediate if no handles are open, else deferred to
    /// the background drop list (spec §4.12).
    pub fn drop_table(&self, trx: &Transaction<'_>, name: &str) -> Result<()> {
        let table = self.dict.lookup_by_name(name)?;
        self.wait_table_lock(trx, table.id.0, LockMode::X)?;
        self.locks.release_table_locks(trx.id);
        ::log::debug!("drop_table {name}");
        self.dict.drop_table(name)
    }

    /// `RENAME TABLE`: the id and indexes survive; only the name (and the
    /// dictionary's name→table mapping) changes.
    pub fn rename_table(&self, trx: &Transaction<'_>, old_name: &str, new_name: &str) -> Result<Arc<TableDef>> {
        let old_name_norm = {
            let (db, tbl) = split_name(old_name)?;
            normalize_table_name(db, tbl)?
        };
        let new_name_norm = {
            let (db, tbl) = split_name(new_name)?;
            normalize_table_name(db, tbl)?
        };
        let table = self.dict.lookup_by_name(&old_name_norm)?;
        self.wait_table_lock(trx, table.id.0, LockMode::X)?;
        if table.handle_count() > 0 {
            return Err(Error::TableIsBeingUsed);
        }

        let fresh = TableDef::new(table.id, new_name_norm, table.columns.clone(), table.space_id);
        *fresh.indexes.write() = table.indexes.read().clone();
        self.dict.remove_name(&old_name_norm);
        ::log::debug!("rename_table {old_name_norm} -> {}", fresh.name);
        Ok(self.dict.replace(fresh))
    }

    /// `TRUNCATE TABLE`: new id, fresh empty tree per index, same name
    /// and columns. Old tree pages are simply abandoned rather than
    /// reclaimed into a tablespace freelist (simplification — this
    /// engine doesn't model per-table tablespace files).
    pub fn truncate_table(
        &self,
        trx: &Transaction<'_>,
        name: &str,
        bpm: &BufferPoolManager,
        log: &LogManager,
    ) -> Result<Arc<TableDef>> {
        let table = self.dict.lookup_by_name(name)?;
        self.wait_table_lock(trx, table.id.0, LockMode::X)?;
        if table.handle_count() > 0 {
            return Err(Error::TableIsBeingUsed);
        }

        let new_id = self.dict.alloc_table_id();
        let fresh = TableDef::new(new_id, table.name.clone(), table.columns.clone(), table.space_id);
        for old_idx in table.indexes.read().iter() {
            let tree = BTreeIndex::create(bpm, log)?;
            fresh.indexes.write().push(IndexDef {
                id: self.dict.alloc_index_id(),
                name: old_idx.name.clone(),
                table_id: new_id,
                unique: old_idx.unique,
                clustered: old_idx.clustered,
                columns: old_idx.columns.clone(),
                root_page: tree.root_page(),
            });
        }
        ::log::debug!("truncate_table {name} (old id={}, new id={})", table.id.0, new_id.0);
        Ok(self.dict.replace(fresh))
    }

    /// `DROP DATABASE db`: drop every table whose normalized name starts
    /// with `db/`.
    pub fn drop_database(&self, trx: &Transaction<'_>, db: &str) -> Result<()> {
        let prefix = format!("{}/", db.to_lowercase());
        for name in self.dict.table_names_with_prefix(&prefix) {
            self.drop_table(trx, &name)?;
        }
        Ok(())
    }
}

fn split_name(name: &str) -> Result<(&str, &str)> {
    name.split_once('/')
        .ok_or_else(|| Error::InvalidInput(format!("table name must be db/table: {name}")))
}

pub(crate) fn column_subset(table: &TableDef, names: &[String]) -> Result<Vec<Column>> {
    let by_name: HashMap<&str, &Column> = table.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    names
        .iter()
        .map(|n| {
            by_name
                .get(n.as_str())
                .map(|c| (*c).clone())
                .ok_or_else(|| Error::InvalidInput(format!("no such column: {n}")))
        })
        .collect()
}

pub(crate) fn project(table: &TableDef, row: &crate::record::Tuple, names: &[String]) -> Result<crate::record::Tuple> {
    let pos: HashMap<&str, usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();
    let mut fields = Vec::with_capacity(names.len());
    for n in names {
        let i = *pos
            .get(n.as_str())
            .ok_or_else(|| Error::InvalidInput(format!("no such column: {n}")))?;
        fields.push(
            row.fields
                .get(i)
                .cloned()
                .ok_or_else(|| Error::DataMismatch)?,
        );
    }
    Ok(crate::record::Tuple::key_tuple(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::RowFormat;
    use crate::lock::LockManager;
    use crate::log::LogManager;
    use crate::record::{Column, ColumnType, FieldValue};
    use crate::storage::DiskManager;
    use crate::txn::{IsolationLevel, TransactionManager};
    use tempfile::tempdir;

    fn setup() -> (BufferPoolManager, LogManager, Arc<Dictionary>, Arc<LockManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("t.db")).unwrap();
        let bpm = BufferPoolManager::new(64, dm);
        let log = LogManager::create(dir.path().join("r.log"), 16).unwrap();
        let dict = Arc::new(Dictionary::new());
        let locks = Arc::new(LockManager::new());
        (bpm, log, dict, locks, dir)
    }

    fn mk_trx(locks: Arc<LockManager>, dir: &tempfile::TempDir) -> Arc<crate::txn::Transaction<'static>> {
        let tm = TransactionManager::new(locks, Arc::new(LogManager::create(dir.path().join("r2.log"), 8).unwrap()));
        tm.begin(IsolationLevel::RepeatableRead)
    }

    #[test]
    fn test_create_table_adds_implicit_clustered_index() {
        let (bpm, log, dict, locks, dir) = setup();
        let ddl = DdlEngine::new(dict, locks.clone());
        let trx = mk_trx(locks, &dir);

        let schema = TableSchema::new("db/t", RowFormat::Dynamic)
            .add_col(Column::new("a", ColumnType::Int, false))
            .add_col(Column::new("b", ColumnType::VarChar(16), false));
        let table = ddl.create_table(&trx, &schema, &bpm, &log).unwrap();

        assert_eq!(table.name, "db/t");
        let indexes = table.indexes.read();
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].clustered);
        assert_eq!(indexes[0].name, "GEN_CLUST_INDEX");
    }

    #[test]
    fn test_create_table_rejects_reserved_column() {
        let (bpm, log, dict, locks, dir) = setup();
        let ddl = DdlEngine::new(dict, locks.clone());
        let trx = mk_trx(locks, &dir);

        let schema = TableSchema::new("db/t", RowFormat::Dynamic)
            .add_col(Column::new("db_trx_id", ColumnType::Int, false));
        assert!(ddl.create_table(&trx, &schema, &bpm, &log).is_err());
    }

    #[test]
    fn test_drop_table_removes_from_dictionary() {
        let (bpm, log, dict, locks, dir) = setup();
        let ddl = DdlEngine::new(dict.clone(), locks.clone());
        let trx = mk_trx(locks, &dir);

        let schema = TableSchema::new("db/t", RowFormat::Dynamic).add_col(Column::new("a", ColumnType::Int, false));
        ddl.create_table(&trx, &schema, &bpm, &log).unwrap();
        ddl.drop_table(&trx, "db/t").unwrap();
        assert!(dict.lookup_by_name("db/t").is_err());
    }

    #[test]
    fn test_rename_table_preserves_id_and_indexes() {
        let (bpm, log, dict, locks, dir) = setup();
        let ddl = DdlEngine::new(dict.clone(), locks.clone());
        let trx = mk_trx(locks, &dir);

        let schema = TableSchema::new("db/old", RowFormat::Dynamic).add_col(Column::new("a", ColumnType::Int, false));
        let table = ddl.create_table(&trx, &schema, &bpm, &log).unwrap();
        let old_id = table.id;

        let renamed = ddl.rename_table(&trx, "db/old", "db/new").unwrap();
        assert_eq!(renamed.id, old_id);
        assert_eq!(renamed.name, "db/new");
        assert!(dict.lookup_by_name("db/old").is_err());
        assert!(dict.lookup_by_name("db/new").is_ok());
    }

    #[test]
    fn test_truncate_table_assigns_new_id_and_empties_tree() {
        let (bpm, log, dict, locks, dir) = setup();
        let ddl = DdlEngine::new(dict.clone(), locks.clone());
        let dml = crate::dml::DmlEngine::new(dict.clone(), locks.clone());
        let tm = TransactionManager::new(locks, Arc::new(LogManager::create(dir.path().join("r2.log"), 8).unwrap()));
        let trx = tm.begin(IsolationLevel::RepeatableRead);

        let schema = TableSchema::new("db/t", RowFormat::Dynamic).add_col(Column::new("a", ColumnType::Int, false));
        let table = ddl.create_table(&trx, &schema, &bpm, &log).unwrap();
        let old_id = table.id;

        let clustered = table.clustered_index().unwrap();
        let row = crate::record::Tuple::row_tuple(vec![FieldValue::Int(1), FieldValue::Null]);
        dml.insert_row(&trx, &table, &bpm, &log, clustered.root_page, &row).unwrap();

        let truncated = ddl.truncate_table(&trx, "db/t", &bpm, &log).unwrap();
        assert_ne!(truncated.id, old_id);
        let new_clustered = truncated.clustered_index().unwrap();
        let new_tree = BTreeIndex::open(&bpm, &log, new_clustered.root_page);
        assert_eq!(new_tree.scan_forward(None).unwrap().len(), 0);
    }

    #[test]
    fn test_create_secondary_index_online_build() {
        let (bpm, log, dict, locks, dir) = setup();
        let ddl = DdlEngine::new(dict.clone(), locks.clone());
        let dml = crate::dml::DmlEngine::new(dict.clone(), locks.clone());
        let tm = TransactionManager::new(locks, Arc::new(LogManager::create(dir.path().join("r2.log"), 8).unwrap()));
        let trx = tm.begin(IsolationLevel::RepeatableRead);

        let schema = TableSchema::new("db/t", RowFormat::Dynamic)
            .add_col(Column::new("a", ColumnType::Int, false))
            .add_col(Column::new("b", ColumnType::Int, false));
        let table = ddl.create_table(&trx, &schema, &bpm, &log).unwrap();
        let clustered = table.clustered_index().unwrap();

        for (a, b) in [(1, 30), (2, 10), (3, 20)] {
            let row = crate::record::Tuple::row_tuple(vec![FieldValue::Int(a), FieldValue::Int(b), FieldValue::Null]);
            dml.insert_row(&trx, &table, &bpm, &log, clustered.root_page, &row).unwrap();
        }

        let def = IndexSchema::new("idx_b", vec!["b".to_string()]);
        let index_def = ddl.create_secondary_index(&trx, &table, def, &bpm, &log).unwrap();
        assert!(!index_def.clustered);

        let sec_tree = BTreeIndex::open(&bpm, &log, index_def.root_page);
        let all = sec_tree.scan_forward(None).unwrap();
        assert_eq!(all.len(), 3);
    }
}
