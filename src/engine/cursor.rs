//! Table cursor API (spec §6), grounded on `innodb/src/api/src/api_api.cpp`'s
//! `ib_cursor_*` family: the surface above this crate's DDL/DML engines that
//! a client opens once per table (or index) and drives with
//! `first`/`next`/`moveto` plus `insert_row`/`update_row`/`delete_row`.
//!
//! A `Cursor` holds its own [`BTreeIndex`] handle for as long as it's open,
//! reopened fresh whenever `open_index_using_name` or `truncate` repoints it
//! at a different root page. Mutations still go through [`DmlEngine`],
//! which now takes `(bpm, log, root_page)` rather than a borrowed tree: the
//! undo action it pushes has to outlive this call (it only runs if the
//! transaction rolls back, possibly long after the cursor that queued it is
//! closed), so it reopens its own tree handle from those three instead of
//! capturing a reference tied to this call's stack frame.

use std::sync::Arc;

use crate::common::{Error, Result};
use crate::dict::{IndexDef, TableDef};
use crate::index::btree::{BTreeIndex, SearchMode};
use crate::lock::{wait_for_lock, LockMode};
use crate::record::{Column, Tuple};
use crate::txn::Transaction;

use super::Engine;

/// `cursor_set_match_mode` (spec §6): how an equality `moveto` treats a
/// search key that's a prefix of the index's column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Closest,
    Exact,
    Prefix,
}

/// `cursor_moveto`'s comparison operator (spec §6's `{GE,G,LE,L,E}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCompare {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

struct Position {
    key: Vec<u8>,
    value: Vec<u8>,
}

/// A cursor open on one of a table's indexes. Positioned with
/// `first`/`last`/`next`/`prev`/`moveto`; read/mutated with
/// `read_row`/`insert_row`/`update_row`/`delete_row`.
pub struct Cursor<'e> {
    engine: &'e Engine,
    trx: Arc<Transaction<'e>>,
    table: Arc<TableDef>,
    index: IndexDef,
    tree: BTreeIndex<'e>,
    match_mode: MatchMode,
    lock_mode: LockMode,
    position: Option<Position>,
}

impl<'e> Cursor<'e> {
    /// `cursor_open_table`: open on `name`'s clustered index.
    pub fn open_table(engine: &'e Engine, name: &str, trx: Arc<Transaction<'e>>) -> Result<Self> {
        let table = engine.open_handle(name)?;
        let index = table
            .clustered_index()
            .ok_or_else(|| Error::Corruption(format!("table {name} has no clustered index")))?;
        let tree = BTreeIndex::open(&engine.bpm, &engine.log, index.root_page);
        Ok(Self {
            engine,
            trx,
            table,
            index,
            tree,
            match_mode: MatchMode::Closest,
            lock_mode: LockMode::IS,
            position: None,
        })
    }

    /// `cursor_open_index_using_name`: repoint the cursor at another of
    /// the table's indexes (clustered or secondary).
    pub fn open_index_using_name(&mut self, index_name: &str) -> Result<()> {
        let index = self
            .table
            .indexes
            .read()
            .iter()
            .find(|i| i.name == index_name)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?;
        self.tree = BTreeIndex::open(&self.engine.bpm, &self.engine.log, index.root_page);
        self.index = index;
        self.position = None;
        Ok(())
    }

    /// `cursor_open_index_using_id`: same, by id rather than name.
    pub fn open_index_using_id(&mut self, index_id: crate::dict::IndexId) -> Result<()> {
        let index = self
            .table
            .indexes
            .read()
            .iter()
            .find(|i| i.id == index_id)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(format!("index id {}", index_id.0)))?;
        self.tree = BTreeIndex::open(&self.engine.bpm, &self.engine.log, index.root_page);
        self.index = index;
        self.position = None;
        Ok(())
    }

    pub fn set_match_mode(&mut self, mode: MatchMode) {
        self.match_mode = mode;
    }

    pub fn set_lock_mode(&mut self, mode: LockMode) {
        self.lock_mode = mode;
    }

    /// `cursor_lock`: take the cursor's configured lock on the table,
    /// suspending on `Error::LockWait` per `self.engine.config()`'s
    /// `lock_wait_timeout` rather than surfacing it straight to the caller.
    pub fn lock(&self) -> Result<()> {
        wait_for_lock(
            &self.engine.locks,
            self.trx.id,
            self.engine.config().lock_wait_timeout,
            || self.engine.locks.acquire_table_lock(self.trx.id, self.table.id.0, self.lock_mode),
        )
    }

    /// `cursor_first`.
    pub fn first(&mut self) -> Result<bool> {
        let all = self.tree.scan_forward(None)?;
        self.position = all.into_iter().next().map(|(key, value)| Position { key, value });
        Ok(self.position.is_some())
    }

    /// `cursor_last`.
    pub fn last(&mut self) -> Result<bool> {
        let all = self.tree.scan_forward(None)?;
        self.position = all.into_iter().next_back().map(|(key, value)| Position { key, value });
        Ok(self.position.is_some())
    }

    /// `cursor_next`.
    pub fn next(&mut self) -> Result<bool> {
        let Some(pos) = self.position.take() else {
            return self.first();
        };
        let found = self.tree.search(&pos.key, SearchMode::Gt)?;
        self.position = found.map(|(key, value)| Position { key, value });
        Ok(self.position.is_some())
    }

    /// `cursor_prev`.
    pub fn prev(&mut self) -> Result<bool> {
        let Some(pos) = self.position.take() else {
            return self.last();
        };
        let found = self.tree.search(&pos.key, SearchMode::Lt)?;
        self.position = found.map(|(key, value)| Position { key, value });
        Ok(self.position.is_some())
    }

    /// `cursor_moveto`. For `SearchCompare::Eq` the current `MatchMode`
    /// decides whether `key` must match the index's full column list or
    /// only a prefix of it; prefix search works as a plain
    /// `SearchMode::Ge` lookup because `Tuple::encode_comparable` makes a
    /// column prefix a literal byte prefix of the full encoding.
    pub fn moveto(&mut self, key: &Tuple, cmp: SearchCompare) -> Result<bool> {
        let cols = self.index_columns()?;
        let encoded = key.encode_comparable(&cols);
        let found = match cmp {
            SearchCompare::Ge => self.tree.search(&encoded, SearchMode::Ge)?,
            SearchCompare::Gt => self.tree.search(&encoded, SearchMode::Gt)?,
            SearchCompare::Le => self.tree.search(&encoded, SearchMode::Le)?,
            SearchCompare::Lt => self.tree.search(&encoded, SearchMode::Lt)?,
            SearchCompare::Eq => match self.match_mode {
                MatchMode::Exact => self.tree.get(&encoded)?.map(|value| (encoded.clone(), value)),
                MatchMode::Closest | MatchMode::Prefix => self
                    .tree
                    .search(&encoded, SearchMode::Ge)?
                    .filter(|(k, _)| k.starts_with(&encoded)),
            },
        };
        self.position = found.map(|(key, value)| Position { key, value });
        Ok(self.position.is_some())
    }

    fn index_columns(&self) -> Result<Vec<Column>> {
        if self.index.clustered {
            Ok(self.table.columns.clone())
        } else {
            crate::ddl::column_subset(&self.table, &self.index.columns)
        }
    }

    /// `cursor_read_row`: decode the row at the current position. For a
    /// secondary-index cursor the leaf only holds the primary key, so
    /// this does a second lookup into the clustered index, mirroring
    /// `row_sel_get_clust_rec`.
    pub fn read_row(&self) -> Option<Tuple> {
        let pos = self.position.as_ref()?;
        if self.index.clustered {
            Some(crate::dml::decode_row(&pos.value))
        } else {
            let clustered = self.table.clustered_index()?;
            let clustered_tree = BTreeIndex::open(&self.engine.bpm, &self.engine.log, clustered.root_page);
            clustered_tree
                .get(&pos.value)
                .ok()
                .flatten()
                .map(|row_bytes| crate::dml::decode_row(&row_bytes))
        }
    }

    /// `cursor_insert_row`. Only valid against the clustered index: the
    /// row DML engine only knows how to encode a whole row under its
    /// clustered key.
    pub fn insert_row(&mut self, tuple: &Tuple) -> Result<()> {
        self.require_clustered()?;
        let engine: &'e Engine = self.engine;
        let root_page = self.tree.root_page();
        engine
            .dml
            .insert_row(&self.trx, &self.table, &engine.bpm, &engine.log, root_page, tuple)
    }

    /// `cursor_update_row`: replace the row at the current position,
    /// keyed unchanged (a primary-key-changing update is a delete +
    /// insert at the caller level, as in `DmlEngine::update_row`).
    pub fn update_row(&mut self, new_tuple: &Tuple) -> Result<bool> {
        self.require_clustered()?;
        let Some(pos) = self.position.as_ref() else {
            return Ok(false);
        };
        let old_tuple = crate::dml::decode_row(&pos.value);
        let engine: &'e Engine = self.engine;
        let root_page = self.tree.root_page();
        let updated = engine.dml.update_row(
            &self.trx,
            &self.table,
            &engine.bpm,
            &engine.log,
            root_page,
            &old_tuple,
            new_tuple,
        )?;
        if updated {
            if let Some(pos) = self.position.as_mut() {
                pos.value = crate::dml::encode_row(new_tuple);
            }
        }
        Ok(updated)
    }

    /// `cursor_delete_row`: remove the row at the current position.
    pub fn delete_row(&mut self) -> Result<bool> {
        self.require_clustered()?;
        let Some(pos) = self.position.take() else {
            return Ok(false);
        };
        let key_tuple = crate::dml::decode_row(&pos.value);
        let engine: &'e Engine = self.engine;
        let root_page = self.tree.root_page();
        engine
            .dml
            .delete_row(&self.trx, &self.table, &engine.bpm, &engine.log, root_page, &key_tuple)
    }

    fn require_clustered(&self) -> Result<()> {
        if self.index.clustered {
            Ok(())
        } else {
            Err(Error::InvalidInput(
                "row mutation requires a cursor opened on the clustered index".into(),
            ))
        }
    }

    /// `cursor_truncate`: truncate the whole table through this cursor,
    /// then repoint it at the fresh clustered tree.
    pub fn truncate(&mut self) -> Result<()> {
        let engine: &'e Engine = self.engine;
        let table = engine
            .ddl
            .truncate_table(&self.trx, &self.table.name, &engine.bpm, &engine.log)?;
        let index = table
            .clustered_index()
            .expect("truncate_table always rebuilds the clustered index");
        self.tree = BTreeIndex::open(&engine.bpm, &engine.log, index.root_page);
        self.table = table;
        self.index = index;
        self.position = None;
        Ok(())
    }

    /// `cursor_reset`: drop the current position without closing.
    pub fn reset(&mut self) {
        self.position = None;
    }

    /// `cursor_close`: release the dictionary handle opened by
    /// `open_table`.
    pub fn close(self) {
        self.engine.dict.close_handle(&self.table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::EngineConfig;
    use crate::ddl::{IndexSchema, TableSchema};
    use crate::dict::RowFormat;
    use crate::record::{ColumnType, FieldValue};
    use crate::txn::IsolationLevel;
    use tempfile::tempdir;

    fn setup() -> (Engine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let engine = Engine::startup(
            dir.path().join("data.ibd"),
            dir.path().join("ib_logfile0"),
            EngineConfig::default(),
        )
        .unwrap();
        (engine, dir)
    }

    #[test]
    fn test_moveto_ge_and_update_and_delete() {
        let (engine, _dir) = setup();
        let trx = engine.trx_begin(IsolationLevel::RepeatableRead);
        let schema = TableSchema::new("db/t", RowFormat::Dynamic)
            .add_col(Column::new("a", ColumnType::Int, false))
            .add_col(Column::new("b", ColumnType::VarChar(16), true));
        engine.table_create(&trx, &schema).unwrap();

        let mut cursor = Cursor::open_table(&engine, "db/t", trx.clone()).unwrap();
        for i in [1, 2, 3] {
            cursor
                .insert_row(&Tuple::row_tuple(vec![FieldValue::Int(i), FieldValue::Null]))
                .unwrap();
        }

        let key = Tuple::key_tuple(vec![FieldValue::Int(2), FieldValue::Null]);
        assert!(cursor.moveto(&key, SearchCompare::Ge).unwrap());
        let row = cursor.read_row().unwrap();
        assert!(matches!(row.fields[0], FieldValue::Int(2)));

        assert!(cursor
            .update_row(&Tuple::row_tuple(vec![
                FieldValue::Int(2),
                FieldValue::Bytes(b"two".to_vec())
            ]))
            .unwrap());
        let row = cursor.read_row().unwrap();
        assert!(matches!(&row.fields[1], FieldValue::Bytes(b) if b == b"two"));

        assert!(cursor.delete_row().unwrap());
        assert!(!cursor.moveto(&key, SearchCompare::Eq).unwrap());
        cursor.close();
        engine.trx_commit(&trx).unwrap();
    }

    #[test]
    fn test_secondary_index_cursor_reads_through_clustered() {
        let (engine, _dir) = setup();
        let trx = engine.trx_begin(IsolationLevel::RepeatableRead);
        let schema = TableSchema::new("db/t", RowFormat::Dynamic)
            .add_col(Column::new("a", ColumnType::Int, false))
            .add_col(Column::new("b", ColumnType::Int, false));
        let table = engine.table_create(&trx, &schema).unwrap();
        engine
            .index_create(&trx, &table, IndexSchema::new("idx_b", vec!["b".to_string()]))
            .unwrap();

        let mut cursor = Cursor::open_table(&engine, "db/t", trx.clone()).unwrap();
        cursor
            .insert_row(&Tuple::row_tuple(vec![FieldValue::Int(1), FieldValue::Int(42)]))
            .unwrap();

        cursor.open_index_using_name("idx_b").unwrap();
        assert!(cursor.first().unwrap());
        let row = cursor.read_row().unwrap();
        assert!(matches!(row.fields[0], FieldValue::Int(1)));
        assert!(matches!(row.fields[1], FieldValue::Int(42)));

        assert!(cursor.insert_row(&row).is_err());
        cursor.close();
    }
}
