//! Builders for `CREATE TABLE`/index definitions (spec §6 "Schema API":
//! `table_schema_create`, `add_col`, `add_index`,
//! `index_schema_set_clustered`, `index_schema_set_unique`).

use crate::dict::RowFormat;
use crate::record::Column;

/// Names no user column may take; they're reserved for the system
/// columns every clustered row carries (`DB_ROW_ID`, `DB_TRX_ID`,
/// `DB_ROLL_PTR`).
const RESERVED_COLUMN_NAMES: &[&str] = &["db_row_id", "db_trx_id", "db_roll_ptr"];

/// One `add_index` call's worth of definition, before the DDL engine
/// turns it into a live [`crate::dict::IndexDef`] with a root page.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub clustered: bool,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
            clustered: false,
        }
    }

    pub fn set_clustered(mut self, clustered: bool) -> Self {
        self.clustered = clustered;
        self
    }

    pub fn set_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// In-memory prototype built up via `add_col`/`add_index` before
/// `DdlEngine::create_table` turns it into a registered table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub row_format: RowFormat,
    pub columns: Vec<Column>,
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, row_format: RowFormat) -> Self {
        Self {
            name: name.into(),
            row_format,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn add_col(mut self, col: Column) -> Self {
        self.columns.push(col);
        self
    }

    pub fn add_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Column names that collide with a reserved system name.
    pub(crate) fn reserved_collisions(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| RESERVED_COLUMN_NAMES.contains(&c.name.to_lowercase().as_str()))
            .map(|c| c.name.as_str())
            .collect()
    }
}
