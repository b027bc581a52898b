//! Engine wiring (spec §6 "Startup / shutdown"): owns the buffer pool,
//! redo log, dictionary, lock manager and transaction manager, and drives
//! `api_init`/`startup`/`shutdown`. The [`cursor`] submodule is the table
//! cursor API the thin client wrapper above this crate calls.

pub mod cursor;

pub use cursor::{Cursor, MatchMode, SearchCompare};

use std::path::Path;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::config::{EngineConfig, PAGE_SIZE};
use crate::common::{Error, Result};
use crate::ddl::{DdlEngine, IndexSchema, TableSchema};
use crate::dict::{Dictionary, TableDef};
use crate::dml::DmlEngine;
use crate::lock::LockManager;
use crate::log::LogManager;
use crate::storage::DiskManager;
use crate::txn::{IsolationLevel, Transaction, TransactionManager};

/// `shutdown(flag)`'s urgency (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownFlag {
    /// Flush everything, checkpoint, wait for background work to drain.
    Normal,
    /// Flush and checkpoint but skip waiting on background purge.
    Fast,
    /// Skip the flush too; only safe when `force_recovery` will redo
    /// everything on the next startup.
    Fastest,
}

/// The storage engine proper: buffer pool, redo log, dictionary, locks,
/// and the DML/DDL engines sitting on top of them. One `Engine` owns one
/// on-disk database (one data file, one redo log).
pub struct Engine {
    bpm: BufferPoolManager,
    log: Arc<LogManager>,
    dict: Arc<Dictionary>,
    locks: Arc<LockManager>,
    txn_mgr: TransactionManager,
    ddl: DdlEngine,
    dml: DmlEngine,
    config: EngineConfig,
}

impl Engine {
    /// `api_init()` + `startup(format_name?)`: open (or create) the data
    /// file and redo log at `data_path`/`log_path`, size the buffer pool
    /// from `config.buf_pool_size`, and wire up the dictionary/lock/txn
    /// layers on top.
    pub fn startup(
        data_path: impl AsRef<Path>,
        log_path: impl AsRef<Path>,
        config: EngineConfig,
    ) -> Result<Self> {
        ::log::info!("engine startup: format={:?}", config.file_format);
        let disk = DiskManager::open_or_create(data_path)?;
        let pool_size = ((config.buf_pool_size / PAGE_SIZE as u64).max(16)) as usize;
        let bpm = BufferPoolManager::new(pool_size, disk);

        let log_capacity_blocks = (config.log_buffer_size / crate::log::LOG_BLOCK_SIZE).max(8);
        let log = Arc::new(LogManager::open_or_create(log_path, log_capacity_blocks)?);

        let dict = Arc::new(Dictionary::new());
        let locks = Arc::new(LockManager::new());
        let txn_mgr = TransactionManager::new(locks.clone(), log.clone());
        let ddl = DdlEngine::new(dict.clone(), locks.clone()).with_lock_wait_timeout(config.lock_wait_timeout);
        let dml = DmlEngine::new(dict.clone(), locks.clone()).with_lock_wait_timeout(config.lock_wait_timeout);

        Ok(Self {
            bpm,
            log,
            dict,
            locks,
            txn_mgr,
            ddl,
            dml,
            config,
        })
    }

    /// `shutdown(flag)`: flush dirty pages and checkpoint the redo log.
    /// `Fastest` skips both, trusting `force_recovery` on the next start.
    pub fn shutdown(&self, flag: ShutdownFlag) -> Result<()> {
        ::log::info!("engine shutdown: {flag:?}");
        if flag == ShutdownFlag::Fastest {
            return Ok(());
        }
        self.bpm.flush_all_pages()?;
        self.log.checkpoint(flag == ShutdownFlag::Normal, true)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dict
    }

    /// `trx_begin(level)`.
    pub fn trx_begin<'e>(&'e self, level: IsolationLevel) -> Arc<Transaction<'e>> {
        self.txn_mgr.begin(level)
    }

    pub fn trx_commit(&self, trx: &Transaction<'_>) -> Result<()> {
        self.txn_mgr.commit(trx)
    }

    pub fn trx_rollback(&self, trx: &Transaction<'_>) -> Result<()> {
        self.txn_mgr.rollback(trx)
    }

    pub fn trx_rollback_to_savepoint(&self, trx: &Transaction<'_>, name: &str) -> Result<()> {
        self.txn_mgr.rollback_to_savepoint(trx, name)
    }

    /// `table_create`.
    pub fn table_create(&self, trx: &Transaction<'_>, schema: &TableSchema) -> Result<Arc<TableDef>> {
        self.ddl.create_table(trx, schema, &self.bpm, &self.log)
    }

    /// `index_drop`/`create_index` share the DDL engine's online-build
    /// path; exposed here under the schema-API names.
    pub fn index_create(
        &self,
        trx: &Transaction<'_>,
        table: &Arc<TableDef>,
        def: IndexSchema,
    ) -> Result<crate::dict::IndexDef> {
        self.ddl.create_secondary_index(trx, table, def, &self.bpm, &self.log)
    }

    pub fn index_drop(&self, trx: &Transaction<'_>, table: &Arc<TableDef>, index_name: &str) -> Result<()> {
        self.ddl.drop_index(trx, table, index_name)
    }

    pub fn table_rename(&self, trx: &Transaction<'_>, old_name: &str, new_name: &str) -> Result<Arc<TableDef>> {
        self.ddl.rename_table(trx, old_name, new_name)
    }

    pub fn table_drop(&self, trx: &Transaction<'_>, name: &str) -> Result<()> {
        self.ddl.drop_table(trx, name)
    }

    pub fn table_truncate(&self, trx: &Transaction<'_>, name: &str) -> Result<Arc<TableDef>> {
        self.ddl.truncate_table(trx, name, &self.bpm, &self.log)
    }

    pub fn database_drop(&self, trx: &Transaction<'_>, db: &str) -> Result<()> {
        self.ddl.drop_database(trx, db)
    }

    pub fn table_get_id(&self, name: &str) -> Result<crate::dict::TableId> {
        Ok(self.dict.lookup_by_name(name)?.id)
    }

    fn open_handle(&self, name: &str) -> Result<Arc<TableDef>> {
        self.dict.open_handle(name)
    }
}
