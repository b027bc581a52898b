//! Configuration constants for InterchangeDB.

/// Size of a page in bytes (4KB).
///
/// This value is chosen to match:
/// - OS page size on most systems (4096 bytes)
/// - Common database page sizes (PostgreSQL uses 8KB, but 4KB is also standard)
/// - BusTub's page size
///
/// # Memory Layout
/// With 4KB pages and 32-bit PageIds:
/// - Max pages: 2^32 = 4,294,967,296 pages
/// - Max database size: 4,294,967,296 × 4KB = 16TB
///
/// # Alignment
/// Pages are aligned to 4096 bytes for efficient Direct I/O (O_DIRECT).
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of pages with u32 PageId.
pub const MAX_PAGES: u64 = (u32::MAX as u64) + 1;

/// Maximum theoretical database size in bytes.
pub const MAX_DB_SIZE_BYTES: u64 = MAX_PAGES * PAGE_SIZE as u64;

/// Highest supported on-disk table/tablespace format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileFormat {
    /// Original row formats (REDUNDANT / COMPACT), no compression.
    Antelope,
    /// Adds DYNAMIC and COMPRESSED row formats.
    Barracuda,
}

impl Default for FileFormat {
    fn default() -> Self {
        FileFormat::Barracuda
    }
}

/// Runtime-tunable engine configuration (spec §6 "Configuration options").
///
/// Constructed once at `Engine` startup and shared read-only thereafter;
/// nothing here is mutated after `Engine::startup`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// If true, new tables get their own tablespace file. Required for
    /// `ROW_FORMAT=COMPRESSED`.
    pub file_per_table: bool,
    /// Ceiling for new tablespace features.
    pub file_format: FileFormat,
    /// 0..6. Progressively disables purge, background flush, rollback,
    /// crash recovery as the value increases.
    pub force_recovery: u8,
    /// Per-lock-wait cap.
    pub lock_wait_timeout: std::time::Duration,
    /// Size of the in-memory redo log buffer, in bytes.
    pub log_buffer_size: usize,
    /// Number of files per redo log group.
    pub log_group_n_files: u32,
    /// Size of a single redo log file, in bytes.
    pub log_file_size: u64,
    /// Trigger background flushing once this fraction of the buffer pool
    /// is dirty.
    pub max_dirty_pages_pct: f32,
    /// Write pages through a doublewrite buffer before the real location.
    pub doublewrite: bool,
    /// 0 = flush log once per second, 1 = flush + fsync on every commit,
    /// 2 = write on every commit, fsync once per second.
    pub flush_log_at_trx_commit: u8,
    /// Total buffer pool size in bytes (informational; frame count is
    /// derived by the caller constructing the `BufferPoolManager`).
    pub buf_pool_size: u64,
    /// Size of the auxiliary memory pool (dictionary cache, locks, ...).
    pub additional_mem_pool_size: u64,
    /// Extra delay applied before DML when purge is lagging.
    pub dml_delay: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            file_per_table: false,
            file_format: FileFormat::default(),
            force_recovery: 0,
            lock_wait_timeout: std::time::Duration::from_secs(50),
            log_buffer_size: 8 * 1024 * 1024,
            log_group_n_files: 2,
            log_file_size: 48 * 1024 * 1024,
            max_dirty_pages_pct: 75.0,
            doublewrite: true,
            flush_log_at_trx_commit: 1,
            buf_pool_size: 128 * 1024 * 1024,
            additional_mem_pool_size: 8 * 1024 * 1024,
            dml_delay: std::time::Duration::from_millis(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_max_db_size() {
        // 16TB = 16 * 1024^4 bytes
        let expected = 16 * 1024u64 * 1024 * 1024 * 1024;
        assert_eq!(MAX_DB_SIZE_BYTES, expected);
    }

    #[test]
    fn test_engine_config_defaults() {
        let cfg = EngineConfig::default();
        assert!(!cfg.file_per_table);
        assert_eq!(cfg.file_format, FileFormat::Barracuda);
        assert_eq!(cfg.flush_log_at_trx_commit, 1);
        assert_eq!(cfg.force_recovery, 0);
    }

    #[test]
    fn test_file_format_ordering() {
        assert!(FileFormat::Antelope < FileFormat::Barracuda);
    }
}