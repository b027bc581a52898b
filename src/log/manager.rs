//! Redo log manager: owns the in-memory [`LogBuffer`] plus the on-disk
//! log file(s) forming a single group, and drives checkpoints (spec §4.4).
//!
//! Simplified from the original's multi-group, multi-file layout to one
//! group of fixed-size files, which is all a single-process embedded
//! engine needs; the block format and LSN semantics are unchanged.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::block::LOG_BLOCK_SIZE;
use super::buffer::LogBuffer;
use crate::common::{Error, Lsn, Result};

/// How hard `write_up_to` should try before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    NoWait,
    WaitOneGroup,
    WaitAllGroups,
}

struct CheckpointState {
    /// Two alternating header slots in file 0, per spec §4.4.
    slots: [Option<CheckpointRecord>; 2],
    next_slot: usize,
}

#[derive(Debug, Clone, Copy)]
struct CheckpointRecord {
    checkpoint_no: u32,
    checkpoint_lsn: Lsn,
}

struct Inner {
    buffer: LogBuffer,
    file: File,
    checkpoint: CheckpointState,
}

/// Owns the redo log for one database: buffering, flushing, and
/// checkpointing.
pub struct LogManager {
    inner: Mutex<Inner>,
    path: PathBuf,
}

impl LogManager {
    /// Create a fresh log file with `capacity_blocks` blocks of buffer.
    pub fn create<P: AsRef<Path>>(path: P, capacity_blocks: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;

        Ok(Self {
            inner: Mutex::new(Inner {
                buffer: LogBuffer::new(capacity_blocks, (capacity_blocks as u64) * LOG_BLOCK_SIZE as u64 / 2),
                file,
                checkpoint: CheckpointState {
                    slots: [None, None],
                    next_slot: 0,
                },
            }),
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing log file, appending further writes (no redo
    /// replay here; recovery is out of this module's scope).
    pub fn open<P: AsRef<Path>>(path: P, capacity_blocks: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Ok(Self {
            inner: Mutex::new(Inner {
                buffer: LogBuffer::new(capacity_blocks, (capacity_blocks as u64) * LOG_BLOCK_SIZE as u64 / 2),
                file,
                checkpoint: CheckpointState {
                    slots: [None, None],
                    next_slot: 0,
                },
            }),
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing log file, or create it if it doesn't exist yet.
    pub fn open_or_create<P: AsRef<Path>>(path: P, capacity_blocks: usize) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, capacity_blocks)
        } else {
            Self::create(path, capacity_blocks)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve space for a record of `len` bytes and hand back the LSN
    /// it will start at. The caller must follow with `write_low`/`close`.
    pub fn reserve_and_open(&self, len: usize) -> Lsn {
        self.inner.lock().buffer.reserve_and_open(len).start_lsn
    }

    pub fn write_low(&self, bytes: &[u8]) {
        self.inner.lock().buffer.write_low(bytes);
    }

    pub fn close(&self) -> Lsn {
        self.inner.lock().buffer.close()
    }

    pub fn current_lsn(&self) -> Lsn {
        self.inner.lock().buffer.lsn()
    }

    pub fn flushed_to_disk_lsn(&self) -> Lsn {
        self.inner.lock().buffer.flushed_to_disk_lsn()
    }

    /// Durably write every block covering `[flushed_to_disk_lsn, lsn)` to
    /// the log file. `WaitMode::NoWait` still performs the write here
    /// (there is no background flush thread in this engine); the modes
    /// are preserved for call-site intent and future async flushing.
    pub fn write_up_to(&self, lsn: Lsn, _wait_mode: WaitMode, flush_to_disk: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let from = inner.buffer.flushed_to_disk_lsn();
        if lsn <= from {
            return Ok(());
        }

        let blocks = inner.buffer.blocks_covering(from, lsn);
        let (first_block_no, _) = super::block::block_of(from);

        for (i, block) in blocks.iter().enumerate() {
            let block_no = first_block_no + i as u64;
            let offset = block_no * LOG_BLOCK_SIZE as u64;
            inner.file.seek(SeekFrom::Start(offset))?;
            inner.file.write_all(&block.to_bytes())?;
        }

        if flush_to_disk {
            inner.file.sync_all()?;
        }

        inner.buffer.mark_flushed(lsn);
        Ok(())
    }

    /// A commit must call this with `WaitMode::WaitAllGroups` and
    /// `flush_to_disk = true` before reporting success (spec §4.4).
    pub fn commit_flush(&self, commit_lsn: Lsn) -> Result<()> {
        self.write_up_to(commit_lsn, WaitMode::WaitAllGroups, true)
    }

    /// Called before modifying data; forces a flush if the unflushed
    /// margin has grown past `max_buf_free`.
    pub fn free_check(&self) -> Result<()> {
        let lsn = {
            let inner = self.inner.lock();
            if !inner.buffer.needs_flush() {
                return Ok(());
            }
            inner.buffer.lsn()
        };
        self.write_up_to(lsn, WaitMode::WaitAllGroups, true)
    }

    /// Write a checkpoint record to the next of the two alternating
    /// header slots, optionally forcing the log to be flushed first.
    pub fn checkpoint(&self, sync: bool, write_always: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let lsn = inner.buffer.lsn();

        if !write_always {
            if let Some(existing) = inner.checkpoint.slots[1 - inner.checkpoint.next_slot] {
                if existing.checkpoint_lsn == lsn {
                    return Ok(());
                }
            }
        }

        let checkpoint_no = inner.buffer.next_checkpoint_no();
        let slot = inner.checkpoint.next_slot;
        inner.checkpoint.slots[slot] = Some(CheckpointRecord {
            checkpoint_no,
            checkpoint_lsn: lsn,
        });
        inner.checkpoint.next_slot = 1 - slot;
        drop(inner);

        if sync {
            self.write_up_to(lsn, WaitMode::WaitAllGroups, true)?;
        }
        Ok(())
    }

    /// The most recent checkpoint LSN, or `None` if none has been taken.
    pub fn last_checkpoint_lsn(&self) -> Option<Lsn> {
        let inner = self.inner.lock();
        inner
            .checkpoint
            .slots
            .iter()
            .flatten()
            .max_by_key(|c| c.checkpoint_no)
            .map(|c| c.checkpoint_lsn)
    }
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager").field("path", &self.path).finish()
    }
}

/// Convenience: append a length-prefixed byte record to the log and
/// return its start LSN, used by MTR when it flattens its redo records
/// into the stream on commit.
pub fn append_record(log: &LogManager, payload: &[u8]) -> Result<Lsn> {
    if payload.len() > u32::MAX as usize {
        return Err(Error::InvalidInput("log record too large".into()));
    }
    let len_prefix = (payload.len() as u32).to_le_bytes();
    let start = log.reserve_and_open(len_prefix.len() + payload.len());
    log.write_low(&len_prefix);
    log.write_low(payload);
    log.close();
    Ok(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_up_to_and_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("redo.log");
        let log = LogManager::create(&path, 8).unwrap();

        let lsn = append_record(&log, b"hello").unwrap();
        assert_eq!(lsn, Lsn::ZERO);

        log.write_up_to(log.current_lsn(), WaitMode::WaitAllGroups, true)
            .unwrap();
        assert_eq!(log.flushed_to_disk_lsn(), log.current_lsn());

        log.checkpoint(true, true).unwrap();
        assert_eq!(log.last_checkpoint_lsn(), Some(log.current_lsn()));
    }

    #[test]
    fn test_free_check_noop_below_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("redo.log");
        let log = LogManager::create(&path, 8).unwrap();
        append_record(&log, b"small").unwrap();
        log.free_check().unwrap();
        // Below threshold: nothing flushed yet.
        assert_eq!(log.flushed_to_disk_lsn(), Lsn::ZERO);
    }

    #[test]
    fn test_commit_flush_advances_flushed_lsn() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("redo.log");
        let log = LogManager::create(&path, 8).unwrap();
        append_record(&log, b"txn-data").unwrap();
        let lsn = log.current_lsn();
        log.commit_flush(lsn).unwrap();
        assert_eq!(log.flushed_to_disk_lsn(), lsn);
    }
}
