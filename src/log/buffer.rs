//! In-memory circular redo log buffer: accumulates records into
//! [`LogBlock`]s as they're reserved, independent of when they actually
//! hit disk (spec §4.4).

use super::block::{LogBlock, LOG_BLOCK_DATA_CAPACITY};
use crate::common::Lsn;

/// A reservation returned by `reserve_and_open`; the caller writes bytes
/// via `write_low` and finishes with `close`.
pub struct OpenRecord {
    pub start_lsn: Lsn,
}

/// Circular buffer of log blocks. `lsn` always points one-past the last
/// byte written; `buf_free` is the LSN from which the next `write_low`
/// call will continue filling the current open block.
pub struct LogBuffer {
    blocks: Vec<LogBlock>,
    capacity_blocks: usize,
    /// Next LSN to be assigned.
    lsn: Lsn,
    /// Highest LSN confirmed flushed to disk.
    flushed_to_disk_lsn: Lsn,
    /// `lsn - flushed_to_disk_lsn` must stay below this (spec §4.4
    /// "Semantics") outside an open block.
    max_buf_free: u64,
    next_checkpoint_no: u32,
}

impl LogBuffer {
    pub fn new(capacity_blocks: usize, max_buf_free: u64) -> Self {
        assert!(capacity_blocks > 0);
        let blocks = (0..capacity_blocks).map(|i| LogBlock::new(i as u32)).collect();
        Self {
            blocks,
            capacity_blocks,
            lsn: Lsn::ZERO,
            flushed_to_disk_lsn: Lsn::ZERO,
            max_buf_free,
            next_checkpoint_no: 0,
        }
    }

    pub fn lsn(&self) -> Lsn {
        self.lsn
    }

    pub fn flushed_to_disk_lsn(&self) -> Lsn {
        self.flushed_to_disk_lsn
    }

    /// Reserve `len` bytes of log space for an about-to-be-written record,
    /// returning the LSN the record will start at. Does not itself copy
    /// any bytes; `write_low` does that.
    pub fn reserve_and_open(&mut self, _len: usize) -> OpenRecord {
        OpenRecord {
            start_lsn: self.lsn,
        }
    }

    /// Append `bytes` to the buffer at the current LSN, spanning blocks
    /// as needed, advancing `self.lsn`.
    pub fn write_low(&mut self, bytes: &[u8]) {
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let (block_no, offset) = super::block::block_of(self.lsn);
            let block_idx = (block_no as usize) % self.capacity_blocks;
            let block = &mut self.blocks[block_idx];

            if offset == 0 {
                *block = LogBlock::new(block_no as u32);
            }

            let space = LOG_BLOCK_DATA_CAPACITY - offset;
            let take = space.min(remaining.len());
            block.data[offset..offset + take].copy_from_slice(&remaining[..take]);
            block.header.data_len = (offset + take) as u16;
            block.finalize_checksum();

            self.lsn = self.lsn.advance(take as u64);
            remaining = &remaining[take..];
        }
    }

    /// Close an open record, returning the LSN just past its last byte.
    pub fn close(&mut self) -> Lsn {
        self.lsn
    }

    /// Mark everything up to `flushed_to_disk_lsn` as durable. The
    /// `LogManager` calls this after an actual disk write succeeds.
    pub(super) fn mark_flushed(&mut self, lsn: Lsn) {
        if lsn > self.flushed_to_disk_lsn {
            self.flushed_to_disk_lsn = lsn;
        }
    }

    /// Blocks covering `[from, to)`, for the manager to hand to disk I/O.
    pub(super) fn blocks_covering(&self, from: Lsn, to: Lsn) -> Vec<LogBlock> {
        if to <= from {
            return Vec::new();
        }
        let (first_block, _) = super::block::block_of(from);
        let (last_block, last_off) = super::block::block_of(Lsn(to.0 - 1));
        let _ = last_off;
        (first_block..=last_block)
            .map(|b| self.blocks[(b as usize) % self.capacity_blocks].clone())
            .collect()
    }

    /// `true` once the unflushed tail has crossed `max_buf_free`, per the
    /// "`lsn - flushed_to_disk_lsn < max_buf_free`" invariant in spec §4.4.
    pub fn needs_flush(&self) -> bool {
        self.lsn.0.saturating_sub(self.flushed_to_disk_lsn.0) >= self.max_buf_free
    }

    pub fn next_checkpoint_no(&mut self) -> u32 {
        let no = self.next_checkpoint_no;
        self.next_checkpoint_no += 1;
        no
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_low_advances_lsn() {
        let mut buf = LogBuffer::new(4, 1 << 20);
        let rec = buf.reserve_and_open(8);
        assert_eq!(rec.start_lsn, Lsn::ZERO);
        buf.write_low(b"hello-wa");
        let end = buf.close();
        assert_eq!(end.0, 8);
    }

    #[test]
    fn test_write_spans_blocks() {
        let mut buf = LogBuffer::new(4, 1 << 20);
        let big = vec![0xAB; LOG_BLOCK_DATA_CAPACITY + 10];
        buf.write_low(&big);
        assert_eq!(buf.lsn().0, big.len() as u64);
    }

    #[test]
    fn test_needs_flush_threshold() {
        let mut buf = LogBuffer::new(4, 100);
        buf.write_low(&[0u8; 50]);
        assert!(!buf.needs_flush());
        buf.write_low(&[0u8; 60]);
        assert!(buf.needs_flush());
    }
}
