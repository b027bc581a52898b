//! Write-ahead redo log (C4).
//!
//! Log records are accumulated in a circular in-memory buffer indexed by
//! LSN (a monotonic byte offset), then flushed to a 512-byte-block log
//! file. See [`LogManager`] for the operational surface
//! (`reserve_and_open`/`write_low`/`close`/`write_up_to`/`checkpoint`/
//! `free_check`).

pub mod block;
mod buffer;
mod manager;

pub use block::{LogBlock, LogBlockHeader, LOG_BLOCK_DATA_CAPACITY, LOG_BLOCK_SIZE};
pub use manager::{append_record, LogManager, WaitMode};
