//! Lock manager (C7, spec §4.7): table locks, record locks hashed by
//! `(space_id, page_no)`, and wait-for-graph deadlock detection.

mod deadlock;
mod manager;
pub mod queue;
mod types;
mod wait;

pub use deadlock::{DeadlockDetector, MAX_DEADLOCK_SEARCH_DEPTH};
pub use manager::LockManager;
pub use queue::LockQueueIterator;
pub use types::{LockMode, LockRequest, RecLockFlag, RecordKey};
pub use wait::wait_for_lock;
