//! Concurrency primitives
//!
//! - [`RwMutex`] / [`RwLock`]: writer-preferring reader-writer lock
//! - [`SharedWriteLock`]: one write acquisition shared by several holders
//! - [`CriticalMap`]: hash map whose mutations all take write mode

pub mod critical_map;
pub mod rw_mutex;
pub mod shared_write_lock;

pub use critical_map::CriticalMap;
pub use rw_mutex::{RwLock, RwLockReadGuard, RwLockWriteGuard, RwMutex};
pub use shared_write_lock::SharedWriteLock;
