//! Write acquisition shared between several holders
//!
//! A [`SharedWriteLock`] takes write mode on an [`RwLock`] once. Cloning it
//! hands the same acquisition to another holder; the lock is released exactly
//! once, when the last clone is dropped or when any holder calls
//! [`unlock`](SharedWriteLock::unlock) first.

use super::RwLock;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Shared<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
    // true while write mode is held; also serializes access between holders
    locked: Mutex<bool>,
}

impl<T: ?Sized> Shared<'_, T> {
    fn locked(&self) -> MutexGuard<'_, bool> {
        self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ?Sized> Drop for Shared<'_, T> {
    fn drop(&mut self) {
        let locked = self.locked.get_mut().unwrap_or_else(PoisonError::into_inner);
        if *locked {
            *locked = false;
            self.lock.raw().unlock_write();
        }
    }
}

/// Cloneable write-mode acquisition of an [`RwLock`]
pub struct SharedWriteLock<'a, T: ?Sized> {
    shared: Arc<Shared<'a, T>>,
}

impl<'a, T: ?Sized> SharedWriteLock<'a, T> {
    /// Block until write mode is acquired
    pub fn acquire(lock: &'a RwLock<T>) -> Self {
        lock.raw().lock_write();
        Self {
            shared: Arc::new(Shared {
                lock,
                locked: Mutex::new(true),
            }),
        }
    }

    /// Run `f` with exclusive access to the data
    ///
    /// Returns `None` once the lock has been released. Holders take turns:
    /// calling `with` from inside `f` on the same acquisition deadlocks.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let locked = self.shared.locked();
        if !*locked {
            return None;
        }
        // SAFETY: write mode is held while `locked` is true, and the `locked`
        // guard keeps other holders of this acquisition out until `f` returns.
        let data = unsafe { &mut *self.shared.lock.data_ptr() };
        Some(f(data))
    }

    /// Release write mode now instead of on the last drop
    ///
    /// Returns false if the lock was already released.
    pub fn unlock(&self) -> bool {
        let mut locked = self.shared.locked();
        if !*locked {
            return false;
        }
        *locked = false;
        self.shared.lock.raw().unlock_write();
        true
    }

    pub fn is_locked(&self) -> bool {
        *self.shared.locked()
    }

    /// Number of holders sharing this acquisition
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl<T: ?Sized> Clone for SharedWriteLock<'_, T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: ?Sized> fmt::Debug for SharedWriteLock<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWriteLock")
            .field("locked", &self.is_locked())
            .field("holders", &self.holders())
            .finish()
    }
}

impl<T: ?Sized> RwLock<T> {
    /// Take write mode as a [`SharedWriteLock`]
    pub fn write_shared(&self) -> SharedWriteLock<'_, T> {
        SharedWriteLock::acquire(self)
    }
}
