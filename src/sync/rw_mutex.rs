//! Writer-preferring reader-writer lock
//!
//! Any number of readers may hold the lock while no writer holds it or waits
//! for it. Once a writer is waiting, newly arriving readers queue behind it;
//! the writer acquires as soon as the readers already inside drain.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

/// Lock without data
///
/// Acquire through [`read`](Self::read) and [`write`](Self::write); the guards
/// release on drop.
#[derive(Debug, Default)]
pub struct RwMutex {
    state: Mutex<State>,
    readers_cv: Condvar,
    writers_cv: Condvar,
}

impl RwMutex {
    pub fn new() -> Self {
        Self::default()
    }

    // Lock state holds plain counters, so a panic elsewhere cannot leave it torn
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn lock_read(&self) {
        let mut state = self.state();
        while state.writer || state.waiting_writers > 0 {
            state = self.readers_cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.readers += 1;
    }

    fn try_lock_read(&self) -> bool {
        let mut state = self.state();
        if state.writer || state.waiting_writers > 0 {
            return false;
        }
        state.readers += 1;
        true
    }

    pub(super) fn unlock_read(&self) {
        let mut state = self.state();
        debug_assert!(state.readers > 0, "read unlock without a reader");
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 && state.waiting_writers > 0 {
            self.writers_cv.notify_one();
        }
    }

    pub(super) fn lock_write(&self) {
        let mut state = self.state();
        state.waiting_writers += 1;
        while state.writer || state.readers > 0 {
            state = self.writers_cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting_writers -= 1;
        state.writer = true;
    }

    pub(super) fn unlock_write(&self) {
        let mut state = self.state();
        debug_assert!(state.writer, "write unlock without a writer");
        state.writer = false;
        if state.waiting_writers > 0 {
            self.writers_cv.notify_one();
        } else {
            self.readers_cv.notify_all();
        }
    }

    pub fn read(&self) -> ReadGuard<'_> {
        self.lock_read();
        ReadGuard { mutex: self }
    }

    pub fn write(&self) -> WriteGuard<'_> {
        self.lock_write();
        WriteGuard { mutex: self }
    }

    /// Number of readers currently inside
    pub fn readers(&self) -> usize {
        self.state().readers
    }

    /// Whether a writer currently holds the lock
    pub fn is_write_locked(&self) -> bool {
        self.state().writer
    }
}

/// Read-mode acquisition of a [`RwMutex`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    mutex: &'a RwMutex,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock_read();
    }
}

/// Write-mode acquisition of a [`RwMutex`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    mutex: &'a RwMutex,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock_write();
    }
}

/// Data guarded by a [`RwMutex`]
pub struct RwLock<T: ?Sized> {
    mutex: RwMutex,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `mutex`: shared references only
// under read mode, the unique reference only under write mode.
unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            mutex: RwMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RwLock<T> {
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.mutex.lock_read();
        RwLockReadGuard { lock: self }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.mutex.lock_write();
        RwLockWriteGuard { lock: self }
    }

    /// Exclusive access without locking, proven by `&mut self`
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub(super) fn raw(&self) -> &RwMutex {
        &self.mutex
    }

    pub(super) fn data_ptr(&self) -> *mut T {
        self.data.get()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mutex.try_lock_read() {
            let guard = RwLockReadGuard { lock: self };
            f.debug_struct("RwLock").field("data", &&*guard).finish()
        } else {
            f.debug_struct("RwLock").field("data", &format_args!("<locked>")).finish()
        }
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RwLockReadGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: read mode is held for the guard's lifetime
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.mutex.unlock_read();
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RwLockWriteGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: write mode is held for the guard's lifetime
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: write mode is held for the guard's lifetime
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.mutex.unlock_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_concurrent_readers() {
        let lock = RwMutex::new();
        let first = lock.read();
        let second = lock.read();
        assert_eq!(lock.readers(), 2);
        drop(first);
        drop(second);
        assert_eq!(lock.readers(), 0);

        let writer = lock.write();
        assert!(lock.is_write_locked());
        drop(writer);
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let lock = Arc::new(RwMutex::new());
        let reader = lock.read();

        let writer_done = Arc::new(AtomicBool::new(false));
        let writer = {
            let lock = Arc::clone(&lock);
            let writer_done = Arc::clone(&writer_done);
            thread::spawn(move || {
                let _guard = lock.write();
                writer_done.store(true, Ordering::SeqCst);
            })
        };

        // Wait until the writer is queued
        while lock.state().waiting_writers == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        let late_reader_saw_writer = Arc::new(AtomicBool::new(false));
        let late_reader = {
            let lock = Arc::clone(&lock);
            let writer_done = Arc::clone(&writer_done);
            let seen = Arc::clone(&late_reader_saw_writer);
            thread::spawn(move || {
                let _guard = lock.read();
                seen.store(writer_done.load(Ordering::SeqCst), Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!writer_done.load(Ordering::SeqCst));
        drop(reader);

        writer.join().unwrap();
        late_reader.join().unwrap();
        assert!(late_reader_saw_writer.load(Ordering::SeqCst));
    }

    #[test]
    fn test_rwlock_counter() {
        let lock = Arc::new(RwLock::new(0usize));
        let reads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let lock = Arc::clone(&lock);
                let reads = Arc::clone(&reads);
                thread::spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            *lock.write() += 1;
                        } else {
                            let _value = *lock.read();
                            reads.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.read(), 4 * 500);
        assert_eq!(reads.load(Ordering::Relaxed), 4 * 500);
    }

    #[test]
    fn test_get_mut_and_into_inner() {
        let mut lock = RwLock::new(vec![1, 2]);
        lock.get_mut().push(3);
        assert_eq!(format!("{:?}", lock), "RwLock { data: [1, 2, 3] }");
        assert_eq!(lock.into_inner(), vec![1, 2, 3]);
    }
}
