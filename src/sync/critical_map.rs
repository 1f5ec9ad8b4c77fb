//! Map shared between connection threads

use super::{RwLock, SharedWriteLock};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Hash map guarded by a writer-preferring [`RwLock`]
///
/// Lookups take read mode; every mutation goes through a method here that
/// takes write mode and replaces whole entries.
#[derive(Debug)]
pub struct CriticalMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> CriticalMap<K, V>
where
    K: Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace an entry, returning the previous value
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Modify an entry in place under write mode
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Result<R> {
        let mut map = self.inner.write();
        let value = map
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("{:?}", key)))?;
        Ok(f(value))
    }

    pub fn has(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Write mode over the whole map for several steps at once
    pub fn batch(&self) -> SharedWriteLock<'_, HashMap<K, V>> {
        self.inner.write_shared()
    }
}

impl<K, V> CriticalMap<K, V>
where
    K: Eq + Hash + Debug + Clone,
    V: Clone,
{
    /// Copy of the value stored under `key`
    pub fn get(&self, key: &K) -> Result<V> {
        self.inner
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{:?}", key)))
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Eq + Hash + Debug, V> Default for CriticalMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_operations() {
        let map = CriticalMap::new();
        assert!(map.insert("alpha", 1).is_none());
        assert_eq!(map.insert("alpha", 2), Some(1));
        assert!(map.has(&"alpha"));
        assert_eq!(map.get(&"alpha").unwrap(), 2);

        assert_eq!(map.update(&"alpha", |v| { *v += 1; *v }).unwrap(), 3);
        assert!(matches!(map.update(&"beta", |v| *v), Err(Error::NotFound(_))));

        assert_eq!(map.remove(&"alpha"), Some(3));
        assert!(map.is_empty());
    }

    #[test]
    fn test_has_unchanged_after_failed_get() {
        let map: CriticalMap<String, u32> = CriticalMap::new();
        map.insert("present".to_string(), 1);

        let before = (map.has(&"present".to_string()), map.has(&"absent".to_string()));
        assert!(map.get(&"absent".to_string()).is_err());
        let after = (map.has(&"present".to_string()), map.has(&"absent".to_string()));
        assert_eq!(before, after);
    }

    #[test]
    fn test_batch_is_atomic() {
        let map = CriticalMap::new();
        map.insert(1, "one".to_string());

        let batch = map.batch();
        let helper = batch.clone();
        batch.with(|m| m.remove(&1));
        helper.with(|m| m.insert(2, "two".to_string()));
        drop(batch);
        drop(helper);

        assert_eq!(map.snapshot(), vec![(2, "two".to_string())]);
    }

    /// Writers store entries whose two halves must always agree; readers check them.
    #[test]
    fn test_no_torn_entries_under_contention() {
        let map: Arc<CriticalMap<u32, (u64, u64)>> = Arc::new(CriticalMap::new());
        for key in 0..16 {
            map.insert(key, (0, 0));
        }

        let torn = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        for _ in 0..2 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..2_000 {
                    let key = rng.gen_range(0..16);
                    let value: u64 = rng.gen();
                    if rng.gen_bool(0.5) {
                        map.insert(key, (value, !value));
                    } else {
                        map.update(&key, |entry| *entry = (value, !value)).unwrap();
                    }
                }
            }));
        }

        for _ in 0..6 {
            let map = Arc::clone(&map);
            let torn = Arc::clone(&torn);
            handles.push(thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..4_000 {
                    let key = rng.gen_range(0..16);
                    let (a, b) = map.get(&key).unwrap();
                    if (a, b) != (0, 0) && b != !a {
                        torn.store(true, Ordering::SeqCst);
                    }
                }
                for (_, (a, b)) in map.snapshot() {
                    if (a, b) != (0, 0) && b != !a {
                        torn.store(true, Ordering::SeqCst);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!torn.load(Ordering::SeqCst));
        assert_eq!(map.len(), 16);
    }
}
