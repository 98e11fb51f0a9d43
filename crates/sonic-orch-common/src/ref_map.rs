//! Reference-counted map that never creates entries implicitly.
//!
//! `RefMap` is the bookkeeping under every shared hardware object. An entry
//! is created explicitly with a count of one, shared with
//! [`RefMap::increment_ref`], and handed back to the caller by
//! [`RefMap::decrement_ref`] when its count reaches zero. Touching a missing
//! key is an error rather than a default-constructed entry, so a stray
//! release can never resurrect or underflow a count.

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Error type for RefMap operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefMapError {
    #[error("key not found")]
    KeyNotFound,

    #[error("key already present")]
    AlreadyPresent,
}

/// Result of dropping one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Released<V> {
    /// Other holders remain; the new count.
    Retained(u32),
    /// That was the last reference; the entry was removed.
    Last(V),
}

#[derive(Debug, Clone)]
struct Counted<V> {
    value: V,
    ref_count: u32,
}

/// A map from key to a shared value with an explicit reference count.
///
/// # Example
///
/// ```
/// use sonic_orch_common::{RefMap, Released};
///
/// let mut map: RefMap<&str, u64> = RefMap::new();
/// assert!(map.increment_ref(&"missing").is_err());
/// assert!(map.is_empty());
///
/// map.insert_new("nh-set", 0x42).unwrap();
/// assert_eq!(map.increment_ref(&"nh-set"), Ok(2));
/// assert_eq!(map.decrement_ref(&"nh-set"), Ok(Released::Retained(1)));
/// assert_eq!(map.decrement_ref(&"nh-set"), Ok(Released::Last(0x42)));
/// assert!(map.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct RefMap<K, V> {
    inner: HashMap<K, Counted<V>>,
}

impl<K, V> RefMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns the shared value. **This never creates entries.**
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key).map(|c| &c.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key).map(|c| &mut c.value)
    }

    pub fn ref_count(&self, key: &K) -> Option<u32> {
        self.inner.get(key).map(|c| c.ref_count)
    }

    /// Inserts a new entry holding one reference.
    pub fn insert_new(&mut self, key: K, value: V) -> Result<(), RefMapError> {
        if self.inner.contains_key(&key) {
            return Err(RefMapError::AlreadyPresent);
        }
        self.inner.insert(
            key,
            Counted {
                value,
                ref_count: 1,
            },
        );
        Ok(())
    }

    /// Adds a reference to an existing entry and returns the new count.
    ///
    /// The safe replacement for `map[key].ref_count++`.
    pub fn increment_ref(&mut self, key: &K) -> Result<u32, RefMapError> {
        match self.inner.get_mut(key) {
            Some(entry) => {
                entry.ref_count = entry.ref_count.saturating_add(1);
                Ok(entry.ref_count)
            }
            None => Err(RefMapError::KeyNotFound),
        }
    }

    /// Drops a reference, removing the entry when it was the last one.
    pub fn decrement_ref(&mut self, key: &K) -> Result<Released<V>, RefMapError> {
        let entry = self.inner.get_mut(key).ok_or(RefMapError::KeyNotFound)?;
        if entry.ref_count > 1 {
            entry.ref_count -= 1;
            return Ok(Released::Retained(entry.ref_count));
        }
        match self.inner.remove(key) {
            Some(entry) => Ok(Released::Last(entry.value)),
            None => Err(RefMapError::KeyNotFound),
        }
    }

    /// Removes an entry regardless of its count.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|c| c.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter().map(|(k, c)| (k, &c.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }
}

impl<K, V> Default for RefMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_never_creates() {
        let mut map: RefMap<String, i32> = RefMap::new();

        assert!(map.get(&"missing".to_string()).is_none());
        assert!(map.get_mut(&"missing".to_string()).is_none());
        assert_eq!(map.ref_count(&"missing".to_string()), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_increment_requires_existing_key() {
        let mut map: RefMap<String, i32> = RefMap::new();
        assert_eq!(
            map.increment_ref(&"key".to_string()),
            Err(RefMapError::KeyNotFound)
        );

        map.insert_new("key".to_string(), 7).unwrap();
        assert_eq!(map.increment_ref(&"key".to_string()), Ok(2));
        assert_eq!(map.increment_ref(&"key".to_string()), Ok(3));
        assert_eq!(map.ref_count(&"key".to_string()), Some(3));
    }

    #[test]
    fn test_insert_new_rejects_duplicate() {
        let mut map: RefMap<u32, &str> = RefMap::new();
        map.insert_new(1, "a").unwrap();
        assert_eq!(map.insert_new(1, "b"), Err(RefMapError::AlreadyPresent));
        assert_eq!(map.get(&1), Some(&"a"));
        assert_eq!(map.ref_count(&1), Some(1));
    }

    #[test]
    fn test_decrement_to_zero_removes() {
        let mut map: RefMap<u32, &str> = RefMap::new();
        map.insert_new(1, "a").unwrap();
        map.increment_ref(&1).unwrap();

        assert_eq!(map.decrement_ref(&1), Ok(Released::Retained(1)));
        assert_eq!(map.decrement_ref(&1), Ok(Released::Last("a")));
        assert!(!map.contains_key(&1));

        // No underflow, no resurrection.
        assert_eq!(map.decrement_ref(&1), Err(RefMapError::KeyNotFound));
        assert!(map.is_empty());
    }
}
