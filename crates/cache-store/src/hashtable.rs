//! Open-chaining hash table over item handles (§3.6).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::item::ItemHandle;

struct Entry {
    key: Vec<u8>,
    handle: ItemHandle,
}

/// Sized to a configurable power of two (`1 << hash_power`). Buckets are
/// singly linked chains (modeled as `Vec<Entry>`); insertion replaces any
/// prior entry with the same key.
pub struct HashTable {
    buckets: Vec<Vec<Entry>>,
    mask: usize,
}

impl HashTable {
    pub fn new(hash_power: u32) -> Self {
        let n = 1usize << hash_power;
        HashTable {
            buckets: (0..n).map(|_| Vec::new()).collect(),
            mask: n - 1,
        }
    }

    fn bucket_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    pub fn get(&self, key: &[u8]) -> Option<ItemHandle> {
        let idx = self.bucket_index(key);
        self.buckets[idx]
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.handle)
    }

    /// Inserts `handle` under `key`, unlinking and returning any prior
    /// entry with the same key (the caller must return it to the slab
    /// allocator's free queue).
    pub fn put(&mut self, key: &[u8], handle: ItemHandle) -> Option<ItemHandle> {
        let idx = self.bucket_index(key);
        let prior = self.remove_from_bucket(idx, key);
        self.buckets[idx].push(Entry {
            key: key.to_vec(),
            handle,
        });
        prior
    }

    pub fn delete(&mut self, key: &[u8]) -> Option<ItemHandle> {
        let idx = self.bucket_index(key);
        self.remove_from_bucket(idx, key)
    }

    fn remove_from_bucket(&mut self, idx: usize, key: &[u8]) -> Option<ItemHandle> {
        let bucket = &mut self.buckets[idx];
        let pos = bucket.iter().position(|e| e.key == key)?;
        Some(bucket.remove(pos).handle)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: usize) -> ItemHandle {
        ItemHandle {
            class_id: 0,
            slab_idx: 0,
            slot_idx: n,
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let mut t = HashTable::new(4);
        t.put(b"k", h(1));
        assert_eq!(t.get(b"k"), Some(h(1)));
    }

    #[test]
    fn put_replaces_prior_entry_with_same_key() {
        let mut t = HashTable::new(4);
        t.put(b"k", h(1));
        let prior = t.put(b"k", h(2));
        assert_eq!(prior, Some(h(1)));
        assert_eq!(t.get(b"k"), Some(h(2)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn delete_removes_entry() {
        let mut t = HashTable::new(4);
        t.put(b"k", h(1));
        assert_eq!(t.delete(b"k"), Some(h(1)));
        assert_eq!(t.get(b"k"), None);
    }
}
