//! The item store (§4.5): glues the slab allocator and hash table together
//! behind a `get`/`insert`/`update`/`delete`/`annex`/`flush` surface.

use crate::error::StoreError;
use crate::hashtable::HashTable;
use crate::item::{Item, ItemFlags, ItemHandle, ITEM_MAGIC};
use crate::slab::{EvictPolicy, SlabAllocator, INVALID_CLASS_ID};

/// Extra bytes reserved per item when CAS tokens are enabled, mirroring
/// the reference's optional trailing CAS field.
const CAS_TOKEN_BYTES: usize = 8;

/// Configuration consumed by [`ItemStore::new`] (§6's `slab_*` options).
pub struct StoreConfig {
    pub slab_size: usize,
    pub slab_chunk_size: usize,
    pub slab_growth_factor: f64,
    pub slab_maxbytes: usize,
    pub slab_evict_opt: EvictPolicy,
    pub slab_use_freeq: bool,
    pub slab_use_cas: bool,
    pub slab_profile: Option<Vec<usize>>,
    pub slab_hash_power: u32,
    pub eviction_seed: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            slab_size: 1 << 20,
            slab_chunk_size: 48,
            slab_growth_factor: 1.25,
            slab_maxbytes: 64 << 20,
            slab_evict_opt: EvictPolicy::Lru,
            slab_use_freeq: true,
            slab_use_cas: true,
            slab_profile: None,
            slab_hash_power: 16,
            eviction_seed: None,
        }
    }
}

pub struct ItemStore {
    allocator: SlabAllocator,
    table: HashTable,
    flush_at: i64,
    cas_counter: u64,
}

impl ItemStore {
    pub fn new(config: &StoreConfig) -> Self {
        let allocator = SlabAllocator::new(
            config.slab_size,
            config.slab_chunk_size,
            config.slab_growth_factor,
            config.slab_maxbytes,
            config.slab_evict_opt,
            config.slab_use_freeq,
            config.slab_use_cas,
            config.slab_profile.as_deref(),
            config.eviction_seed,
        );
        ItemStore {
            allocator,
            table: HashTable::new(config.slab_hash_power),
            flush_at: 0,
            cas_counter: 0,
        }
    }

    fn next_cas(&mut self) -> u64 {
        self.cas_counter += 1;
        self.cas_counter
    }

    fn cas_extra(&self) -> usize {
        if self.allocator.use_cas {
            CAS_TOKEN_BYTES
        } else {
            0
        }
    }

    /// Hash-lookup with lazy-expiration semantics (§4.5): an expired item
    /// is unlinked on the read that discovers it rather than swept eagerly.
    pub fn get(&mut self, key: &[u8], now: i64) -> Option<Item> {
        let handle = self.table.get(key)?;
        let expired = self.allocator.item(handle)?.is_expired(now, self.flush_at);
        if expired {
            self.unlink(key, handle);
            return None;
        }
        self.allocator.item(handle).cloned()
    }

    fn unlink(&mut self, key: &[u8], handle: ItemHandle) {
        self.table.delete(key);
        self.allocator.put_item(handle);
    }

    fn alloc_slot(&mut self, class_id: usize) -> Result<ItemHandle, StoreError> {
        let table = &mut self.table;
        self.allocator
            .get_item(class_id, |_handle, evicted_key| {
                table.delete(evicted_key);
            })
    }

    /// Unconditional insert: allocates a new slot, replacing any prior
    /// entry under `key`. Used directly by `set`, and by `add`/`replace`/
    /// `cas` after their existence checks (§4.6) have already passed.
    pub fn insert(
        &mut self,
        key: &[u8],
        value: &[u8],
        dataflag: u32,
        exptime: i64,
        now: i64,
    ) -> Result<(), StoreError> {
        let needed = key.len() + value.len() + self.cas_extra();
        let class_id = self.allocator.slab_id(needed);
        if class_id == INVALID_CLASS_ID {
            return Err(StoreError::Oversized);
        }
        let handle = self.alloc_slot(class_id)?;
        let cas = self.next_cas();
        let item = Item {
            magic: ITEM_MAGIC,
            class_id: handle.class_id,
            slab_idx: handle.slab_idx,
            slot_idx: handle.slot_idx,
            flags: ItemFlags::new().with_is_linked(true),
            key: key.to_vec(),
            value: value.to_vec(),
            dataflag,
            create_at: now,
            expire_at: if exptime > 0 { now + exptime } else { 0 },
            cas,
        };
        self.allocator.place(handle, item);
        if let Some(prior) = self.table.put(key, handle) {
            self.allocator.put_item(prior);
        }
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.table.delete(key) {
            Some(handle) => {
                self.allocator.put_item(handle);
                true
            }
            None => false,
        }
    }

    /// Overwrites `key`'s value in place. Precondition (checked by the
    /// caller, per §4.5): `slab_id(klen + new_vlen) == existing class`.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> bool {
        let Some(handle) = self.table.get(key) else {
            return false;
        };
        let cas = self.next_cas();
        if let Some(item) = self.allocator.item_mut(handle) {
            item.value = value.to_vec();
            item.cas = cas;
            true
        } else {
            false
        }
    }

    /// Logical append (`append=true`) or prepend (`append=false`) onto an
    /// existing item (§4.5). `NotFound` bubbles up to the caller as `None`
    /// so dispatch can compose `NOT_STORED`.
    pub fn annex(
        &mut self,
        key: &[u8],
        extra: &[u8],
        append: bool,
        now: i64,
    ) -> Option<Result<(), StoreError>> {
        let handle = self.table.get(key)?;
        let old = self.allocator.item(handle)?.clone();
        let combined_len = old.key.len() + old.value.len() + extra.len() + self.cas_extra();
        let same_class = self.allocator.slab_id(combined_len) == handle.class_id;
        // Append needs a left-aligned slot, prepend a right-aligned one;
        // a slot that's aligned the other way still takes the slow path
        // even if the combined size would otherwise fit.
        let alignment_ok = old.flags.is_raligned() != append;

        if same_class && alignment_ok {
            // Fast path: room in the existing slot, rewrite value in place.
            let cas = self.next_cas();
            if let Some(item) = self.allocator.item_mut(handle) {
                if append {
                    item.value.extend_from_slice(extra);
                } else {
                    let mut new_value = extra.to_vec();
                    new_value.extend_from_slice(&item.value);
                    item.value = new_value;
                }
                item.cas = cas;
            }
            return Some(Ok(()));
        }

        // Slow path: allocate a fresh slot sized for the combined value.
        let new_class = self.allocator.slab_id(combined_len);
        if new_class == INVALID_CLASS_ID {
            return Some(Err(StoreError::Oversized));
        }
        let new_handle = match self.alloc_slot(new_class) {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };
        let new_value = if append {
            let mut v = old.value.clone();
            v.extend_from_slice(extra);
            v
        } else {
            let mut v = extra.to_vec();
            v.extend_from_slice(&old.value);
            v
        };
        let cas = self.next_cas();
        let item = Item {
            magic: ITEM_MAGIC,
            class_id: new_handle.class_id,
            slab_idx: new_handle.slab_idx,
            slot_idx: new_handle.slot_idx,
            flags: ItemFlags::new()
                .with_is_linked(true)
                .with_is_raligned(!append),
            key: old.key.clone(),
            value: new_value,
            dataflag: old.dataflag,
            create_at: now,
            expire_at: old.expire_at,
            cas,
        };
        self.allocator.place(new_handle, item);
        self.table.put(key, new_handle);
        self.allocator.put_item(handle);
        Some(Ok(()))
    }

    /// Sets the flush watermark; existing items become lazily expired on
    /// their next `get` rather than being swept immediately.
    pub fn flush(&mut self, now: i64) {
        self.flush_at = now;
    }

    pub fn slab_id(&self, nbytes: usize) -> usize {
        self.allocator.slab_id(nbytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ItemStore {
        ItemStore::new(&StoreConfig {
            slab_size: 4096,
            ..Default::default()
        })
    }

    #[test]
    fn s6_insert_then_append_then_get() {
        let mut s = store();
        s.insert(b"k", b"v1", 0, 0, 100).unwrap();
        s.annex(b"k", b"v2", true, 100).unwrap().unwrap();
        let item = s.get(b"k", 100).unwrap();
        assert_eq!(item.value, b"v1v2");
    }

    #[test]
    fn prepend_puts_new_bytes_first() {
        let mut s = store();
        s.insert(b"k", b"v1", 0, 0, 100).unwrap();
        s.annex(b"k", b"v0", false, 100).unwrap().unwrap();
        let item = s.get(b"k", 100).unwrap();
        assert_eq!(item.value, b"v0v1");
    }

    #[test]
    fn annex_on_missing_key_is_none() {
        let mut s = store();
        assert!(s.annex(b"missing", b"x", true, 100).is_none());
    }

    #[test]
    fn oversize_rejection_leaves_state_untouched() {
        let mut s = store();
        let huge = vec![0u8; 1 << 20];
        assert_eq!(s.insert(b"k", &huge, 0, 0, 100), Err(StoreError::Oversized));
        assert_eq!(s.get(b"k", 100), None);
    }

    #[test]
    fn class_fit_property() {
        let mut s = store();
        s.insert(b"k", b"value", 0, 0, 100).unwrap();
        let item = s.get(b"k", 100).unwrap();
        assert_eq!(s.slab_id(item.klen() + item.vlen()), item.class_id);
    }

    #[test]
    fn hash_uniqueness_on_reinsert() {
        let mut s = store();
        s.insert(b"k", b"v1", 0, 0, 100).unwrap();
        s.insert(b"k", b"v2", 0, 0, 100).unwrap();
        assert_eq!(s.table.len(), 1);
        assert_eq!(s.get(b"k", 100).unwrap().value, b"v2");
    }

    #[test]
    fn lazy_flush_hides_old_items_but_not_new_ones() {
        let mut s = store();
        s.insert(b"old", b"v", 0, 0, 100).unwrap();
        s.flush(200);
        assert_eq!(s.get(b"old", 201), None);
        s.insert(b"new", b"v", 0, 0, 201).unwrap();
        assert_eq!(s.get(b"new", 201).unwrap().value, b"v");
    }

    #[test]
    fn expired_item_is_lazily_unlinked() {
        let mut s = store();
        s.insert(b"k", b"v", 0, 10, 100).unwrap();
        assert!(s.get(b"k", 105).is_some());
        assert_eq!(s.get(b"k", 111), None);
    }

    #[test]
    fn delete_returns_false_for_missing_key() {
        let mut s = store();
        assert!(!s.delete(b"missing"));
    }
}
