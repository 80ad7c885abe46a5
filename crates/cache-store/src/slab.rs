//! Fixed-size-class slab allocator (§3.5, §4.4).
//!
//! Slab pages are modeled as an arena of owned slots (`Vec<Option<Item>>`)
//! rather than a raw byte page sliced by hand: Rust's ownership rules make
//! carving literal byte ranges into live `&mut Item` references an unsafe
//! exercise for no real benefit here, and `ItemHandle`'s `(class_id,
//! slab_idx, slot_idx)` triple already gives the stable, never-moving
//! addressing the reference implementation gets from raw pointers. See
//! `DESIGN.md` for the full rationale.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::StoreError;
use crate::item::{Item, ItemHandle};

/// Fixed per-page header overhead subtracted from `slab_size` before the
/// class table is built, mirroring the reference's `slab_hdr_size`.
const SLAB_HEADER_BYTES: usize = 48;

/// `slab_id` sentinel meaning "no class can hold this many bytes".
pub const INVALID_CLASS_ID: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictPolicy {
    None,
    Random,
    Lru,
}

/// One page of `slab_size` bytes, carved into same-sized slots for exactly
/// one class at a time. Reassigned to a different class only by eviction.
#[derive(Debug)]
struct Slab {
    class_id: usize,
    slots: Vec<Option<Item>>,
}

/// The set of items sharing a slot size, with its own free queue and
/// carve cursor (§3.5).
#[derive(Debug)]
struct SlabClass {
    /// Maximum `klen + vlen` (plus the CAS token's 8 bytes, if enabled)
    /// this class's slots can hold.
    item_size: usize,
    free_queue: Vec<ItemHandle>,
    /// Slab indices ever assigned to this class, oldest first; the front
    /// is the LRU eviction candidate.
    slabs: Vec<usize>,
    carve_slab: Option<usize>,
    carve_offset: usize,
}

impl SlabClass {
    fn slots_per_slab(&self, slab_size: usize) -> usize {
        (slab_size / self.item_size).max(1)
    }
}

/// Builds the class table per §4.4: geometric growth from `chunk_size`,
/// capped at the slab payload size, with the last class covering exactly
/// the payload.
pub fn build_class_table(chunk_size: usize, growth_factor: f64, slab_size: usize) -> Vec<usize> {
    let payload = slab_size.saturating_sub(SLAB_HEADER_BYTES).max(chunk_size);
    let mut sizes = Vec::new();
    let mut sz = chunk_size;
    loop {
        if sz >= payload {
            sizes.push(payload);
            break;
        }
        sizes.push(sz);
        let next = ((sz as f64) * growth_factor).ceil() as usize;
        sz = next.max(sz + 1);
    }
    sizes
}

pub struct SlabAllocator {
    slab_size: usize,
    slab_maxbytes: usize,
    evict_opt: EvictPolicy,
    use_freeq: bool,
    pub use_cas: bool,
    classes: Vec<SlabClass>,
    slabs: Vec<Slab>,
    rng: SmallRng,
}

impl SlabAllocator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        slab_size: usize,
        slab_chunk_size: usize,
        growth_factor: f64,
        slab_maxbytes: usize,
        evict_opt: EvictPolicy,
        use_freeq: bool,
        use_cas: bool,
        profile: Option<&[usize]>,
        eviction_seed: Option<u64>,
    ) -> Self {
        let sizes = match profile {
            Some(sizes) => sizes.to_vec(),
            None => build_class_table(slab_chunk_size, growth_factor, slab_size),
        };
        let classes = sizes
            .into_iter()
            .map(|item_size| SlabClass {
                item_size,
                free_queue: Vec::new(),
                slabs: Vec::new(),
                carve_slab: None,
                carve_offset: 0,
            })
            .collect();
        let rng = match eviction_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(rand::thread_rng()).expect("OS RNG is always available"),
        };
        SlabAllocator {
            slab_size,
            slab_maxbytes,
            evict_opt,
            use_freeq,
            use_cas,
            classes,
            slabs: Vec::new(),
            rng,
        }
    }

    pub fn class_item_size(&self, class_id: usize) -> usize {
        self.classes[class_id].item_size
    }

    /// Smallest class whose slot can hold `nbytes`, or `INVALID_CLASS_ID`
    /// if no class is large enough.
    pub fn slab_id(&self, nbytes: usize) -> usize {
        self.classes
            .iter()
            .position(|c| c.item_size >= nbytes)
            .unwrap_or(INVALID_CLASS_ID)
    }

    fn bytes_allocated(&self) -> usize {
        self.slabs.len() * self.slab_size
    }

    /// Allocates a slot in `class_id`, carving a new page or evicting per
    /// policy if the class and global budget are exhausted. `on_evict` is
    /// called once per item unlinked from a reclaimed page, so the caller
    /// (`ItemStore`) can remove it from the hash table first.
    pub fn get_item(
        &mut self,
        class_id: usize,
        mut on_evict: impl FnMut(ItemHandle, &[u8]),
    ) -> Result<ItemHandle, StoreError> {
        if self.use_freeq {
            if let Some(handle) = self.classes[class_id].free_queue.pop() {
                self.slot_mut(handle).take();
                return Ok(handle);
            }
        }

        if let Some(handle) = self.try_carve(class_id) {
            return Ok(handle);
        }

        if self.bytes_allocated() + self.slab_size <= self.slab_maxbytes {
            self.push_new_slab(class_id);
            return Ok(self
                .try_carve(class_id)
                .expect("freshly pushed slab always has room"));
        }

        match self.evict_opt {
            EvictPolicy::None => Err(StoreError::NoMem),
            EvictPolicy::Random => self.evict_random(class_id, &mut on_evict),
            EvictPolicy::Lru => self.evict_lru(class_id, &mut on_evict),
        }
    }

    pub fn put_item(&mut self, handle: ItemHandle) {
        if let Some(slot) = self.slab_mut(handle.slab_idx).slots.get_mut(handle.slot_idx) {
            *slot = None;
        }
        if self.use_freeq {
            self.classes[handle.class_id].free_queue.push(handle);
        }
    }

    pub fn item(&self, handle: ItemHandle) -> Option<&Item> {
        self.slabs
            .get(handle.slab_idx)?
            .slots
            .get(handle.slot_idx)?
            .as_ref()
    }

    pub fn item_mut(&mut self, handle: ItemHandle) -> Option<&mut Item> {
        self.slabs
            .get_mut(handle.slab_idx)?
            .slots
            .get_mut(handle.slot_idx)?
            .as_mut()
    }

    /// Installs a freshly built `Item` into a handle this allocator
    /// produced via [`get_item`].
    pub fn place(&mut self, handle: ItemHandle, item: Item) {
        *self.slot_mut(handle) = Some(item);
    }

    fn slot_mut(&mut self, handle: ItemHandle) -> &mut Option<Item> {
        &mut self.slabs[handle.slab_idx].slots[handle.slot_idx]
    }

    fn slab_mut(&mut self, slab_idx: usize) -> &mut Slab {
        &mut self.slabs[slab_idx]
    }

    fn push_new_slab(&mut self, class_id: usize) {
        let slots_per_slab = self.classes[class_id].slots_per_slab(self.slab_size);
        let slab_idx = self.slabs.len();
        self.slabs.push(Slab {
            class_id,
            slots: (0..slots_per_slab).map(|_| None).collect(),
        });
        self.classes[class_id].carve_slab = Some(slab_idx);
        self.classes[class_id].carve_offset = 0;
        self.classes[class_id].slabs.push(slab_idx);
        log::debug!("slab allocator: carved new page for class {class_id}");
    }

    fn try_carve(&mut self, class_id: usize) -> Option<ItemHandle> {
        let slab_idx = self.classes[class_id].carve_slab?;
        let slots_per_slab = self.classes[class_id].slots_per_slab(self.slab_size);
        let offset = self.classes[class_id].carve_offset;
        if offset >= slots_per_slab {
            return None;
        }
        self.classes[class_id].carve_offset += 1;
        Some(ItemHandle {
            class_id,
            slab_idx,
            slot_idx: offset,
        })
    }

    fn reclaim_slab(
        &mut self,
        slab_idx: usize,
        class_id: usize,
        on_evict: &mut impl FnMut(ItemHandle, &[u8]),
    ) -> ItemHandle {
        let old_class = self.slabs[slab_idx].class_id;
        let slot_count = self.slabs[slab_idx].slots.len();
        for slot_idx in 0..slot_count {
            if let Some(item) = &self.slabs[slab_idx].slots[slot_idx] {
                on_evict(
                    ItemHandle {
                        class_id: old_class,
                        slab_idx,
                        slot_idx,
                    },
                    &item.key,
                );
            }
        }
        self.classes[old_class].slabs.retain(|&i| i != slab_idx);

        let slots_per_slab = self.classes[class_id].slots_per_slab(self.slab_size);
        self.slabs[slab_idx] = Slab {
            class_id,
            slots: (0..slots_per_slab).map(|_| None).collect(),
        };
        self.classes[class_id].carve_slab = Some(slab_idx);
        self.classes[class_id].carve_offset = 1;
        self.classes[class_id].slabs.push(slab_idx);
        log::warn!("slab allocator: evicted page {slab_idx} (was class {old_class}) for class {class_id}");
        ItemHandle {
            class_id,
            slab_idx,
            slot_idx: 0,
        }
    }

    fn evict_random(
        &mut self,
        class_id: usize,
        on_evict: &mut impl FnMut(ItemHandle, &[u8]),
    ) -> Result<ItemHandle, StoreError> {
        let candidates: Vec<usize> = self
            .classes
            .iter()
            .flat_map(|c| c.slabs.iter().copied().filter(|&s| Some(s) != c.carve_slab))
            .collect();
        if candidates.is_empty() {
            return Err(StoreError::NoMem);
        }
        let pick = candidates[self.rng.gen_range(0..candidates.len())];
        Ok(self.reclaim_slab(pick, class_id, on_evict))
    }

    fn evict_lru(
        &mut self,
        class_id: usize,
        on_evict: &mut impl FnMut(ItemHandle, &[u8]),
    ) -> Result<ItemHandle, StoreError> {
        let carve = self.classes[class_id].carve_slab;
        let pick = self.classes[class_id]
            .slabs
            .iter()
            .copied()
            .find(|&s| Some(s) != carve);
        match pick {
            Some(slab_idx) => Ok(self.reclaim_slab(slab_idx, class_id, on_evict)),
            None => Err(StoreError::NoMem),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(slab_size: usize, maxbytes: usize, evict: EvictPolicy) -> SlabAllocator {
        SlabAllocator::new(slab_size, 48, 1.25, maxbytes, evict, true, true, None, Some(1))
    }

    #[test]
    fn class_table_is_increasing_and_capped() {
        let sizes = build_class_table(48, 1.25, 1024);
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*sizes.last().unwrap(), 1024 - SLAB_HEADER_BYTES);
    }

    #[test]
    fn slab_id_picks_smallest_fitting_class() {
        let a = alloc(1024, 1 << 20, EvictPolicy::None);
        let id = a.slab_id(10);
        assert!(a.class_item_size(id) >= 10);
        assert_eq!(a.slab_id(1 << 30), INVALID_CLASS_ID);
    }

    #[test]
    fn get_item_carves_then_reuses_freequeue() {
        let mut a = alloc(1024, 1 << 20, EvictPolicy::None);
        let id = a.slab_id(10);
        let h1 = a.get_item(id, |_, _| {}).unwrap();
        a.place(h1, dummy_item(h1));
        a.put_item(h1);
        let h2 = a.get_item(id, |_, _| {}).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn no_eviction_policy_returns_nomem_when_exhausted() {
        let mut a = alloc(64, 64, EvictPolicy::None);
        let id = a.slab_id(8);
        loop {
            match a.get_item(id, |_, _| {}) {
                Ok(h) => a.place(h, dummy_item(h)),
                Err(StoreError::NoMem) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[test]
    fn random_eviction_reclaims_a_full_page() {
        let mut a = alloc(64, 64, EvictPolicy::Random);
        let id = a.slab_id(8);
        let mut evicted = 0;
        for _ in 0..64 {
            let h = a
                .get_item(id, |_, _| evicted += 1)
                .expect("random eviction should never run out");
            a.place(h, dummy_item(h));
        }
        assert!(evicted > 0, "expected at least one page reclamation");
    }

    fn dummy_item(h: ItemHandle) -> Item {
        Item {
            magic: crate::item::ITEM_MAGIC,
            class_id: h.class_id,
            slab_idx: h.slab_idx,
            slot_idx: h.slot_idx,
            flags: crate::item::ItemFlags::new().with_is_linked(false),
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            dataflag: 0,
            create_at: 0,
            expire_at: 0,
            cas: 0,
        }
    }
}
