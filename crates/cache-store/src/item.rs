//! The stored entity (§3.4): a key/value pair plus metadata, occupying
//! exactly one slab slot.

use modular_bitfield::prelude::*;

/// Debug sentinel stamped into every live item; cheap corruption check in
/// assertions, never read outside `debug_assert!`.
pub const ITEM_MAGIC: u32 = 0xDEAD_BEEF;

/// The three link-state bits from §3.4, packed the way the teacher packs
/// its protocol flag bytes.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemFlags {
    pub is_linked: bool,
    pub in_freeq: bool,
    pub is_raligned: bool,
    #[skip]
    __: B5,
}

/// One stored key/value pair. Key and value are owned buffers rather than
/// byte ranges into a shared page: see `DESIGN.md` for why this crate
/// models slab slots as an arena of owned slots instead of literal packed
/// bytes.
#[derive(Debug, Clone)]
pub struct Item {
    pub magic: u32,
    /// Slot coordinates within the owning [`crate::slab::SlabAllocator`].
    pub class_id: usize,
    pub slab_idx: usize,
    pub slot_idx: usize,
    pub flags: ItemFlags,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Opaque user flag carried by `set`-family commands.
    pub dataflag: u32,
    pub create_at: i64,
    /// Monotonic seconds; `0` means "never expires".
    pub expire_at: i64,
    pub cas: u64,
}

impl Item {
    pub fn klen(&self) -> usize {
        self.key.len()
    }

    pub fn vlen(&self) -> usize {
        self.value.len()
    }

    /// Total bytes this item occupies, for slab-class fit checks.
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }

    pub fn is_expired(&self, now: i64, flush_at: i64) -> bool {
        (self.expire_at > 0 && self.expire_at < now) || self.create_at <= flush_at
    }
}

/// An opaque handle to a live item's slot, stable for the item's entire
/// lifetime since slab pages never move or shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemHandle {
    pub class_id: usize,
    pub slab_idx: usize,
    pub slot_idx: usize,
}

impl From<&Item> for ItemHandle {
    fn from(it: &Item) -> Self {
        ItemHandle {
            class_id: it.class_id,
            slab_idx: it.slab_idx,
            slot_idx: it.slot_idx,
        }
    }
}
