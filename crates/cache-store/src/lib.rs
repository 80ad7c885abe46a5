//! Slab-class memory allocator and hash-table-backed item store (§3.4–§3.6,
//! §4.4–§4.5). This crate owns the only byte-accounting memory model in the
//! workspace; `cache-core` drives it but never reaches past its public
//! surface into slab internals.

mod error;
mod hashtable;
mod item;
mod slab;
mod store;

pub use error::StoreError;
pub use item::{Item, ItemFlags, ItemHandle, ITEM_MAGIC};
pub use slab::{build_class_table, EvictPolicy, INVALID_CLASS_ID};
pub use store::{ItemStore, StoreConfig};
