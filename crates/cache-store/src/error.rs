//! Store-level error taxonomy (§7).
//!
//! `NotFound`/`NotStored`/`Exists` are ordinary memcached outcomes, not
//! errors, so they are not represented here — callers get them back as
//! plain `bool`/`Option` results and the Glue layer (cache-core) maps them
//! to wire responses directly.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// `klen + vlen + header` exceeds the largest slab class.
    #[error("item exceeds the largest available slab class")]
    Oversized,

    /// Slab allocation failed and no evictable candidate was available.
    #[error("slab allocator exhausted with no evictable candidate")]
    NoMem,
}
