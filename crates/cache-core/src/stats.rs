//! Process-wide stats registry (§9, supplemented from the reference's
//! per-module `stats.h` counter structs): one plain `AtomicU64` group per
//! module, incremented at the same call sites the reference increments
//! its metric macros. No exporter is wired up (§1 places that out of
//! scope) but every counter here is real and inspectable.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct CodecStats {
    pub requests_parsed: Counter,
    pub parse_incomplete: Counter,
    pub parse_invalid: Counter,
    pub parse_overflow: Counter,
}

#[derive(Debug, Default)]
pub struct SlabStats {
    pub oom: Counter,
}

#[derive(Debug, Default)]
pub struct ItemStats {
    pub hits: Counter,
    pub misses: Counter,
    pub inserts: Counter,
    pub deletes: Counter,
}

#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_accepted: Counter,
    pub connections_closed: Counter,
    pub bytes_in: Counter,
    pub bytes_out: Counter,
}

#[derive(Debug, Default)]
pub struct Stats {
    pub codec_redis: CodecStats,
    pub codec_memcache: CodecStats,
    pub slab: SlabStats,
    pub item: ItemStats,
    pub server: ServerStats,
}
