//! CoreContext (§3.7, §9): the single struct aggregating everything that
//! was process-wide global state in the reference implementation (slab
//! allocator, hash table, flush watermark, CAS counter, stats, config).
//! Constructed once at startup and threaded by `&mut` into dispatch for
//! every request rather than reached through a lazily-initialized global.

use cache_store::ItemStore;

use crate::config::Config;
use crate::stats::Stats;

pub struct CoreContext {
    pub store: ItemStore,
    pub stats: Stats,
    pub config: Config,
}

impl CoreContext {
    pub fn new(config: Config) -> Self {
        let store = ItemStore::new(&config.store_config());
        CoreContext {
            store,
            stats: Stats::default(),
            config,
        }
    }
}
