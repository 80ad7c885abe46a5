//! Request dispatch, configuration, and stats registry binding the wire
//! codecs ([`cache_proto`]) to the item store ([`cache_store`]) (§3.7, §4.6,
//! §9). This crate owns [`CoreContext`], the single struct that replaces
//! the reference implementation's process-wide globals, and the
//! `dispatch_redis`/`dispatch_memcache` functions that drive it from a
//! parsed [`cache_proto::Request`].

mod config;
mod context;
mod dispatch;
mod error;
mod stats;

pub use config::{resolve as resolve_config, Config, PartialConfig};
pub use context::CoreContext;
pub use dispatch::{dispatch_memcache, dispatch_redis};
pub use error::CoreError;
pub use stats::{CodecStats, Counter, ItemStats, ServerStats, SlabStats, Stats};
