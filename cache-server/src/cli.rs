//! CLI surface (§6): `clap`-derived flags layered over an optional TOML
//! config file, in CLI > file > default precedence.

use std::path::PathBuf;

use cache_core::PartialConfig;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "cachecore", version, about, long_about = None)]
pub struct Cli {
    /// Optional TOML config file (§6); CLI flags below override its values.
    pub config_file: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(long)]
    pub slab_size: Option<usize>,
    #[arg(long)]
    pub slab_maxbytes: Option<usize>,
    #[arg(long, value_name = "none|random|lru")]
    pub slab_evict_opt: Option<String>,
    #[arg(long)]
    pub eviction_seed: Option<u64>,
}

impl Cli {
    /// Folds the flags that were actually passed into a [`PartialConfig`]
    /// layer; absent flags stay `None` so they don't shadow the file/default
    /// layers beneath them.
    pub fn into_partial_config(self) -> PartialConfig {
        PartialConfig {
            server_host: self.host,
            server_port: self.port,
            log_level: self.log_level,
            slab_size: self.slab_size,
            slab_maxbytes: self.slab_maxbytes,
            slab_evict_opt: self.slab_evict_opt,
            eviction_seed: self.eviction_seed,
            ..Default::default()
        }
    }
}
