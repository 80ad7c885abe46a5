//! Configuration (§6, §9): a resolved [`Config`] is assembled by layering
//! CLI flags over an optional TOML file over built-in defaults (CLI > file
//! > default), mirroring the reference's `option_load_default` →
//! `option_load_file` → CLI-override sequence in `bb_main.c`.

use std::path::Path;

use cache_store::{EvictPolicy, StoreConfig};
use serde::Deserialize;

use crate::error::CoreError;

/// A fully resolved configuration: every field has a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub buf_init_size: usize,
    pub dbuf_max_power: u32,
    pub slab_size: usize,
    pub slab_chunk_size: usize,
    pub slab_growth_factor: f64,
    pub slab_maxbytes: usize,
    pub slab_use_cas: bool,
    pub slab_evict_opt: EvictPolicy,
    pub slab_use_freeq: bool,
    pub slab_profile: Option<Vec<usize>>,
    pub slab_hash_power: u32,
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,
    pub eviction_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buf_init_size: 4 << 10,
            dbuf_max_power: 8,
            slab_size: 1 << 20,
            slab_chunk_size: 48,
            slab_growth_factor: 1.25,
            slab_maxbytes: 64 << 20,
            slab_use_cas: true,
            slab_evict_opt: EvictPolicy::Lru,
            slab_use_freeq: true,
            slab_profile: None,
            slab_hash_power: 16,
            server_host: "127.0.0.1".to_string(),
            server_port: 11211,
            log_level: "info".to_string(),
            eviction_seed: None,
        }
    }
}

impl Config {
    /// Max DynBuf capacity per §6: `buf_init_size << dbuf_max_power`.
    pub fn buf_max_size(&self) -> usize {
        self.buf_init_size << self.dbuf_max_power
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            slab_size: self.slab_size,
            slab_chunk_size: self.slab_chunk_size,
            slab_growth_factor: self.slab_growth_factor,
            slab_maxbytes: self.slab_maxbytes,
            slab_evict_opt: self.slab_evict_opt,
            slab_use_freeq: self.slab_use_freeq,
            slab_use_cas: self.slab_use_cas,
            slab_profile: self.slab_profile.clone(),
            slab_hash_power: self.slab_hash_power,
            eviction_seed: self.eviction_seed,
        }
    }
}

fn parse_evict_opt(s: &str) -> Result<EvictPolicy, CoreError> {
    match s {
        "none" => Ok(EvictPolicy::None),
        "random" => Ok(EvictPolicy::Random),
        "lru" => Ok(EvictPolicy::Lru),
        _ => Err(CoreError::ConfigIo {
            path: format!("slab_evict_opt = {s:?}"),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "expected one of: none, random, lru",
            ),
        }),
    }
}

/// A sparse layer of config values: every field absent means "inherit from
/// the layer below". File and CLI layers both deserialize/construct one of
/// these and fold it over a [`Config`] with [`PartialConfig::apply_over`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub buf_init_size: Option<usize>,
    pub dbuf_max_power: Option<u32>,
    pub slab_size: Option<usize>,
    pub slab_chunk_size: Option<usize>,
    pub slab_growth_factor: Option<f64>,
    pub slab_maxbytes: Option<usize>,
    pub slab_use_cas: Option<bool>,
    pub slab_evict_opt: Option<String>,
    pub slab_use_freeq: Option<bool>,
    pub slab_profile: Option<Vec<usize>>,
    pub slab_hash_power: Option<u32>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
    pub eviction_seed: Option<u64>,
}

impl PartialConfig {
    /// Reads and deserializes a TOML config file (§6).
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Folds the present fields of `self` over `base`, overriding whatever
    /// they name and leaving everything else untouched.
    pub fn apply_over(self, base: Config) -> Result<Config, CoreError> {
        let slab_evict_opt = match self.slab_evict_opt {
            Some(s) => parse_evict_opt(&s)?,
            None => base.slab_evict_opt,
        };
        Ok(Config {
            buf_init_size: self.buf_init_size.unwrap_or(base.buf_init_size),
            dbuf_max_power: self.dbuf_max_power.unwrap_or(base.dbuf_max_power),
            slab_size: self.slab_size.unwrap_or(base.slab_size),
            slab_chunk_size: self.slab_chunk_size.unwrap_or(base.slab_chunk_size),
            slab_growth_factor: self.slab_growth_factor.unwrap_or(base.slab_growth_factor),
            slab_maxbytes: self.slab_maxbytes.unwrap_or(base.slab_maxbytes),
            slab_use_cas: self.slab_use_cas.unwrap_or(base.slab_use_cas),
            slab_evict_opt,
            slab_use_freeq: self.slab_use_freeq.unwrap_or(base.slab_use_freeq),
            slab_profile: self.slab_profile.or(base.slab_profile),
            slab_hash_power: self.slab_hash_power.unwrap_or(base.slab_hash_power),
            server_host: self.server_host.unwrap_or(base.server_host),
            server_port: self.server_port.unwrap_or(base.server_port),
            log_level: self.log_level.unwrap_or(base.log_level),
            eviction_seed: self.eviction_seed.or(base.eviction_seed),
        })
    }
}

/// Resolves the final [`Config`] from an optional file layer and a CLI
/// layer, in CLI > file > default precedence.
pub fn resolve(file: Option<PartialConfig>, cli: PartialConfig) -> Result<Config, CoreError> {
    let base = match file {
        Some(f) => f.apply_over(Config::default())?,
        None => Config::default(),
    };
    cli.apply_over(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_only_when_no_layers_present() {
        let cfg = resolve(None, PartialConfig::default()).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn cli_overrides_file_overrides_default() {
        let file = PartialConfig {
            server_port: Some(22122),
            slab_evict_opt: Some("random".to_string()),
            ..Default::default()
        };
        let cli = PartialConfig {
            server_port: Some(9999),
            ..Default::default()
        };
        let cfg = resolve(Some(file), cli).unwrap();
        assert_eq!(cfg.server_port, 9999);
        assert_eq!(cfg.slab_evict_opt, EvictPolicy::Random);
        assert_eq!(cfg.server_host, Config::default().server_host);
    }

    #[test]
    fn unknown_evict_opt_is_rejected() {
        let file = PartialConfig {
            slab_evict_opt: Some("bogus".to_string()),
            ..Default::default()
        };
        assert!(resolve(Some(file), PartialConfig::default()).is_err());
    }
}
