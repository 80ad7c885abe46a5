//! Top-level error type composing the crates below it (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Codec(#[from] cache_proto::CodecError),

    #[error(transparent)]
    Store(#[from] cache_store::StoreError),

    #[error("malformed TOML configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
