//! Configuration loading and validation
//!
//! Offerflow is configured through a TOML file that carries the engine
//! limits, the cache and watch defaults, and the source catalog.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    AdapterKind, CacheConfig, ClientConfig, Config, EngineConfig, SelectorConfig, SourceSpec,
    StorageConfig, WatchConfig,
};
pub use validation::validate;
