pub mod config;
pub mod error;
pub mod logging;
pub mod record;

pub use config::{
    CacheConfig, Config, ConfigError, FileLoggingConfig, PoolConfig, SearchConfig, SearchMode, StoreConfig,
};
pub use error::{Error, Result};
pub use record::{Record, normalize_tag, normalize_tags};
