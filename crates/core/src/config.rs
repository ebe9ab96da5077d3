use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Search modes accepted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Case-insensitive substring match
    Substr,
    /// Full-text match (native index when available)
    Fts,
    /// SQLite glob pattern
    Glob,
    /// Case-insensitive regular expression
    Regex,
    /// Exact text match
    Exact,
    /// Embedding similarity only
    Vector,
    /// Fuzzy string similarity only
    Fuzzy,
    /// Weighted fusion of vector, full-text and fuzzy signals (default)
    #[default]
    Hybrid,
}

impl SearchMode {
    pub const VALUES: &[SearchMode] = &[
        SearchMode::Substr,
        SearchMode::Fts,
        SearchMode::Glob,
        SearchMode::Regex,
        SearchMode::Exact,
        SearchMode::Vector,
        SearchMode::Fuzzy,
        SearchMode::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Substr => "substr",
            SearchMode::Fts => "fts",
            SearchMode::Glob => "glob",
            SearchMode::Regex => "regex",
            SearchMode::Exact => "exact",
            SearchMode::Vector => "vector",
            SearchMode::Fuzzy => "fuzzy",
            SearchMode::Hybrid => "hybrid",
        }
    }

    /// Whether this mode reads embeddings (and therefore backfills them first)
    pub fn uses_vector(&self) -> bool {
        matches!(self, SearchMode::Vector | SearchMode::Hybrid)
    }

    pub fn uses_fts(&self) -> bool {
        matches!(self, SearchMode::Fts | SearchMode::Hybrid)
    }

    pub fn uses_fuzzy(&self) -> bool {
        matches!(self, SearchMode::Fuzzy | SearchMode::Hybrid)
    }

    /// Modes answered directly by a store text predicate, without scoring signals
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            SearchMode::Substr | SearchMode::Glob | SearchMode::Regex | SearchMode::Exact
        )
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        SearchMode::VALUES
            .iter()
            .copied()
            .find(|mode| mode.as_str() == needle)
            .ok_or_else(|| Error::Config(ConfigError::InvalidSearchMode(s.to_string()).to_string()))
    }
}

/// Backing store location and capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite database file
    pub path: PathBuf,
    /// Use the native full-text index when SQLite provides one
    pub full_text: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: pocket_home().join("pocket.db"), full_text: true }
    }
}

/// Connection pool bounds and lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Connections opened eagerly when the pool starts
    pub min_connections: usize,
    /// Hard cap on tracked connections
    pub max_connections: usize,
    /// How long `acquire` waits for a free connection
    pub connection_timeout_ms: u64,
    /// Connections older than this are closed instead of reused
    pub max_connection_age_secs: u64,
    /// Idle connections older than this are closed by the reaper
    pub max_idle_secs: u64,
    /// Reaper period
    pub reap_interval_secs: u64,
    /// SQLite busy timeout applied to each connection
    pub busy_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 20,
            connection_timeout_ms: 30_000,
            max_connection_age_secs: 30 * 60,
            max_idle_secs: 5 * 60,
            reap_interval_secs: 60,
            busy_timeout_ms: 5_000,
        }
    }
}

impl PoolConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn max_connection_age(&self) -> Duration {
        Duration::from_secs(self.max_connection_age_secs)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Cache sizes and lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Keep a persistent embedding tier on disk
    pub persistent: bool,
    /// Directory for the persistent tier (defaults to `cache/` next to the store)
    pub directory: Option<PathBuf>,
    pub embedding_max_entries: usize,
    pub embedding_ttl_minutes: u64,
    pub embedding_disk_ttl_hours: u64,
    pub search_max_entries: usize,
    pub index_max_entries: usize,
    pub index_ttl_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            directory: None,
            embedding_max_entries: 512,
            embedding_ttl_minutes: 60,
            embedding_disk_ttl_hours: 24 * 7,
            search_max_entries: 1000,
            index_max_entries: 10,
            index_ttl_minutes: 30,
        }
    }
}

impl CacheConfig {
    pub fn embedding_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_ttl_minutes * 60)
    }

    pub fn embedding_disk_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_disk_ttl_hours * 3600)
    }

    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_minutes * 60)
    }

    /// Resolve the persistent tier directory for a store at `store_path`
    pub fn resolve_directory(&self, store_path: &Path) -> Option<PathBuf> {
        if !self.persistent {
            return None;
        }
        match &self.directory {
            Some(dir) => Some(dir.clone()),
            None => Some(store_path.parent().unwrap_or_else(|| Path::new(".")).join("cache")),
        }
    }
}

/// Ranking weights, thresholds and execution toggles for the search engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub default_mode: SearchMode,
    pub vector_weight: f64,
    pub fts_weight: f64,
    pub fuzzy_weight: f64,
    /// Minimum cosine similarity kept by the vector signal
    pub vector_similarity_threshold: f64,
    /// Minimum fuzzy score (0-100) kept by the fuzzy signal
    pub fuzzy_score_threshold: u8,
    /// Fused results below this total are dropped
    pub min_total_score: f64,
    pub max_results: usize,
    pub vector_top_k: usize,
    pub enable_caching: bool,
    pub cache_ttl_minutes: u64,
    pub parallel_search: bool,
    pub embedding_batch_size: usize,
    pub signal_timeout_secs: u64,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_mode: SearchMode::Hybrid,
            vector_weight: 0.4,
            fts_weight: 0.35,
            fuzzy_weight: 0.25,
            vector_similarity_threshold: 0.3,
            fuzzy_score_threshold: 50,
            min_total_score: 0.1,
            max_results: 50,
            vector_top_k: 100,
            enable_caching: true,
            cache_ttl_minutes: 10,
            parallel_search: true,
            embedding_batch_size: 32,
            signal_timeout_secs: 30,
            embedding_model: "hashing-384-v1".to_string(),
            embedding_dimension: 384,
        }
    }
}

impl SearchConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }

    pub fn signal_timeout(&self) -> Duration {
        Duration::from_secs(self.signal_timeout_secs)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, weight) in [
            ("vector_weight", self.vector_weight),
            ("fts_weight", self.fts_weight),
            ("fuzzy_weight", self.fuzzy_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidValue(format!("search.{name} must be a non-negative number")));
            }
        }
        if self.vector_weight + self.fts_weight + self.fuzzy_weight <= 0.0 {
            return Err(ConfigError::InvalidValue("at least one search weight must be positive".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.vector_similarity_threshold) {
            return Err(ConfigError::InvalidValue(
                "search.vector_similarity_threshold must be within [-1, 1]".to_string(),
            ));
        }
        if self.fuzzy_score_threshold > 100 {
            return Err(ConfigError::InvalidValue("search.fuzzy_score_threshold must be within [0, 100]".to_string()));
        }
        if !self.min_total_score.is_finite() || self.min_total_score < 0.0 {
            return Err(ConfigError::InvalidValue("search.min_total_score must be non-negative".to_string()));
        }
        if self.max_results == 0 || self.vector_top_k == 0 || self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "search.max_results, vector_top_k and embedding_batch_size must be positive".to_string(),
            ));
        }
        if self.signal_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("search.signal_timeout_secs must be positive".to_string()));
        }
        if self.embedding_model.trim().is_empty() || self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("search.embedding_model and embedding_dimension are required".to_string()));
        }
        Ok(())
    }
}

/// File logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub level: String,
    /// Log directory (defaults to `~/.pocket/logs`)
    pub directory: Option<PathBuf>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self { enabled: false, level: "debug".to_string(), directory: None }
    }
}

/// `[logging]` section as written in `pocket.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: "pretty".to_string(), file: FileLoggingConfig::default() }
    }
}

/// Root configuration structure for pocket.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).map_err(|e| Error::Config(ConfigError::from(e).to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, else `~/.pocket/pocket.toml` if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let default_path = default_config_path();
        if default_path.exists() { Self::from_file(&default_path) } else { Ok(Self::default()) }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_pool().map_err(|e| Error::Config(e.to_string()))?;
        self.search.validate().map_err(|e| Error::Config(e.to_string()))?;

        let cache = &self.cache;
        if cache.embedding_max_entries == 0 || cache.search_max_entries == 0 || cache.index_max_entries == 0 {
            return Err(Error::Config(
                ConfigError::InvalidValue("cache entry limits must be positive".to_string()).to_string(),
            ));
        }

        Ok(())
    }

    fn validate_pool(&self) -> std::result::Result<(), ConfigError> {
        let pool = &self.pool;
        if pool.max_connections == 0 {
            return Err(ConfigError::InvalidValue("pool.max_connections must be at least 1".to_string()));
        }
        if pool.min_connections > pool.max_connections {
            return Err(ConfigError::InvalidValue(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                pool.min_connections, pool.max_connections
            )));
        }
        if pool.connection_timeout_ms == 0 || pool.reap_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "pool.connection_timeout_ms and pool.reap_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get example configuration (as a string)
    pub fn example() -> &'static str {
        r#"# Pocket Configuration Example
# Copy this file to ~/.pocket/pocket.toml and customize as needed

[store]
path = "/home/me/.pocket/pocket.db"
# Use SQLite FTS5 when available; false forces the substring fallback
full_text = true

[pool]
min_connections = 2
max_connections = 20
connection_timeout_ms = 30000
max_connection_age_secs = 1800
max_idle_secs = 300
reap_interval_secs = 60
busy_timeout_ms = 5000

[cache]
# Persist embeddings between runs (directory defaults to cache/ next to the store)
persistent = true
embedding_max_entries = 512
embedding_ttl_minutes = 60
embedding_disk_ttl_hours = 168
search_max_entries = 1000
index_max_entries = 10
index_ttl_minutes = 30

[search]
# One of: substr, fts, glob, regex, exact, vector, fuzzy, hybrid
default_mode = "hybrid"
vector_weight = 0.4
fts_weight = 0.35
fuzzy_weight = 0.25
vector_similarity_threshold = 0.3
fuzzy_score_threshold = 50
min_total_score = 0.1
max_results = 50
vector_top_k = 100
enable_caching = true
cache_ttl_minutes = 10
parallel_search = true
embedding_batch_size = 32
signal_timeout_secs = 30

[logging]
level = "warn"
format = "pretty"

[logging.file]
enabled = false
level = "debug"
"#
    }
}

/// Root directory for pocket state (`$HOME/.pocket`, or `.pocket` when no home is set)
pub fn pocket_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".pocket"))
        .unwrap_or_else(|_| PathBuf::from(".pocket"))
}

pub fn default_config_path() -> PathBuf {
    pocket_home().join("pocket.toml")
}

/// Configuration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid search mode
    #[error("invalid search mode: {0}")]
    InvalidSearchMode(String),

    /// Out-of-range or inconsistent value
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlParse(err.to_string())
    }
}
