use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Top-level application configuration, assembled from environment variables
/// (prefix `MEMORIA`, `__` as the nesting separator) with an optional file
/// source layered underneath.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub index: IndexConfig,
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("MEMORIA")
    }

    /// Load configuration from environment variables with a custom prefix.
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("storage.backend", "memory")?
            .set_default("storage.root_path", "./data")?
            .set_default("queue.backend", "memory")?
            .set_default("queue.max_attempts", 20)?
            .set_default("queue.visibility_timeout_secs", 30)?
            .set_default("queue.retry_base_secs", 1)?
            .set_default("queue.retry_cap_secs", 300)?
            .set_default("queue.retry_jitter_factor", 0.2)?
            .set_default("index.default_index_name", "default")?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from a file, with environment overrides layered on top.
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("MEMORIA").separator("__"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    4
}

/// Backend selection for the Artifact Store and Pipeline State Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Filesystem,
}

/// Artifact/state storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_root_path")]
    pub root_path: String,
}

impl StorageConfig {
    pub fn new(backend: StorageBackend, root_path: impl Into<String>) -> Self {
        Self {
            backend,
            root_path: root_path.into(),
        }
    }
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_root_path() -> String {
    "./data".to_string()
}

/// Queue configuration, including the retry/backoff parameters mandated by
/// the error handling design (base 1s, cap 5min, jitter +/-20% by default).
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_backend")]
    pub backend: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
    #[serde(default = "default_retry_cap_secs")]
    pub retry_cap_secs: u64,
    #[serde(default = "default_retry_jitter_factor")]
    pub retry_jitter_factor: f64,
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }

    pub fn retry_cap(&self) -> Duration {
        Duration::from_secs(self.retry_cap_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
            max_attempts: default_max_attempts(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            retry_base_secs: default_retry_base_secs(),
            retry_cap_secs: default_retry_cap_secs(),
            retry_jitter_factor: default_retry_jitter_factor(),
        }
    }
}

fn default_queue_backend() -> String {
    "memory".to_string()
}

fn default_max_attempts() -> u32 {
    20
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_retry_base_secs() -> u64 {
    1
}

fn default_retry_cap_secs() -> u64 {
    300
}

fn default_retry_jitter_factor() -> f64 {
    0.2
}

/// Retrieval index configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub default_index_name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            default_index_name: default_index_name(),
        }
    }
}

fn default_index_name() -> String {
    "default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_builder() {
        let config = ServerConfig::new()
            .with_host("127.0.0.1")
            .with_port(3000)
            .with_workers(8);

        assert_eq!(config.address(), "127.0.0.1:3000");
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_queue_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_attempts, 20);
        assert_eq!(config.retry_base(), Duration::from_secs(1));
        assert_eq!(config.retry_cap(), Duration::from_secs(300));
        assert_eq!(config.retry_jitter_factor, 0.2);
    }

    #[test]
    fn test_storage_config_creation() {
        let config = StorageConfig::new(StorageBackend::Filesystem, "/var/lib/memoria");
        assert_eq!(config.backend, StorageBackend::Filesystem);
        assert_eq!(config.root_path, "/var/lib/memoria");
    }
}
