use crate::storage::{self, StorageManager};
use homedir::my_home;
use serde::{Deserialize, Serialize};

/// Default embedding model. Matches the 384-dimensional MiniLM family the
/// stored vectors were originally built with; changing the model invalidates
/// vectors.bin (the store detects this via the model id hash and starts
/// fresh).
const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
/// Default number of results returned by similarity search
const DEFAULT_SEARCH_LIMIT: usize = 3;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
/// Default daemon bind address
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Configuration for the embedding / similarity search subsystem
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g. "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Default number of results for similarity search
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            default_limit: DEFAULT_SEARCH_LIMIT,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Address the daemon listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            embedding: EmbeddingConfig::default(),
            base_path: String::new(),
        }
    }
}

/// Resolve the data directory: SEMTASK_BASE_PATH if set, otherwise
/// ~/.local/share/semtask.
pub fn base_path() -> String {
    std::env::var("SEMTASK_BASE_PATH").unwrap_or(format!(
        "{}/.local/share/semtask",
        my_home()
            .expect("couldnt find home dir")
            .expect("couldnt find home dir")
            .to_string_lossy()
    ))
}

impl Config {
    /// Validated once at startup; invalid values are a config file bug the
    /// user has to fix, so we bail loudly instead of limping on.
    fn validate(&mut self) {
        if self.embedding.model.trim().is_empty() {
            panic!("embedding.model must not be empty");
        }

        if self.embedding.default_limit == 0 {
            self.embedding.default_limit = DEFAULT_SEARCH_LIMIT;
        }

        if self.embedding.download_timeout_secs == 0 {
            panic!("embedding.download_timeout_secs must be greater than 0");
        }

        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            panic!("bind_addr '{}' is not a valid socket address", self.bind_addr);
        }
    }

    pub fn load() -> Self {
        Self::load_with(&base_path())
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = storage::BackendLocal::new(base_path).expect("couldnt create data directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            let _ = store.write(
                "config.yaml",
                serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
            );
        }

        let config_str =
            String::from_utf8(store.read("config.yaml").expect("couldnt read config file"))
                .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();
        config.validate();

        config
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[cfg(test)]
    pub fn for_tests(base_path: &str) -> Self {
        let mut config = Self::default();
        config.base_path = base_path.to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
        assert_eq!(config.embedding.default_limit, 3);
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
    }

    #[test]
    fn test_load_creates_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let config = Config::load_with(base);
        assert_eq!(config.base_path(), base);
        assert!(dir.path().join("config.yaml").is_file());
    }

    #[test]
    fn test_load_reads_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "bind_addr: 127.0.0.1:9000\nembedding:\n  model: bge-small-en-v1.5\n",
        )
        .unwrap();

        let config = Config::load_with(base);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.embedding.model, "bge-small-en-v1.5");
        // unspecified fields fall back to defaults
        assert_eq!(config.embedding.default_limit, 3);
    }

    #[test]
    fn test_zero_limit_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "embedding:\n  default_limit: 0\n",
        )
        .unwrap();

        let config = Config::load_with(base);
        assert_eq!(config.embedding.default_limit, 3);
    }

    #[test]
    #[should_panic(expected = "bind_addr")]
    fn test_invalid_bind_addr_panics() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "bind_addr: not-an-addr\n").unwrap();

        let _ = Config::load_with(base);
    }
}
