use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/pdfrag.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Defaults to `<data_dir>/uploads`.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: default_data_dir(),
            database_path: None,
            upload_dir: None,
            logging: LoggingConfig::default(),
            conversion: ConversionConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            worker: WorkerConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("pdfrag.db"))
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }

    pub fn watch_dir(&self) -> PathBuf {
        self.watch
            .directory
            .clone()
            .unwrap_or_else(|| self.data_dir.join("pdfs"))
    }

    /// Expands a leading `~/` in every configured path.
    pub fn expand_paths(&mut self) {
        self.data_dir = expand_home(&self.data_dir);
        self.database_path = self.database_path.as_deref().map(expand_home);
        self.upload_dir = self.upload_dir.as_deref().map(expand_home);
        self.watch.directory = self.watch.directory.as_deref().map(expand_home);
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) if path.to_str().is_some_and(|s| s.starts_with("~/")) => {
            match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => path.to_path_buf(),
            }
        }
        _ => path.to_path_buf(),
    }
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default = "default_conversion_backend")]
    pub backend: String,
}

fn default_conversion_backend() -> String {
    "lopdf".to_string()
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            backend: default_conversion_backend(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: String,
    /// Vector length of the local hashing backend.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

fn default_embedding_backend() -> String {
    "local".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            dimension: default_embedding_dimension(),
            openai: OpenAiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_openai_batch_size")]
    pub batch_size: usize,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_openai_timeout() -> u64 {
    60
}

fn default_openai_batch_size() -> usize {
    64
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_openai_model(),
            timeout_secs: default_openai_timeout(),
            batch_size: default_openai_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Fixed vector dimension; 0 means "take it from the first batch".
    #[serde(default)]
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    700
}

fn default_chunk_overlap() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long an upload waits for queue space before giving up.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

fn default_submit_timeout() -> u64 {
    30
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            submit_timeout_secs: default_submit_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `<data_dir>/pdfs`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    10
}

fn default_patterns() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            patterns: default_patterns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.database_path(), PathBuf::from("data/pdfrag.db"));
        assert_eq!(config.upload_dir(), PathBuf::from("data/uploads"));
        assert_eq!(config.watch_dir(), PathBuf::from("data/pdfs"));
        assert_eq!(config.chunking.chunk_size, 700);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.worker.workers, 4);
        assert_eq!(config.worker.queue_capacity, 100);
        assert_eq!(config.watch.max_attempts, 10);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.index.dimension, 0);
        assert!(config.watch.enabled);
    }

    #[test]
    fn test_derived_paths_follow_data_dir() {
        let config: Config = serde_json::from_str(r#"{"data_dir": "/srv/rag"}"#).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/srv/rag/pdfrag.db"));
        assert_eq!(config.watch_dir(), PathBuf::from("/srv/rag/pdfs"));
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home(Path::new("~/docs"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("docs"));
        }
        assert_eq!(expand_home(Path::new("/abs/~/x")), PathBuf::from("/abs/~/x"));
        assert_eq!(expand_home(Path::new("~user/x")), PathBuf::from("~user/x"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::default();
        config.embedding.openai.api_key = Some("sk-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
