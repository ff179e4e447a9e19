use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{Config, LogFormat, CONFIG_VERSION};
use crate::embedding::EmbeddingKind;
use crate::error::ConfigError;
use crate::processor::ConverterKind;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Loads the configuration file, applies environment overrides and validates
/// the result.
///
/// A missing file (or no path at all) yields the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            parse_config(&content)?
        }
        Some(path) => {
            log::info!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Config::default()
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.expand_paths();
    validate_config(&config)?;

    Ok(config)
}

/// Parses and validates a configuration document without consulting the
/// environment.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config = parse_config(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;
    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Overrides config values from environment variables.
///
/// `lookup` is `std::env::var` in production; tests pass a map. Empty values
/// are ignored, unparseable ones are an error.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("DATA_DIR") {
        config.data_dir = PathBuf::from(v);
    }
    if let Some(v) = get("DATABASE_PATH") {
        config.database_path = Some(PathBuf::from(v));
    }
    if let Some(v) = get("UPLOAD_DIR") {
        config.upload_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("LOG_LEVEL") {
        config.logging.level = v.trim().to_ascii_lowercase();
    }
    if let Some(v) = get("LOG_FORMAT") {
        config.logging.format = match v.trim().to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => return Err(invalid_env("LOG_FORMAT", &v, "expected 'pretty' or 'json'")),
        };
    }
    if let Some(v) = get("PDF_PARSER") {
        config.conversion.backend = v;
    }
    if let Some(v) = get("EMBEDDING_BACKEND") {
        config.embedding.backend = v;
    }
    if let Some(v) = get("EMBEDDING_DIMENSION") {
        config.embedding.dimension = parse_env("EMBEDDING_DIMENSION", &v)?;
    }
    if let Some(v) = get("OPENAI_BASE_URL") {
        config.embedding.openai.base_url = v;
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        config.embedding.openai.api_key = Some(v);
    }
    if let Some(v) = get("OPENAI_MODEL") {
        config.embedding.openai.model = v;
    }
    if let Some(v) = get("WATCH_ENABLED") {
        config.watch.enabled = parse_bool("WATCH_ENABLED", &v)?;
    }
    if let Some(v) = get("WATCH_DIR") {
        config.watch.directory = Some(PathBuf::from(v));
    }
    if let Some(v) = get("WATCH_POLL_INTERVAL") {
        config.watch.poll_interval_secs = parse_env("WATCH_POLL_INTERVAL", &v)?;
    }
    if let Some(v) = get("MAX_PROCESS_ATTEMPTS") {
        config.watch.max_attempts = parse_env("MAX_PROCESS_ATTEMPTS", &v)?;
    }
    if let Some(v) = get("PROCESS_WORKERS") {
        config.worker.workers = parse_env("PROCESS_WORKERS", &v)?;
    }
    if let Some(v) = get("PROCESS_QUEUE_MAXSIZE") {
        config.worker.queue_capacity = parse_env("PROCESS_QUEUE_MAXSIZE", &v)?;
    }
    if let Some(v) = get("CHUNK_SIZE") {
        config.chunking.chunk_size = parse_env("CHUNK_SIZE", &v)?;
    }
    if let Some(v) = get("CHUNK_OVERLAP") {
        config.chunking.chunk_overlap = parse_env("CHUNK_OVERLAP", &v)?;
    }

    Ok(())
}

fn parse_env<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid_env(name, value, &e.to_string()))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid_env(name, value, "expected a boolean")),
    }
}

fn invalid_env(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Semantic checks the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let chunking = &config.chunking;
    if chunking.chunk_size == 0 {
        return Err(validation("chunking.chunk_size must be greater than 0"));
    }
    if chunking.chunk_overlap >= chunking.chunk_size {
        return Err(ConfigError::Validation {
            message: format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            ),
        });
    }

    if config.worker.workers == 0 {
        return Err(validation("worker.workers must be greater than 0"));
    }
    if config.worker.queue_capacity == 0 {
        return Err(validation("worker.queue_capacity must be greater than 0"));
    }
    if config.watch.max_attempts == 0 {
        return Err(validation("watch.max_attempts must be greater than 0"));
    }
    if config.watch.poll_interval_secs == 0 {
        return Err(validation("watch.poll_interval_secs must be greater than 0"));
    }
    if config.watch.patterns.is_empty() {
        return Err(validation("watch.patterns must not be empty"));
    }
    for pattern in &config.watch.patterns {
        if let Err(e) = glob::Pattern::new(pattern) {
            return Err(ConfigError::Validation {
                message: format!("Invalid watch pattern '{}': {}", pattern, e),
            });
        }
    }

    ConverterKind::from_str(&config.conversion.backend)?;
    let embedder = EmbeddingKind::from_str(&config.embedding.backend)?;
    match embedder {
        EmbeddingKind::Local if config.embedding.dimension == 0 => {
            return Err(validation("embedding.dimension must be greater than 0"));
        }
        EmbeddingKind::OpenAi => {
            let has_key = config
                .embedding
                .openai
                .api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty());
            if !has_key {
                return Err(validation(
                    "the openai embedding backend requires an API key (OPENAI_API_KEY)",
                ));
            }
        }
        _ => {}
    }

    Ok(())
}

fn validation(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}
