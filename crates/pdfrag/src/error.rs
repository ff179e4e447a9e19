use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfragError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' for environment variable {name}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Unknown {kind} backend '{name}'")]
    UnknownBackend { kind: &'static str, name: String },
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Source file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported document format '{extension}' for {path}")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("Failed to read document '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    Pdf(String),

    #[error("No text could be extracted from {0}")]
    Empty(PathBuf),
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding configuration: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index storage failed: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Processing queue is full, try again later")]
    QueueFull,

    #[error("Worker pool has been shut down")]
    ShutDown,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Only PDF files are supported ({0})")]
    UnsupportedFile(String),

    #[error("Failed to store upload '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Processing queue is full, try again later")]
    Busy,

    #[error("Failed to submit upload: {0}")]
    Submit(#[source] WorkerError),
}

impl WorkerError {
    /// Whether the caller may retry the same submission later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::QueueFull)
    }
}

pub type Result<T> = std::result::Result<T, PdfragError>;
