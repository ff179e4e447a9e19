pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod service;
pub mod store;
pub mod worker;

pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, ConversionError, EmbeddingError, IndexError, PdfragError, Result, UploadError,
    WorkerError,
};
pub use jobs::{Job, JobState, JobTracker, StatusSnapshot, UploadManager};
pub use pipeline::{IngestOutcome, Pipeline, PipelineConfig, PipelineError, Stage};
pub use service::{DocumentLookup, IngestService, SearchHit};
pub use store::{ContentStore, DocumentRecord, FailureLedger, FailureRecord, SqliteStore};
pub use worker::{DirectoryWatcher, ScanReport, SubmitMode, Task, TaskHooks, TaskSink, WorkerPool};
