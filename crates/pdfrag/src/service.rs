//! Wires the database, pipeline, worker pool, watcher and upload entry
//! point into one handle used by the CLI and by embedders of the library.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{Database, DatabaseError};
use crate::error::{Result, UploadError};
use crate::jobs::{Job, JobTracker, StatusSnapshot, UploadManager};
use crate::pipeline::{IngestOutcome, Pipeline, PipelineConfig, PipelineError};
use crate::sanitize;
use crate::store::{
    ContentStore, DocumentRecord, FailureLedger, FailureRecord, Metadata, SqliteStore,
};
use crate::worker::{
    run_task, DirectoryWatcher, Task, TaskSink, WatcherConfig, WorkerPool,
};

/// How [`IngestService::fetch_text`] finds a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLookup {
    Id(i64),
    Title(String),
}

/// One search result with its document title attached.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: i64,
    pub title: String,
    pub chunk_index: u32,
    pub similarity: f32,
    pub text: String,
}

pub struct IngestService {
    config: Config,
    ledger: Arc<SqliteStore>,
    pipeline: Arc<Pipeline>,
    pool: Arc<WorkerPool>,
    uploads: UploadManager,
    shutdown: Arc<AtomicBool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl IngestService {
    /// Opens the database at the configured path and builds the pipeline
    /// and worker pool. Does not start the watcher.
    pub fn new(config: Config) -> Result<Self> {
        let pipeline_config = PipelineConfig::from_config(&config)?;
        let db = Database::open(&config.database_path())?;
        let pipeline = Pipeline::from_config(&pipeline_config, db.clone())?;
        Self::with_pipeline(config, db, Arc::new(pipeline))
    }

    /// Builds the service around an existing pipeline. `db` backs the
    /// failure ledger and should be the database the pipeline writes to.
    pub fn with_pipeline(config: Config, db: Database, pipeline: Arc<Pipeline>) -> Result<Self> {
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&pipeline),
            config.worker.workers,
            config.worker.queue_capacity,
        )?);
        let uploads = UploadManager::new(
            config.upload_dir(),
            Arc::clone(&pool) as Arc<dyn TaskSink>,
            Arc::new(JobTracker::new()),
            Duration::from_secs(config.worker.submit_timeout_secs),
        );

        Ok(Self {
            config,
            ledger: Arc::new(SqliteStore::new(db)),
            pipeline,
            pool,
            uploads,
            shutdown: Arc::new(AtomicBool::new(false)),
            watcher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        self.uploads.tracker()
    }

    /// Runs the pipeline on the calling thread.
    ///
    /// The title defaults to the file stem. A success also clears any
    /// failure state the watcher recorded for the same path.
    pub fn process_file(
        &self,
        path: &Path,
        title: Option<&str>,
        metadata: Metadata,
    ) -> std::result::Result<IngestOutcome, PipelineError> {
        let title = title
            .map(str::to_string)
            .unwrap_or_else(|| default_title(path));
        let mut task = Task::new(format!("sync:{}", sanitize::path_digest(path)), path, title)
            .with_metadata_map(metadata);
        task.metadata
            .entry("ingest_source".to_string())
            .or_insert_with(|| "cli".into());

        let outcome = run_task(&self.pipeline, &task)?;

        let key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
        if let Err(e) = self.ledger.clear_failures(&key) {
            error!("Failed to clear failure state for {}: {}", key, e);
        }
        Ok(outcome)
    }

    /// Stores an uploaded PDF and queues it. See [`UploadManager::enqueue`].
    pub fn upload(&self, filename: &str, bytes: &[u8]) -> std::result::Result<Job, UploadError> {
        self.uploads.enqueue(filename, bytes)
    }

    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.tracker().get(id)
    }

    pub fn jobs(&self) -> StatusSnapshot {
        self.tracker().snapshot()
    }

    /// Polls until every job in `ids` is completed or failed, or until
    /// `timeout` elapses. Returns the final snapshot either way.
    pub fn wait_for_jobs(&self, ids: &[Uuid], timeout: Option<Duration>) -> StatusSnapshot {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let pending = ids.iter().any(|id| {
                self.tracker()
                    .get(*id)
                    .is_some_and(|job| !job.state.is_terminal())
            });
            if !pending || deadline.is_some_and(|d| Instant::now() >= d) {
                return self.jobs();
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    /// Embeds `query` and returns the `top_k` most similar chunks.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedder = self.pipeline.embedder();
        let Some(query_embedding) = embedder.embed(&[query.to_string()])?.into_iter().next()
        else {
            return Ok(Vec::new());
        };

        let matches = self.pipeline.index().search(&query_embedding.vector, top_k)?;
        let store: Arc<dyn ContentStore> = self.pipeline.store();
        let mut hits = Vec::with_capacity(matches.len());
        for m in matches {
            let title = store
                .get_by_id(m.document_id)?
                .map(|doc| doc.title)
                .unwrap_or_else(|| "Unknown".to_string());
            hits.push(SearchHit {
                document_id: m.document_id,
                title,
                chunk_index: m.chunk_index,
                similarity: m.similarity,
                text: m.text,
            });
        }
        Ok(hits)
    }

    pub fn fetch_text(
        &self,
        lookup: &DocumentLookup,
    ) -> std::result::Result<Option<DocumentRecord>, DatabaseError> {
        let store: Arc<dyn ContentStore> = self.pipeline.store();
        match lookup {
            DocumentLookup::Id(id) => store.get_by_id(*id),
            DocumentLookup::Title(title) => store.get_by_title(title),
        }
    }

    pub fn documents(
        &self,
        limit: u32,
        offset: u32,
    ) -> std::result::Result<Vec<DocumentRecord>, DatabaseError> {
        self.pipeline.store().list(limit, offset)
    }

    pub fn failures(&self) -> std::result::Result<Vec<FailureRecord>, DatabaseError> {
        self.ledger.list_failures()
    }

    /// Resets the failure count for `path`, which also lifts a blacklist.
    pub fn clear_failure(&self, path: &Path) -> std::result::Result<bool, DatabaseError> {
        let key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
        self.ledger.clear_failures(&key)
    }

    /// Builds a watcher feeding this service's pool without starting it.
    pub fn watcher(&self) -> Result<DirectoryWatcher> {
        let watcher = DirectoryWatcher::new(
            WatcherConfig::from_config(&self.config),
            Arc::clone(&self.pool) as Arc<dyn TaskSink>,
            self.pipeline.store(),
            Arc::clone(&self.ledger) as Arc<dyn FailureLedger>,
        )?;
        Ok(watcher)
    }

    /// Starts the watcher thread when watching is enabled. Returns whether a
    /// watcher is running afterwards.
    pub fn start_watcher(&self) -> Result<bool> {
        if !self.config.watch.enabled {
            info!("Watch mode disabled");
            return Ok(false);
        }

        let mut slot = match self.watcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Watcher handle lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        if slot.is_some() {
            return Ok(true);
        }

        let watcher = Arc::new(self.watcher()?);
        let handle = watcher.start(Arc::clone(&self.shutdown))?;
        *slot = Some(handle);
        Ok(true)
    }

    /// Stops the watcher and the pool. With `wait`, blocks until queued
    /// tasks have drained and every thread has exited.
    pub fn shutdown(&self, wait: bool) {
        self.shutdown.store(true, Ordering::Relaxed);

        let handle = match self.watcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Watcher thread panicked");
            }
        }

        self.pool.shutdown(wait);
    }
}

impl Drop for IngestService {
    fn drop(&mut self) {
        if !self.pool.is_shutdown() {
            self.shutdown(false);
        }
    }
}

fn default_title(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobState;
    use crate::processor::pdf::build_pdf;
    use tempfile::TempDir;

    fn service(temp_dir: &TempDir) -> IngestService {
        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("data");
        config.embedding.dimension = 32;
        config.watch.enabled = false;
        config.worker.workers = 2;
        config.worker.queue_capacity = 4;
        config.chunking.chunk_size = 20;
        config.chunking.chunk_overlap = 5;
        IngestService::new(config).unwrap()
    }

    fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, build_pdf(pages)).unwrap();
        path
    }

    #[test]
    fn test_process_file_inline_then_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let first = write_pdf(temp_dir.path(), "alpha.pdf", &["Rust ownership and borrowing"]);
        let copy = write_pdf(temp_dir.path(), "copy.pdf", &["Rust ownership and borrowing"]);

        let outcome = service.process_file(&first, None, Metadata::new()).unwrap();
        assert!(!outcome.duplicate);
        assert_eq!(outcome.document.title, "alpha");
        assert_eq!(outcome.document.ingest_source.as_deref(), Some("cli"));
        assert_eq!(outcome.chunks, 1);

        let again = service
            .process_file(&copy, Some("Copy"), Metadata::new())
            .unwrap();
        assert!(again.duplicate);
        assert_eq!(again.document.id, outcome.document.id);
        assert_eq!(service.documents(10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_process_file_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let err = service
            .process_file(&temp_dir.path().join("gone.pdf"), None, Metadata::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound(_)));
    }

    #[test]
    fn test_inline_success_clears_watcher_failures() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let path = write_pdf(temp_dir.path(), "flaky.pdf", &["recovered content"]);
        let key = path.canonicalize().unwrap().display().to_string();

        service.ledger.record_failure(&key, "boom", 1).unwrap();
        assert!(service.ledger.is_blacklisted(&key).unwrap());

        service.process_file(&path, None, Metadata::new()).unwrap();
        assert!(!service.ledger.is_blacklisted(&key).unwrap());
        assert!(service.failures().unwrap().is_empty());
    }

    #[test]
    fn test_clear_failure() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let path = write_pdf(temp_dir.path(), "bad.pdf", &["x"]);
        let key = path.canonicalize().unwrap().display().to_string();
        service.ledger.record_failure(&key, "boom", 10).unwrap();

        assert!(service.clear_failure(&path).unwrap());
        assert!(!service.clear_failure(&path).unwrap());
    }

    #[test]
    fn test_search_attaches_titles() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let rust = write_pdf(temp_dir.path(), "rust.pdf", &["borrow checker lifetimes ownership"]);
        let cooking = write_pdf(temp_dir.path(), "cooking.pdf", &["flour butter sugar oven"]);
        service.process_file(&rust, Some("Rust Notes"), Metadata::new()).unwrap();
        service.process_file(&cooking, Some("Recipes"), Metadata::new()).unwrap();

        let hits = service.search("ownership lifetimes", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Rust Notes");
        assert!(hits[0].similarity > 0.0);

        assert!(service.search("   ", 5).unwrap().is_empty());
        assert!(service.search("flour", 0).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_text_by_id_and_title() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let path = write_pdf(temp_dir.path(), "memo.pdf", &["Quarterly memo"]);
        let outcome = service.process_file(&path, None, Metadata::new()).unwrap();

        let by_id = service
            .fetch_text(&DocumentLookup::Id(outcome.document.id))
            .unwrap()
            .unwrap();
        assert!(by_id.text.contains("Quarterly memo"));
        let by_title = service
            .fetch_text(&DocumentLookup::Title("memo".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(by_title.id, outcome.document.id);
        assert!(service.fetch_text(&DocumentLookup::Id(999)).unwrap().is_none());
    }

    #[test]
    fn test_upload_runs_on_pool() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);

        let job = service
            .upload("report.pdf", &build_pdf(&["Uploaded report body"]))
            .unwrap();
        let snapshot = service.wait_for_jobs(&[job.id], Some(Duration::from_secs(10)));
        assert_eq!(snapshot.completed.len(), 1);

        let done = service.job(job.id).unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.progress, 100);
        let doc = service
            .fetch_text(&DocumentLookup::Id(done.document_id.unwrap()))
            .unwrap()
            .unwrap();
        assert_eq!(doc.title, "report");
        assert_eq!(doc.ingest_source.as_deref(), Some("upload"));
        assert_eq!(doc.metadata["original_filename"], "report.pdf");

        service.shutdown(true);
        assert!(service.pool().is_shutdown());
    }

    #[test]
    fn test_upload_failure_marks_job_failed() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);

        let job = service.upload("broken.pdf", b"not a pdf").unwrap();
        service.wait_for_jobs(&[job.id], Some(Duration::from_secs(10)));

        let failed = service.job(job.id).unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.progress, 0);
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_watcher_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        assert!(!service.start_watcher().unwrap());
        service.shutdown(true);
    }
}
