//! Test harness for isolated pipeline, pool and watcher tests.
//!
//! Every `TestHarness` owns a temp dir and an in-memory database, and wires a
//! pipeline from a scripted converter and a counting embedder.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pdfrag::db::Database;
use pdfrag::embedding::{Chunker, Embedding, EmbeddingBackend, HashingEmbedder};
use pdfrag::error::{ConversionError, EmbeddingError, WorkerError};
use pdfrag::index::{IndexStore, VectorIndex};
use pdfrag::pipeline::{IngestOutcome, Pipeline, PipelineError, Stage};
use pdfrag::processor::ConversionBackend;
use pdfrag::store::{ContentStore, FailureLedger, SqliteStore};
use pdfrag::worker::{
    run_task, DirectoryWatcher, SubmitMode, Task, TaskHooks, TaskSink, WatcherConfig,
};
use tempfile::TempDir;

pub const DIMENSION: usize = 32;

/// Reads files as UTF-8 text. Content starting with `FAIL` is reported as a
/// broken PDF. Counts every call.
#[derive(Default)]
pub struct ScriptedConverter {
    calls: Arc<AtomicUsize>,
}

impl ConversionBackend for ScriptedConverter {
    fn convert(&self, path: &Path) -> Result<String, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = std::fs::read_to_string(path).map_err(|source| ConversionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if text.starts_with("FAIL") {
            return Err(ConversionError::Pdf(format!("scripted failure: {}", text.trim())));
        }
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Feature-hashing embedder that counts calls and embedded texts.
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(DIMENSION).unwrap(),
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }
}

impl EmbeddingBackend for CountingEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed(texts)
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

/// Runs each submitted task on the submitting thread.
pub struct InlineSink {
    pipeline: Arc<Pipeline>,
    pub submitted: AtomicUsize,
}

impl TaskSink for InlineSink {
    fn submit(&self, task: Task, _mode: SubmitMode) -> Result<(), WorkerError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let _ = run_task(&self.pipeline, &task);
        Ok(())
    }
}

/// Records every hook call as a string.
#[derive(Default)]
pub struct EventLog {
    pub events: Mutex<Vec<String>>,
    pub percents: Mutex<Vec<u8>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.percents.lock().unwrap().clone()
    }
}

impl TaskHooks for EventLog {
    fn on_start(&self, _task: &Task) {
        self.events.lock().unwrap().push("start".to_string());
    }

    fn on_progress(&self, _task: &Task, percent: u8, stage: Stage) {
        self.percents.lock().unwrap().push(percent);
        self.events.lock().unwrap().push(stage.to_string());
    }

    fn on_success(&self, _task: &Task, outcome: &IngestOutcome) {
        self.events
            .lock()
            .unwrap()
            .push(format!("success:{}", outcome.document.id));
    }

    fn on_error(&self, _task: &Task, _error: &PipelineError) {
        self.events.lock().unwrap().push("error".to_string());
    }
}

pub struct TestHarness {
    /// Scratch directory for source files.
    pub temp_dir: TempDir,
    pub db: Database,
    pub store: Arc<SqliteStore>,
    pub index: Arc<VectorIndex>,
    pub embedder: Arc<CountingEmbedder>,
    /// Number of `convert` calls so far.
    pub conversions: Arc<AtomicUsize>,
    pub pipeline: Arc<Pipeline>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_chunking(700, 50)
    }

    pub fn with_chunking(chunk_size: usize, overlap: usize) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let store = Arc::new(SqliteStore::new(db.clone()));
        let index = Arc::new(VectorIndex::open(db.clone(), 0).unwrap());
        let embedder = Arc::new(CountingEmbedder::new());
        let converter = ScriptedConverter::default();
        let conversions = Arc::clone(&converter.calls);

        let pipeline = Arc::new(Pipeline::new(
            Box::new(converter),
            Arc::clone(&embedder) as Arc<dyn EmbeddingBackend>,
            Arc::clone(&store) as Arc<dyn ContentStore>,
            Arc::clone(&index) as Arc<dyn IndexStore>,
            Chunker::new(chunk_size, overlap).unwrap(),
        ));

        Self {
            temp_dir,
            db,
            store,
            index,
            embedder,
            conversions,
            pipeline,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `content` to `name` under the temp dir and returns the path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn conversions(&self) -> usize {
        self.conversions.load(Ordering::SeqCst)
    }

    pub fn inline_sink(&self) -> Arc<InlineSink> {
        Arc::new(InlineSink {
            pipeline: Arc::clone(&self.pipeline),
            submitted: AtomicUsize::new(0),
        })
    }

    pub fn watcher(
        &self,
        root: &Path,
        sink: Arc<dyn TaskSink>,
        max_attempts: u32,
    ) -> DirectoryWatcher {
        DirectoryWatcher::new(
            WatcherConfig {
                root: root.to_path_buf(),
                patterns: vec!["**/*.pdf".to_string()],
                poll_interval: Duration::from_millis(50),
                max_attempts,
            },
            sink,
            Arc::clone(&self.store) as Arc<dyn ContentStore>,
            Arc::clone(&self.store) as Arc<dyn FailureLedger>,
        )
        .unwrap()
    }
}

/// `n` distinct whitespace-separated words.
pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
}
