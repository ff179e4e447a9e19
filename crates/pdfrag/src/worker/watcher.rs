//! Polling directory watcher.
//!
//! Each poll walks the watch root, skips files that are already ingested,
//! blacklisted or still in flight, and submits the rest without blocking.
//! Task outcomes feed the failure ledger through [`WatcherHooks`].

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use glob::{MatchOptions, Pattern};
use log::{debug, error, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{ConfigError, WorkerError};
use crate::pipeline::{IngestOutcome, PipelineError, Stage};
use crate::store::{ContentStore, FailureLedger};
use crate::worker::pool::{SubmitMode, TaskSink};
use crate::worker::task::{panic_message, Task, TaskHooks};

const SLEEP_SLICE: Duration = Duration::from_millis(200);

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub root: PathBuf,
    pub patterns: Vec<String>,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl WatcherConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.watch_dir(),
            patterns: config.watch.patterns.clone(),
            poll_interval: Duration::from_secs(config.watch.poll_interval_secs.max(1)),
            max_attempts: config.watch.max_attempts,
        }
    }
}

/// Counters for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Files matching the patterns.
    pub discovered: usize,
    pub submitted: usize,
    pub skipped_ingested: usize,
    pub skipped_blacklisted: usize,
    pub skipped_in_flight: usize,
    /// Files left for the next poll because the queue was full.
    pub deferred: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    size: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Default)]
struct WatchState {
    in_flight: HashSet<PathBuf>,
    /// Paths whose watcher task succeeded, with the file stamp at the time.
    settled: HashMap<PathBuf, FileStamp>,
}

type SharedState = Arc<Mutex<WatchState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, WatchState> {
    match state.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            warn!("Watcher state lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub struct DirectoryWatcher {
    config: WatcherConfig,
    patterns: Vec<Pattern>,
    sink: Arc<dyn TaskSink>,
    store: Arc<dyn ContentStore>,
    ledger: Arc<dyn FailureLedger>,
    state: SharedState,
}

impl DirectoryWatcher {
    pub fn new(
        config: WatcherConfig,
        sink: Arc<dyn TaskSink>,
        store: Arc<dyn ContentStore>,
        ledger: Arc<dyn FailureLedger>,
    ) -> Result<Self, ConfigError> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| ConfigError::Validation {
                    message: format!("Invalid watch pattern '{}': {}", p, e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            patterns,
            sink,
            store,
            ledger,
            state: Arc::new(Mutex::new(WatchState::default())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Walks the root once and submits every eligible file.
    pub fn scan_once(&self) -> ScanReport {
        let mut report = ScanReport::default();
        let root = &self.config.root;

        if !root.is_dir() {
            debug!("Watch root {} does not exist yet", root.display());
            lock(&self.state).settled.clear();
            return report;
        }

        let mut seen = HashSet::new();
        let mut complete = true;
        for entry in WalkDir::new(root).into_iter() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Watcher: failed to read entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.matches(root, entry.path()) {
                continue;
            }
            report.discovered += 1;

            let path = match entry.path().canonicalize() {
                Ok(p) => p,
                Err(e) => {
                    debug!("Watcher: {} vanished during scan: {}", entry.path().display(), e);
                    continue;
                }
            };

            let result = self.submit_if_eligible(&path, &mut report);
            seen.insert(path);
            match result {
                Ok(()) => {}
                Err(WorkerError::QueueFull) => {
                    warn!("Processing queue full, deferring remaining files");
                    report.deferred += 1;
                    complete = false;
                    break;
                }
                Err(e) => {
                    warn!("Watcher: cannot submit files under {}: {}", root.display(), e);
                    complete = false;
                    break;
                }
            }
        }

        // Only a full walk proves that a settled path is gone.
        if complete {
            lock(&self.state)
                .settled
                .retain(|path, _| seen.contains(path));
        }

        if report.submitted > 0 || report.deferred > 0 {
            info!(
                "Watcher scan: {} discovered, {} submitted, {} deferred",
                report.discovered, report.submitted, report.deferred
            );
        }
        report
    }

    fn matches(&self, root: &Path, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(relative, MATCH_OPTIONS))
    }

    fn submit_if_eligible(&self, path: &Path, report: &mut ScanReport) -> Result<(), WorkerError> {
        let stamp = FileStamp::of(path);
        {
            let mut state = lock(&self.state);
            if state.in_flight.contains(path) {
                report.skipped_in_flight += 1;
                return Ok(());
            }
            match (state.settled.get(path), stamp) {
                (Some(settled), Some(current)) if *settled == current => {
                    report.skipped_ingested += 1;
                    return Ok(());
                }
                (Some(_), _) => {
                    state.settled.remove(path);
                }
                (None, _) => {}
            }
        }

        let key = path.display().to_string();
        match self.store.get_by_source_path(&key) {
            Ok(Some(_)) => {
                report.skipped_ingested += 1;
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                error!("Watcher: failed to query store for {}: {}", key, e);
                return Ok(());
            }
        }

        match self.ledger.is_blacklisted(&key) {
            Ok(true) => {
                debug!("Skipping blacklisted file {}", key);
                report.skipped_blacklisted += 1;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                error!("Watcher: failed to check blacklist for {}: {}", key, e);
                return Ok(());
            }
        }

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| key.clone());
        let hooks = Arc::new(WatcherHooks {
            path: path.to_path_buf(),
            stamp,
            max_attempts: self.config.max_attempts,
            ledger: Arc::clone(&self.ledger),
            state: Arc::clone(&self.state),
        });
        let task = Task::new(format!("watcher:{}", key), path, title)
            .with_metadata("ingest_source", "watcher")
            .with_hooks(hooks);

        // Mark before submitting: the task may finish before submit returns.
        lock(&self.state).in_flight.insert(path.to_path_buf());
        match self.sink.submit(task, SubmitMode::NonBlocking) {
            Ok(()) => {
                debug!("Watcher: queued {}", key);
                report.submitted += 1;
                Ok(())
            }
            Err(e) => {
                lock(&self.state).in_flight.remove(path);
                Err(e)
            }
        }
    }

    /// Spawns the `pdf-watcher` thread. It scans, sleeps for the poll
    /// interval and repeats until `shutdown` is set.
    pub fn start(self: Arc<Self>, shutdown: Arc<AtomicBool>) -> Result<JoinHandle<()>, WorkerError> {
        info!("Watching directory: {}", self.config.root.display());
        thread::Builder::new()
            .name("pdf-watcher".to_string())
            .spawn(move || self.run(&shutdown))
            .map_err(WorkerError::SpawnFailed)
    }

    fn run(&self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.scan_once())) {
                error!("Watcher scan panicked: {}", panic_message(panic.as_ref()));
            }

            let wake_at = Instant::now() + self.config.poll_interval;
            while !shutdown.load(Ordering::Relaxed) {
                let now = Instant::now();
                if now >= wake_at {
                    break;
                }
                thread::sleep(SLEEP_SLICE.min(wake_at - now));
            }
        }
        info!("Watch mode shutting down...");
    }
}

/// Ledger bookkeeping for one watcher task.
pub struct WatcherHooks {
    path: PathBuf,
    stamp: Option<FileStamp>,
    max_attempts: u32,
    ledger: Arc<dyn FailureLedger>,
    state: SharedState,
}

impl WatcherHooks {
    fn key(&self) -> String {
        self.path.display().to_string()
    }
}

impl TaskHooks for WatcherHooks {
    fn on_start(&self, _task: &Task) {
        debug!("Watcher: processing {}", self.key());
    }

    fn on_progress(&self, _task: &Task, percent: u8, stage: Stage) {
        debug!("Watcher: {} progress {}% at {}", self.key(), percent, stage);
    }

    fn on_success(&self, _task: &Task, outcome: &IngestOutcome) {
        let key = self.key();
        if let Err(e) = self.ledger.clear_failures(&key) {
            error!("Watcher: failed to clear failure state for {}: {}", key, e);
        }

        let mut state = lock(&self.state);
        state.in_flight.remove(&self.path);
        if let Some(stamp) = self.stamp {
            state.settled.insert(self.path.clone(), stamp);
        }
        drop(state);

        info!(
            "Watcher: processed {} -> document {}{}",
            key,
            outcome.document.id,
            if outcome.duplicate { " (duplicate)" } else { "" }
        );
    }

    fn on_error(&self, _task: &Task, error: &PipelineError) {
        let key = self.key();
        if let Err(e) = self
            .ledger
            .record_failure(&key, &error.to_string(), self.max_attempts)
        {
            error!("Watcher: failed to record failure for {}: {}", key, e);
        }
        lock(&self.state).in_flight.remove(&self.path);
    }
}
