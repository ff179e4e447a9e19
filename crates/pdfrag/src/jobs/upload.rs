//! Accepts uploaded PDF bytes, persists them and queues them for ingestion.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use uuid::Uuid;

use super::tracker::{Job, JobTracker, JobUpdate};
use crate::error::{UploadError, WorkerError};
use crate::pipeline::{IngestOutcome, PipelineError, Stage};
use crate::sanitize;
use crate::worker::{SubmitMode, Task, TaskHooks, TaskSink};

/// Forwards task lifecycle events into the job tracker.
pub struct JobHooks {
    job_id: Uuid,
    tracker: Arc<JobTracker>,
}

impl JobHooks {
    pub fn new(job_id: Uuid, tracker: Arc<JobTracker>) -> Self {
        Self { job_id, tracker }
    }
}

impl TaskHooks for JobHooks {
    fn on_start(&self, _task: &Task) {
        self.tracker.update(self.job_id, JobUpdate::Started);
    }

    fn on_progress(&self, _task: &Task, percent: u8, stage: Stage) {
        self.tracker.update(
            self.job_id,
            JobUpdate::Progress {
                percent,
                stage: stage.to_string(),
            },
        );
    }

    fn on_success(&self, _task: &Task, outcome: &IngestOutcome) {
        self.tracker.update(
            self.job_id,
            JobUpdate::Completed {
                document_id: outcome.document.id,
            },
        );
    }

    fn on_error(&self, _task: &Task, error: &PipelineError) {
        self.tracker.update(
            self.job_id,
            JobUpdate::Failed {
                error: error.to_string(),
            },
        );
    }
}

pub struct UploadManager {
    upload_dir: PathBuf,
    sink: Arc<dyn TaskSink>,
    tracker: Arc<JobTracker>,
    submit_timeout: Duration,
}

impl UploadManager {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        sink: Arc<dyn TaskSink>,
        tracker: Arc<JobTracker>,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            sink,
            tracker,
            submit_timeout,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Stores `bytes` as `<job id>_<name>` under the upload directory and
    /// submits an ingestion task for it.
    ///
    /// Waits up to the configured timeout for queue space. When the queue
    /// stays full the job is marked failed, the file is removed and
    /// [`UploadError::Busy`] is returned.
    pub fn enqueue(&self, filename: &str, bytes: &[u8]) -> Result<Job, UploadError> {
        let name = sanitize::upload_file_name(filename)
            .ok_or_else(|| UploadError::UnsupportedFile(filename.to_string()))?;
        let is_pdf = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(UploadError::UnsupportedFile(name));
        }

        fs::create_dir_all(&self.upload_dir).map_err(|source| UploadError::Write {
            path: self.upload_dir.clone(),
            source,
        })?;

        let job_id = Uuid::new_v4();
        let path = self.upload_dir.join(format!("{}_{}", job_id, name));
        fs::write(&path, bytes).map_err(|source| UploadError::Write {
            path: path.clone(),
            source,
        })?;

        let title = Path::new(&name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string();

        let mut job = Job::queued(job_id, name.clone(), title.clone());
        job.source_path = Some(path.clone());
        self.tracker.create(job.clone());

        let task = Task::new(job_id.to_string(), &path, title)
            .with_metadata("ingest_source", "upload")
            .with_metadata("original_filename", name.as_str())
            .with_hooks(Arc::new(JobHooks::new(job_id, self.tracker.clone())));

        match self
            .sink
            .submit(task, SubmitMode::Blocking(Some(self.submit_timeout)))
        {
            Ok(()) => {
                info!(
                    "Queued upload {} as job {}",
                    sanitize::redact_path(&path),
                    job_id
                );
                Ok(job)
            }
            Err(e) => {
                warn!("Could not queue upload job {}: {}", job_id, e);
                self.tracker.update(
                    job_id,
                    JobUpdate::Failed {
                        error: e.to_string(),
                    },
                );
                if let Err(rm) = fs::remove_file(&path) {
                    error!("Failed to remove rejected upload {}: {}", path.display(), rm);
                }
                match e {
                    WorkerError::QueueFull => Err(UploadError::Busy),
                    other => Err(UploadError::Submit(other)),
                }
            }
        }
    }
}
