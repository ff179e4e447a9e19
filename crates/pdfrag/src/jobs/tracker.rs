use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle: `queued -> processing -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Externally visible status of one submitted task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub filename: String,
    pub title: String,
    #[serde(rename = "status")]
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl Job {
    pub fn queued(id: Uuid, filename: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.into(),
            title: title.into(),
            state: JobState::Queued,
            progress: 0,
            stage: None,
            queued_at: now,
            updated_at: now,
            error: None,
            document_id: None,
            source_path: None,
        }
    }
}

/// A state transition requested by a worker callback.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Started,
    Progress { percent: u8, stage: String },
    Completed { document_id: i64 },
    Failed { error: String },
}

/// Jobs grouped by state, each group ordered by `queued_at`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub queue: Vec<Job>,
    pub in_progress: Vec<Job>,
    pub completed: Vec<Job>,
    pub failed: Vec<Job>,
}

impl StatusSnapshot {
    pub fn total(&self) -> usize {
        self.queue.len() + self.in_progress.len() + self.completed.len() + self.failed.len()
    }
}

/// In-memory job map guarded by a single lock.
///
/// Jobs are kept for the life of the process.
#[derive(Default)]
pub struct JobTracker {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<Uuid, Job>> {
        match self.jobs.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Job tracker lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn create(&self, job: Job) {
        self.jobs().insert(job.id, job);
    }

    /// Applies `update` to the job. Returns false when the job is unknown or
    /// already in a terminal state.
    pub fn update(&self, id: Uuid, update: JobUpdate) -> bool {
        let mut jobs = self.jobs();
        let Some(job) = jobs.get_mut(&id) else {
            warn!("Ignoring update for unknown job {}", id);
            return false;
        };
        if job.state.is_terminal() {
            warn!(
                "Ignoring {:?} for job {} already in state {:?}",
                update, id, job.state
            );
            return false;
        }

        match update {
            JobUpdate::Started => {
                job.state = JobState::Processing;
                job.progress = 5;
            }
            JobUpdate::Progress { percent, stage } => {
                job.state = JobState::Processing;
                job.progress = percent.min(100);
                job.stage = Some(stage);
            }
            JobUpdate::Completed { document_id } => {
                job.state = JobState::Completed;
                job.progress = 100;
                job.document_id = Some(document_id);
                job.error = None;
            }
            JobUpdate::Failed { error } => {
                job.state = JobState::Failed;
                job.progress = 0;
                job.error = Some(error);
            }
        }
        job.updated_at = Utc::now();
        true
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs().get(&id).cloned()
    }

    /// Copies the job map under the lock and groups it afterwards.
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut jobs: Vec<Job> = self.jobs().values().cloned().collect();
        jobs.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then(a.id.cmp(&b.id)));

        let mut snapshot = StatusSnapshot::default();
        for job in jobs {
            match job.state {
                JobState::Queued => snapshot.queue.push(job),
                JobState::Processing => snapshot.in_progress.push(job),
                JobState::Completed => snapshot.completed.push(job),
                JobState::Failed => snapshot.failed.push(job),
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked() -> (JobTracker, Uuid) {
        let tracker = JobTracker::new();
        let id = Uuid::new_v4();
        tracker.create(Job::queued(id, "report.pdf", "report"));
        (tracker, id)
    }

    #[test]
    fn test_happy_path_transitions() {
        let (tracker, id) = tracked();
        assert_eq!(tracker.get(id).unwrap().state, JobState::Queued);

        assert!(tracker.update(id, JobUpdate::Started));
        let job = tracker.get(id).unwrap();
        assert_eq!((job.state, job.progress), (JobState::Processing, 5));

        assert!(tracker.update(
            id,
            JobUpdate::Progress {
                percent: 65,
                stage: "chunked".to_string()
            }
        ));
        assert_eq!(tracker.get(id).unwrap().stage.as_deref(), Some("chunked"));

        assert!(tracker.update(id, JobUpdate::Completed { document_id: 7 }));
        let job = tracker.get(id).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.document_id, Some(7));
    }

    #[test]
    fn test_failure_resets_progress() {
        let (tracker, id) = tracked();
        tracker.update(id, JobUpdate::Started);
        tracker.update(
            id,
            JobUpdate::Failed {
                error: "boom".to_string(),
            },
        );
        let job = tracker.get(id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.progress, 0);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_terminal_states_reject_updates() {
        let (tracker, id) = tracked();
        tracker.update(id, JobUpdate::Completed { document_id: 1 });
        assert!(!tracker.update(id, JobUpdate::Started));
        assert!(!tracker.update(
            id,
            JobUpdate::Failed {
                error: "late".to_string()
            }
        ));
        assert_eq!(tracker.get(id).unwrap().state, JobState::Completed);
    }

    #[test]
    fn test_unknown_job() {
        let tracker = JobTracker::new();
        assert!(!tracker.update(Uuid::new_v4(), JobUpdate::Started));
        assert!(tracker.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_snapshot_groups_by_state() {
        let tracker = JobTracker::new();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            tracker.create(Job::queued(*id, format!("{i}.pdf"), i.to_string()));
        }
        tracker.update(ids[1], JobUpdate::Started);
        tracker.update(ids[2], JobUpdate::Completed { document_id: 3 });
        tracker.update(
            ids[3],
            JobUpdate::Failed {
                error: "x".to_string(),
            },
        );

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total(), 4);
        assert_eq!(snapshot.queue[0].id, ids[0]);
        assert_eq!(snapshot.in_progress[0].id, ids[1]);
        assert_eq!(snapshot.completed[0].id, ids[2]);
        assert_eq!(snapshot.failed[0].id, ids[3]);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["completed"][0]["status"], "completed");
        assert_eq!(json["completed"][0]["document_id"], 3);
    }
}
