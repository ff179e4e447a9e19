use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::{IngestOutcome, PipelineError, ProgressReporter, Stage};
use crate::store::Metadata;

/// Observer callbacks for one task.
///
/// All methods default to no-ops. A panic inside a hook is caught and
/// logged; it never changes the task outcome or kills the worker.
pub trait TaskHooks: Send + Sync {
    fn on_start(&self, _task: &Task) {}

    fn on_progress(&self, _task: &Task, _percent: u8, _stage: Stage) {}

    fn on_success(&self, _task: &Task, _outcome: &IngestOutcome) {}

    fn on_error(&self, _task: &Task, _error: &PipelineError) {}
}

/// One unit of ingestion work.
#[derive(Clone)]
pub struct Task {
    pub id: String,
    pub source_path: PathBuf,
    pub title: String,
    pub metadata: Metadata,
    hooks: Option<Arc<dyn TaskHooks>>,
}

impl Task {
    pub fn new(id: impl Into<String>, source_path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_path: source_path.into(),
            title: title.into(),
            metadata: Metadata::new(),
            hooks: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn TaskHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn has_hooks(&self) -> bool {
        self.hooks.is_some()
    }

    pub(crate) fn notify_start(&self) {
        self.call_hook("on_start", |h| h.on_start(self));
    }

    pub(crate) fn notify_progress(&self, percent: u8, stage: Stage) {
        self.call_hook("on_progress", |h| h.on_progress(self, percent, stage));
    }

    pub(crate) fn notify_success(&self, outcome: &IngestOutcome) {
        self.call_hook("on_success", |h| h.on_success(self, outcome));
    }

    pub(crate) fn notify_error(&self, error: &PipelineError) {
        self.call_hook("on_error", |h| h.on_error(self, error));
    }

    fn call_hook<F>(&self, name: &str, f: F)
    where
        F: FnOnce(&dyn TaskHooks),
    {
        let Some(hooks) = self.hooks.as_deref() else {
            return;
        };
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(hooks))) {
            log::error!(
                "Hook {} panicked for task {}: {}",
                name,
                self.id,
                panic_message(panic.as_ref())
            );
        }
    }
}

impl ProgressReporter for Task {
    fn report(&self, percent: u8, stage: Stage) {
        self.notify_progress(percent, stage);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("source_path", &self.source_path)
            .field("title", &self.title)
            .field("metadata", &self.metadata)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl TaskHooks for Recorder {
        fn on_start(&self, task: &Task) {
            self.events.lock().unwrap().push(format!("start:{}", task.id));
        }

        fn on_progress(&self, _task: &Task, percent: u8, stage: Stage) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:{}", stage, percent));
        }
    }

    struct Panicky;

    impl TaskHooks for Panicky {
        fn on_start(&self, _task: &Task) {
            panic!("hook exploded");
        }
    }

    #[test]
    fn test_hooks_receive_events() {
        let recorder = Arc::new(Recorder::default());
        let task = Task::new("t1", "/tmp/a.pdf", "a").with_hooks(recorder.clone());

        task.notify_start();
        task.report(15, Stage::Metadata);

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start:t1", "metadata:15"]);
    }

    #[test]
    fn test_hook_panic_is_contained() {
        let task = Task::new("t2", "/tmp/a.pdf", "a").with_hooks(Arc::new(Panicky));
        task.notify_start();
        // Default methods still work after a panic in another hook.
        task.notify_progress(45, Stage::Parsed);
    }

    #[test]
    fn test_task_without_hooks() {
        let task = Task::new("t3", "/tmp/a.pdf", "a").with_metadata("ingest_source", "cli");
        assert!(!task.has_hooks());
        task.notify_start();
        assert_eq!(task.metadata["ingest_source"], serde_json::json!("cli"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
