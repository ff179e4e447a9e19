pub mod pool;
pub mod task;
pub mod watcher;

pub use pool::{run_task, SubmitMode, TaskSink, WorkerPool};
pub use task::{Task, TaskHooks};
pub use watcher::{DirectoryWatcher, ScanReport, WatcherConfig, WatcherHooks};
