//! Job status tracking for entry points that poll for results.

pub mod tracker;
pub mod upload;

pub use tracker::{Job, JobState, JobTracker, JobUpdate, StatusSnapshot};
pub use upload::{JobHooks, UploadManager};
