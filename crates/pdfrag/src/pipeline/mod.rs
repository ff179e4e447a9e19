pub mod claims;
pub mod config;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use progress::{ProgressReporter, Stage};
pub use runner::{content_hash, IngestOutcome, Pipeline};
