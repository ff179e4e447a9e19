use std::fmt;

/// Pipeline stages reported through [`ProgressReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Metadata,
    Parsed,
    Duplicate,
    Chunked,
    Embedded,
    Completed,
}

impl Stage {
    /// Progress percentage reached when the stage is emitted.
    pub fn percent(self) -> u8 {
        match self {
            Stage::Metadata => 15,
            Stage::Parsed => 45,
            Stage::Chunked => 65,
            Stage::Embedded => 85,
            Stage::Duplicate | Stage::Completed => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Metadata => "metadata",
            Stage::Parsed => "parsed",
            Stage::Duplicate => "duplicate",
            Stage::Chunked => "chunked",
            Stage::Embedded => "embedded",
            Stage::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives `(percent, stage)` events from the pipeline.
///
/// Implementations must not let failures escape: the pipeline result never
/// depends on the reporter.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, percent: u8, stage: Stage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percentages_are_monotonic() {
        let order = [
            Stage::Metadata,
            Stage::Parsed,
            Stage::Chunked,
            Stage::Embedded,
            Stage::Completed,
        ];
        assert!(order.windows(2).all(|w| w[0].percent() < w[1].percent()));
        assert_eq!(Stage::Duplicate.percent(), 100);
        assert_eq!(Stage::Duplicate.to_string(), "duplicate");
    }
}
