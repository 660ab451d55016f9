use crate::recurrence::ExpansionError;
use thiserror::Error;

/// Stages a job goes through while being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Started,
    BaseLoaded,
    Expanded,
    Persisted,
    Completed,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Started => "started",
            ProcessingStage::BaseLoaded => "base-loaded",
            ProcessingStage::Expanded => "expanded",
            ProcessingStage::Persisted => "persisted",
            ProcessingStage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end the processing of a single job.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Base event not found: {0}")]
    BaseEventNotFound(String),

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Expansion failed: {0}")]
    Expansion(#[from] ExpansionError),

    #[error("Bulk insert failed for {failed} occurrence(s): {first_error}")]
    Insert { failed: usize, first_error: String },

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ProcessError {
    /// Whether running the same job again could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessError::Insert { .. } | ProcessError::Store(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::BaseEventNotFound(_) => "base_event_not_found",
            ProcessError::InvalidPayload(_) => "invalid_payload",
            ProcessError::Expansion(_) => "expansion",
            ProcessError::Insert { .. } => "insert",
            ProcessError::Store(_) => "store",
        }
    }
}
