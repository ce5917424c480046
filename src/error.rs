use std::time::Duration;

use thiserror::Error;

use crate::types::SectionId;

/// Failures inside one lookup request. Only `NotFound` ends a request; every
/// other variant is recovered with a per-section fallback and logged.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("nothing found for `{0}`")]
    NotFound(String),

    #[error("{section} timed out after {after:?}")]
    FetchTimeout { section: SectionId, after: Duration },

    #[error("{section} failed: {reason}")]
    FetchFailure { section: SectionId, reason: String },

    #[error("image download failed for {url}: {reason}")]
    ImageDownloadFailure { url: String, reason: String },

    #[error("persisting {key} failed: {reason}")]
    PersistenceFailure { key: String, reason: String },
}

impl PipelineError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineError::NotFound(_))
    }
}
