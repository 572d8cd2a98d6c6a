//! Error types for freqline
//!
//! Every stage failure reaches the driver as one [`StageError`]: the stage
//! that failed plus a [`StageFailure`] reason. The driver does not branch on
//! the reason; any failure ends the run.

use crate::services::{ClassifyError, ExportError, ReadError, ScanError};
use freqline_common::StageKind;
use thiserror::Error;

/// Why a stage failed
#[derive(Debug, Error)]
pub enum StageFailure {
    /// Input root could not be scanned
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Measurement file could not be read
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Artifact points could not be classified
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Workbook export failed
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Upstream artifact or produced artifact was unusable
    #[error("Artifact {name}: {message}")]
    Artifact { name: String, message: String },

    /// Store access or commit failed
    #[error("Store error: {0}")]
    Store(#[from] freqline_common::Error),

    /// Worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Join(String),

    /// No stage implementation registered for this kind
    #[error("No stage registered")]
    NotRegistered,

    /// Run was cancelled before the stage committed
    #[error("Cancelled")]
    Cancelled,
}

/// Failure of one stage
#[derive(Debug, Error)]
#[error("{stage} stage failed: {reason}")]
pub struct StageError {
    pub stage: StageKind,
    #[source]
    pub reason: StageFailure,
}

impl StageError {
    pub fn new(stage: StageKind, reason: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }

    pub fn cancelled(stage: StageKind) -> Self {
        Self::new(stage, StageFailure::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.reason, StageFailure::Cancelled)
    }
}

/// Result type for stage execution
pub type StageResult<T> = Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stage_error_display_names_stage_and_reason() {
        let err = StageError::new(
            StageKind::Extraction,
            ReadError::NoData(PathBuf::from("HL1/Pon.csv")),
        );
        assert_eq!(
            err.to_string(),
            "extraction stage failed: No numeric frequency/magnitude rows in HL1/Pon.csv"
        );
    }

    #[test]
    fn test_cancelled() {
        let err = StageError::cancelled(StageKind::Classification);
        assert!(err.is_cancelled());
        assert_eq!(err.stage, StageKind::Classification);
    }
}
