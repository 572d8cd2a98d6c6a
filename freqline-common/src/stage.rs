//! Pipeline stage identity
//!
//! The pipeline runs three stages in a fixed order:
//! EXTRACTION → CLASSIFICATION → RECLASSIFICATION

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageKind {
    /// Measurement files → frequency artifacts
    Extraction,
    /// Frequency artifacts → classified artifacts
    Classification,
    /// Classified artifacts → reclassified artifacts
    Reclassification,
}

impl StageKind {
    /// All stages in execution order
    pub const ALL: [StageKind; 3] = [
        StageKind::Extraction,
        StageKind::Classification,
        StageKind::Reclassification,
    ];

    /// Stage that must complete before this one, if any
    pub fn upstream(self) -> Option<StageKind> {
        match self {
            StageKind::Extraction => None,
            StageKind::Classification => Some(StageKind::Extraction),
            StageKind::Reclassification => Some(StageKind::Classification),
        }
    }

    /// Stage that runs after this one, if any
    pub fn downstream(self) -> Option<StageKind> {
        match self {
            StageKind::Extraction => Some(StageKind::Classification),
            StageKind::Classification => Some(StageKind::Reclassification),
            StageKind::Reclassification => None,
        }
    }

    /// Lowercase name used in logs and staging directory names
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Extraction => "extraction",
            StageKind::Classification => "classification",
            StageKind::Reclassification => "reclassification",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
