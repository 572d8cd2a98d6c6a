//! freqline library interface
//!
//! Three-stage frequency measurement pipeline. Measurement files are sampled
//! at a target grid (extraction), snapped to frequency classes
//! (classification) and re-binned (reclassification). Each stage hands its
//! output to the next through a directory store.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::config::{ConfigOverrides, FailurePolicy, PipelineConfig, StorePaths};
pub use crate::error::{StageError, StageFailure, StageResult};
pub use crate::workflow::{PipelineDriver, Stage, StageContext};
