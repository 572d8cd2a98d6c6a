//! Data models for freqline
//!
//! - Stage artifacts persisted in the stores
//! - Measurement tables read from input files
//! - Pipeline run state machine

pub mod artifact;
pub mod measurement;
pub mod pipeline_run;

pub use artifact::{
    ClassifiedArtifact, ClassifiedPoint, FrequencyArtifact, FrequencyGroup, FrequencyPoint,
    ReclassifiedArtifact, ReclassifiedPoint, SourceRef, TargetGrid,
};
pub use measurement::MeasurementTable;
pub use pipeline_run::{
    PipelineRun, PipelineState, RunFailure, SkippedInput, StageReport, StateTransition,
};
