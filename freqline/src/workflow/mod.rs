//! Pipeline workflow
//!
//! # State Progression
//! EXTRACTING → CLASSIFYING → RECLASSIFYING → SUCCEEDED (or FAILED from any stage)
//!
//! # Architecture
//! Each stage is a [`Stage`] trait object handled by a dedicated `phase_*`
//! module:
//!
//! - **EXTRACTING**: measurement files → frequency artifacts
//! - **CLASSIFYING**: frequency artifacts → classified artifacts
//! - **RECLASSIFYING**: classified artifacts → reclassified artifacts
//!
//! The [`PipelineDriver`] owns the state machine and runs one stage at a
//! time. Stages share [`batch::execute_batch`], which processes inputs on
//! the blocking pool and stages output in a [`freqline_common::StoreBatch`]
//! that is committed only when every input has been handled.

use crate::config::PipelineConfig;
use crate::error::StageResult;
use crate::models::StageReport;
use freqline_common::events::EventBus;
use freqline_common::StageKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod batch;
mod driver;
mod phase_classification;
mod phase_extraction;
mod phase_reclassification;

pub use driver::PipelineDriver;
pub use phase_classification::ClassificationStage;
pub use phase_extraction::ExtractionStage;
pub use phase_reclassification::ReclassificationStage;

/// Everything a stage needs for one execution
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run_id: Uuid,
    pub config: Arc<PipelineConfig>,
    pub events: EventBus,
    pub cancel: CancellationToken,
    /// Artifact names the upstream stage committed earlier in this run
    ///
    /// `None` when the upstream stage did not run in this run (single-stage
    /// commands); the stage then reads every artifact in the upstream store.
    pub upstream: Option<Vec<String>>,
}

/// One unit of pipeline work
///
/// A stage reads its input (input root or upstream store), writes exactly
/// one artifact per input into its own store, and reports what it did.
/// Output must not become visible in the store unless the stage succeeds.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is
    fn kind(&self) -> StageKind;

    /// Execute the stage
    async fn run(&self, ctx: &StageContext) -> StageResult<StageReport>;
}

/// The three built-in stages in execution order
pub fn default_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(ExtractionStage::new()),
        Arc::new(ClassificationStage::new()),
        Arc::new(ReclassificationStage::new()),
    ]
}
