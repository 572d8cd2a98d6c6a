//! Phase 3: RECLASSIFYING
//!
//! Re-bins every classified artifact at the reclassification base and flags
//! points whose class changed.

use super::batch::{artifact_label, execute_batch, upstream_artifacts, Produced};
use super::{Stage, StageContext};
use crate::error::{StageFailure, StageResult};
use crate::models::{ClassifiedArtifact, StageReport};
use crate::services::{reclassified_workbook, workbook_name, FrequencyClassifier};
use freqline_common::{StageKind, Store};
use std::path::PathBuf;

/// Classified artifacts → reclassified artifacts
#[derive(Debug, Clone, Copy, Default)]
pub struct ReclassificationStage;

impl ReclassificationStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Stage for ReclassificationStage {
    fn kind(&self) -> StageKind {
        StageKind::Reclassification
    }

    async fn run(&self, ctx: &StageContext) -> StageResult<StageReport> {
        let base = ctx.config.reclassification_base;
        tracing::info!(run_id = %ctx.run_id, base, "Phase 3: RECLASSIFYING");

        let inputs = upstream_artifacts(ctx, StageKind::Reclassification)?;
        let classifier = FrequencyClassifier::new(base);
        let export = ctx.config.export_workbooks;

        let report = execute_batch(
            ctx,
            StageKind::Reclassification,
            inputs,
            |path: &PathBuf| artifact_label(path),
            move |path: PathBuf| {
                let artifact: ClassifiedArtifact =
                    Store::read_artifact(&path).map_err(|e| StageFailure::Artifact {
                        name: artifact_label(&path),
                        message: e.to_string(),
                    })?;

                let reclassified = classifier.reclassify(&artifact)?;
                tracing::debug!(
                    artifact = %artifact_label(&path),
                    previous_base = artifact.base,
                    groups = reclassified.grouped.len(),
                    revised = reclassified.revised_count,
                    "Artifact reclassified"
                );

                let name = artifact.source.reclassification_name(base);
                let mut produced = Produced::new(name, reclassified);
                if export {
                    let bytes = reclassified_workbook(&produced.artifact)?;
                    let export_name = workbook_name(&produced.name);
                    produced = produced.with_export(export_name, bytes);
                }
                Ok(produced)
            },
        )
        .await?;

        tracing::info!(
            run_id = %ctx.run_id,
            artifacts = report.artifacts.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Reclassification completed"
        );

        Ok(report)
    }
}
