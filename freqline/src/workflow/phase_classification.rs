//! Phase 2: CLASSIFYING
//!
//! Snaps every point of every frequency artifact to the nearest multiple of
//! the classification base and groups points by class.

use super::batch::{artifact_label, execute_batch, upstream_artifacts, Produced};
use super::{Stage, StageContext};
use crate::error::{StageFailure, StageResult};
use crate::models::{FrequencyArtifact, StageReport};
use crate::services::{classified_workbook, workbook_name, FrequencyClassifier};
use freqline_common::{StageKind, Store};
use std::path::PathBuf;

/// Frequency artifacts → classified artifacts
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationStage;

impl ClassificationStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Stage for ClassificationStage {
    fn kind(&self) -> StageKind {
        StageKind::Classification
    }

    async fn run(&self, ctx: &StageContext) -> StageResult<StageReport> {
        let base = ctx.config.classification_base;
        tracing::info!(run_id = %ctx.run_id, base, "Phase 2: CLASSIFYING");

        let inputs = upstream_artifacts(ctx, StageKind::Classification)?;
        let classifier = FrequencyClassifier::new(base);
        let export = ctx.config.export_workbooks;

        let report = execute_batch(
            ctx,
            StageKind::Classification,
            inputs,
            |path: &PathBuf| artifact_label(path),
            move |path: PathBuf| {
                let artifact: FrequencyArtifact =
                    Store::read_artifact(&path).map_err(|e| StageFailure::Artifact {
                        name: artifact_label(&path),
                        message: e.to_string(),
                    })?;

                let classified = classifier.classify(&artifact)?;

                match (classified.grouped.first(), classified.grouped.last()) {
                    (Some(low), Some(high)) => tracing::info!(
                        artifact = %artifact_label(&path),
                        groups = classified.grouped.len(),
                        "Class range {} Hz to {} Hz",
                        low.classified_frequency,
                        high.classified_frequency
                    ),
                    _ => tracing::warn!(artifact = %artifact_label(&path), "Artifact has no points to classify"),
                }

                let name = artifact.source.classification_name(base);
                let mut produced = Produced::new(name, classified);
                if export {
                    let bytes = classified_workbook(&produced.artifact)?;
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
            "Classification completed"
        );

        Ok(report)
    }
}
