//! Phase 1: EXTRACTING
//!
//! Scans the input root for measurement groups and samples every measurement
//! file at the target grid, writing one frequency artifact per file.

use super::batch::{execute_batch, Produced};
use super::{Stage, StageContext};
use crate::error::{StageError, StageFailure, StageResult};
use crate::models::{FrequencyArtifact, SourceRef, StageReport};
use crate::services::{FrequencyExtractor, InputScanner, MeasurementReader};
use freqline_common::StageKind;
use std::path::{Component, Path, PathBuf};

/// Measurement files → frequency artifacts
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionStage {
    reader: MeasurementReader,
}

impl ExtractionStage {
    pub fn new() -> Self {
        Self {
            reader: MeasurementReader::new(),
        }
    }
}

#[async_trait::async_trait]
impl Stage for ExtractionStage {
    fn kind(&self) -> StageKind {
        StageKind::Extraction
    }

    async fn run(&self, ctx: &StageContext) -> StageResult<StageReport> {
        let config = &ctx.config;
        let settings = &config.extraction;

        tracing::info!(
            run_id = %ctx.run_id,
            input_root = %config.input_root.display(),
            group_prefix = %settings.group_prefix,
            "Phase 1: EXTRACTING"
        );

        let scanner = InputScanner::new(settings.group_prefix.clone(), &settings.extensions);
        let root = config.input_root.clone();
        let scan = tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| StageError::new(StageKind::Extraction, StageFailure::Join(e.to_string())))?
            .map_err(|e| StageError::new(StageKind::Extraction, e))?;

        if scan.groups.is_empty() {
            tracing::warn!(
                input_root = %config.input_root.display(),
                "No {}* measurement groups found",
                settings.group_prefix
            );
        } else if scan.file_count() == 0 {
            tracing::warn!(groups = scan.groups.len(), "Measurement groups contain no measurement files");
        }

        tracing::info!(
            run_id = %ctx.run_id,
            groups = scan.groups.len(),
            files = scan.file_count(),
            formats = ?scan.by_format,
            "Input scan completed"
        );

        let experiment = config.experiment.clone();
        let run_date = config.run_date_stamp();
        let mut inputs: Vec<(SourceRef, PathBuf)> = Vec::with_capacity(scan.file_count());
        for group in &scan.groups {
            for file in &group.files {
                let source = SourceRef {
                    experiment: experiment.clone(),
                    run_date: run_date.clone(),
                    group: group.name.clone(),
                    stem: file_stem(file),
                    path: relative_display(&config.input_root, file),
                };
                inputs.push((source, file.clone()));
            }
        }

        let reader = self.reader;
        let extractor = FrequencyExtractor::new(settings.grid);

        let report = execute_batch(
            ctx,
            StageKind::Extraction,
            inputs,
            |(source, _)| source.path.clone(),
            move |(source, path)| {
                let table = reader.read(&path)?;
                let points = extractor.extract(&table);

                tracing::debug!(
                    file = %source.path,
                    rows = table.len(),
                    skipped_rows = table.skipped_rows,
                    points = points.len(),
                    "Measurement sampled"
                );

                let name = source.extraction_name();
                let artifact = FrequencyArtifact {
                    source,
                    frequency_column: table.frequency_column,
                    magnitude_column: table.magnitude_column,
                    targets: extractor.grid(),
                    points,
                };
                Ok(Produced::new(name, artifact))
            },
        )
        .await?;

        tracing::info!(
            run_id = %ctx.run_id,
            artifacts = report.artifacts.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Extraction completed"
        );

        Ok(report)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `path` relative to `root` with `/` separators
fn relative_display(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::new();
    for component in relative.components() {
        match component {
            Component::RootDir => out.push('/'),
            other => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    out
}
