//! Shared per-artifact execution for stages
//!
//! Inputs are processed on the blocking pool with at most `workers` in
//! flight. Results are consumed in input order, so artifacts are staged in
//! the same order on every run regardless of which worker finishes first.

use super::StageContext;
use crate::config::FailurePolicy;
use crate::error::{StageError, StageFailure, StageResult};
use crate::models::{SkippedInput, StageReport};
use freqline_common::events::PipelineEvent;
use freqline_common::StageKind;
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Output produced from one input
#[derive(Debug)]
pub struct Produced<T> {
    /// Artifact file name in the stage's store
    pub name: String,
    pub artifact: T,
    /// Export files (name, bytes) committed next to the artifact
    pub exports: Vec<(String, Vec<u8>)>,
}

impl<T> Produced<T> {
    pub fn new(name: String, artifact: T) -> Self {
        Self {
            name,
            artifact,
            exports: Vec::new(),
        }
    }

    pub fn with_export(mut self, name: String, bytes: Vec<u8>) -> Self {
        self.exports.push((name, bytes));
        self
    }
}

/// Run `work` over `inputs` and commit the produced artifacts to `stage`'s store
///
/// `label` names an input in logs, events and skip records. Under
/// [`FailurePolicy::FailFast`] the first per-input error fails the stage;
/// under [`FailurePolicy::KeepGoing`] it is recorded and the input skipped.
/// Store errors and cancellation always fail the stage, and a failed stage
/// leaves its store untouched.
pub async fn execute_batch<I, T, L, F>(
    ctx: &StageContext,
    stage: StageKind,
    inputs: Vec<I>,
    label: L,
    work: F,
) -> StageResult<StageReport>
where
    I: Send + 'static,
    T: Serialize + Send + 'static,
    L: Fn(&I) -> String + Send,
    F: Fn(I) -> Result<Produced<T>, StageFailure> + Send + Sync + 'static,
{
    let start_time = Instant::now();
    let store = ctx.config.stores.store(stage);
    let mut batch = store.begin_batch(stage).map_err(|e| StageError::new(stage, e))?;

    let mut report = StageReport::new(stage);
    report.inputs = inputs.len();

    let labels: Vec<String> = inputs.iter().map(&label).collect();
    let work = Arc::new(work);

    let jobs = inputs.into_iter().map(|input| {
        let work = Arc::clone(&work);
        async move {
            match tokio::task::spawn_blocking(move || work(input)).await {
                Ok(result) => result,
                Err(e) => Err(StageFailure::Join(e.to_string())),
            }
        }
    });
    let mut results = futures::stream::iter(jobs).buffered(ctx.config.workers.max(1));

    for source in &labels {
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => None,
            next = results.next() => next,
        };
        let result = match next {
            Some(result) => result,
            None => break,
        };

        match result {
            Ok(Produced { name, artifact, exports }) => {
                batch.write(&name, &artifact).map_err(|e| StageError::new(stage, e))?;
                for (export, bytes) in &exports {
                    batch.write_export(export, bytes).map_err(|e| StageError::new(stage, e))?;
                }
                tracing::debug!(
                    run_id = %ctx.run_id,
                    stage = %stage,
                    artifact = %name,
                    source = %source,
                    "Artifact staged"
                );
                ctx.events.emit_lossy(PipelineEvent::ArtifactWritten {
                    run_id: ctx.run_id,
                    stage,
                    artifact: name,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(StageFailure::Cancelled) => return Err(StageError::cancelled(stage)),
            Err(reason) => match ctx.config.failure_policy {
                FailurePolicy::FailFast => {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        stage = %stage,
                        source = %source,
                        error = %reason,
                        "Input failed"
                    );
                    return Err(StageError::new(stage, reason));
                }
                FailurePolicy::KeepGoing => {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        stage = %stage,
                        source = %source,
                        error = %reason,
                        "Input failed, skipping (keep-going)"
                    );
                    ctx.events.emit_lossy(PipelineEvent::ArtifactSkipped {
                        run_id: ctx.run_id,
                        stage,
                        source: source.clone(),
                        reason: reason.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    report.skipped.push(SkippedInput {
                        source: source.clone(),
                        reason: reason.to_string(),
                    });
                }
            },
        }
    }

    if ctx.cancel.is_cancelled() {
        tracing::info!(run_id = %ctx.run_id, stage = %stage, "Stage cancelled, discarding staged output");
        return Err(StageError::cancelled(stage));
    }

    let committed = batch.commit().map_err(|e| StageError::new(stage, e))?;
    report.artifacts = committed
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .collect();
    report.duration_ms = start_time.elapsed().as_millis() as u64;

    Ok(report)
}

/// Artifacts `stage` reads from its upstream store
///
/// In a full run these are exactly the artifacts the upstream stage
/// committed in this run ([`StageContext::upstream`]); otherwise every
/// artifact in the store. A missing upstream store fails the stage; an
/// empty input set is logged and yields no inputs.
pub fn upstream_artifacts(ctx: &StageContext, stage: StageKind) -> StageResult<Vec<PathBuf>> {
    let store = ctx.config.stores.input_store(stage).ok_or_else(|| {
        StageError::new(
            stage,
            freqline_common::Error::Internal(format!("{} stage has no upstream store", stage)),
        )
    })?;

    let artifacts = match &ctx.upstream {
        Some(names) => {
            let mut paths: Vec<PathBuf> = names.iter().map(|name| store.path().join(name)).collect();
            paths.sort();
            paths
        }
        None => store.list_artifacts().map_err(|e| StageError::new(stage, e))?,
    };
    if artifacts.is_empty() {
        tracing::warn!(
            run_id = %ctx.run_id,
            stage = %stage,
            store = %store.path().display(),
            "Upstream store holds no artifacts"
        );
    }
    Ok(artifacts)
}

/// File name of an artifact path, for labels and error messages
pub fn artifact_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
