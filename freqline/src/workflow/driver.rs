//! Pipeline driver
//!
//! Runs the stages through the [`PipelineRun`] state machine. Exactly one
//! stage executes at a time; a stage starts only after the previous one
//! committed its store. The first failure moves the run to FAILED and no
//! later stage runs. Earlier stores are never rolled back and nothing is
//! retried.

use super::{default_stages, Stage, StageContext};
use crate::config::PipelineConfig;
use crate::error::{StageError, StageFailure};
use crate::models::PipelineRun;
use chrono::Utc;
use freqline_common::events::{EventBus, PipelineEvent};
use freqline_common::{Result, StageKind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Pipeline driver service
pub struct PipelineDriver {
    config: Arc<PipelineConfig>,
    event_bus: EventBus,
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelineDriver {
    /// Driver with the built-in extraction, classification and reclassification stages
    pub fn new(config: PipelineConfig, event_bus: EventBus) -> Self {
        Self::with_stages(config, event_bus, default_stages())
    }

    /// Driver with caller-supplied stage implementations
    ///
    /// Stages are looked up by [`Stage::kind`]; a kind with no registered
    /// stage fails when the run reaches it.
    pub fn with_stages(config: PipelineConfig, event_bus: EventBus, stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            config: Arc::new(config),
            event_bus,
            stages,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Create (and with `clean_stores`, empty) the stores written by `stages`
    pub fn prepare_stores(&self, stages: &[StageKind]) -> Result<()> {
        for &stage in stages {
            let store = self.config.stores.store(stage);
            store.ensure_exists()?;
            if self.config.clean_stores {
                let removed = store.clear()?;
                tracing::info!(stage = %stage, store = %store.path().display(), removed, "Store cleaned");
            }
        }
        Ok(())
    }

    /// Execute the full pipeline
    ///
    /// Returns Err only when the stores cannot be prepared; every stage
    /// outcome, including failure, is reported through the returned run.
    pub async fn run(&self, cancel_token: CancellationToken) -> Result<PipelineRun> {
        self.prepare_stores(&StageKind::ALL)?;
        Ok(self.drive(PipelineRun::new(), cancel_token).await)
    }

    /// Execute one stage against the existing upstream store
    pub async fn run_stage(&self, stage: StageKind, cancel_token: CancellationToken) -> Result<PipelineRun> {
        self.prepare_stores(&[stage])?;
        Ok(self.drive(PipelineRun::single_stage(stage), cancel_token).await)
    }

    async fn drive(&self, mut run: PipelineRun, cancel_token: CancellationToken) -> PipelineRun {
        tracing::info!(
            run_id = %run.run_id,
            input_root = %self.config.input_root.display(),
            experiment = %self.config.experiment,
            run_date = %self.config.run_date_stamp(),
            policy = %self.config.failure_policy,
            workers = self.config.workers,
            "Starting pipeline run"
        );

        self.event_bus.emit_lossy(PipelineEvent::RunStarted {
            run_id: run.run_id,
            timestamp: Utc::now(),
        });

        while let Some(kind) = run.current_stage() {
            self.event_bus.emit_lossy(PipelineEvent::StageStarted {
                run_id: run.run_id,
                stage: kind,
                timestamp: Utc::now(),
            });

            let ctx = StageContext {
                run_id: run.run_id,
                config: Arc::clone(&self.config),
                events: self.event_bus.clone(),
                cancel: cancel_token.clone(),
                upstream: upstream_handoff(&run, kind),
            };

            let result = if cancel_token.is_cancelled() {
                Err(StageError::cancelled(kind))
            } else {
                match self.stage_for(kind) {
                    Some(stage) => stage.run(&ctx).await,
                    None => Err(StageError::new(kind, StageFailure::NotRegistered)),
                }
            };

            let transition = match result {
                Ok(report) => {
                    tracing::info!(
                        run_id = %run.run_id,
                        stage = %kind,
                        artifacts = report.artifacts.len(),
                        skipped = report.skipped.len(),
                        "Stage completed"
                    );
                    self.event_bus.emit_lossy(PipelineEvent::StageCompleted {
                        run_id: run.run_id,
                        stage: kind,
                        artifacts: report.artifacts.len(),
                        skipped: report.skipped.len(),
                        timestamp: Utc::now(),
                    });
                    run.record_success(report)
                }
                Err(e) => {
                    tracing::error!(run_id = %run.run_id, stage = %kind, error = %e, "Stage failed");
                    self.event_bus.emit_lossy(PipelineEvent::StageFailed {
                        run_id: run.run_id,
                        stage: kind,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    run.record_failure(e.to_string())
                }
            };

            if let Some(transition) = transition {
                tracing::debug!(
                    run_id = %run.run_id,
                    from = ?transition.old_state,
                    to = ?transition.new_state,
                    "State transition"
                );
            }
        }

        let succeeded = run.succeeded();
        if succeeded {
            tracing::info!(run_id = %run.run_id, stages = run.stage_reports.len(), "Pipeline run succeeded");
        } else {
            tracing::error!(
                run_id = %run.run_id,
                failed_stage = ?run.failed_stage(),
                "Pipeline run failed"
            );
        }

        self.event_bus.emit_lossy(PipelineEvent::RunFinished {
            run_id: run.run_id,
            succeeded,
            timestamp: Utc::now(),
        });

        run
    }

    fn stage_for(&self, kind: StageKind) -> Option<&Arc<dyn Stage>> {
        self.stages.iter().find(|stage| stage.kind() == kind)
    }
}

/// Artifacts committed in this run by the stage `kind` reads from
///
/// Older artifacts in the upstream store (other bases, other dates) are not
/// part of this run's hand-off.
fn upstream_handoff(run: &PipelineRun, kind: StageKind) -> Option<Vec<String>> {
    let upstream = kind.upstream()?;
    run.stage_reports
        .iter()
        .find(|report| report.stage == upstream)
        .map(|report| report.artifacts.clone())
}
