//! Substitute stage implementations for driver tests

use freqline::models::StageReport;
use freqline::workflow::batch::{execute_batch, Produced};
use freqline::{Stage, StageContext, StageError, StageFailure, StageResult};
use freqline_common::StageKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Succeeds without touching any store and counts its invocations
pub struct CountingStage {
    kind: StageKind,
    calls: Arc<AtomicUsize>,
}

impl CountingStage {
    pub fn new(kind: StageKind) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                kind,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait::async_trait]
impl Stage for CountingStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self, _ctx: &StageContext) -> StageResult<StageReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StageReport::new(self.kind))
    }
}

/// Always fails deterministically
pub struct FailingStage {
    kind: StageKind,
    calls: Arc<AtomicUsize>,
}

impl FailingStage {
    pub fn new(kind: StageKind) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                kind,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait::async_trait]
impl Stage for FailingStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self, _ctx: &StageContext) -> StageResult<StageReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StageError::new(
            self.kind,
            StageFailure::Artifact {
                name: "fixture".to_string(),
                message: "deterministic failure".to_string(),
            },
        ))
    }
}

/// Stages `inputs` small artifacts through the shared batch executor and
/// cancels the run while working on input `cancel_at`
pub struct CancellingStage {
    kind: StageKind,
    inputs: usize,
    cancel_at: usize,
}

impl CancellingStage {
    pub fn new(kind: StageKind, inputs: usize, cancel_at: usize) -> Self {
        Self { kind, inputs, cancel_at }
    }
}

#[async_trait::async_trait]
impl Stage for CancellingStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self, ctx: &StageContext) -> StageResult<StageReport> {
        let cancel = ctx.cancel.clone();
        let cancel_at = self.cancel_at;
        execute_batch(
            ctx,
            self.kind,
            (0..self.inputs).collect(),
            |index: &usize| format!("input {}", index),
            move |index: usize| {
                if index == cancel_at {
                    cancel.cancel();
                }
                Ok(Produced::new(format!("item{:03}.json", index), index))
            },
        )
        .await
    }
}
