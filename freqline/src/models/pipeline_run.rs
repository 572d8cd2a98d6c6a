//! Pipeline run state machine
//!
//! A run progresses through three working states and ends in one of two
//! terminal states:
//!
//! ```text
//! EXTRACTING ──ok──▶ CLASSIFYING ──ok──▶ RECLASSIFYING ──ok──▶ SUCCEEDED
//!     │                  │                    │
//!     └──err──▶ FAILED ◀─┴──────err───────────┘
//! ```
//!
//! Single-stage runs start in that stage's state and succeed directly after
//! it (`stop_after`).

use chrono::{DateTime, Utc};
use freqline_common::StageKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineState {
    /// Extraction stage running
    Extracting,
    /// Classification stage running
    Classifying,
    /// Reclassification stage running
    Reclassifying,
    /// Every requested stage succeeded
    Succeeded,
    /// A stage failed; later stages did not run
    Failed,
}

impl PipelineState {
    /// Working state for a stage
    pub fn for_stage(stage: StageKind) -> Self {
        match stage {
            StageKind::Extraction => PipelineState::Extracting,
            StageKind::Classification => PipelineState::Classifying,
            StageKind::Reclassification => PipelineState::Reclassifying,
        }
    }

    /// Stage executed in this state (None for terminal states)
    pub fn stage(self) -> Option<StageKind> {
        match self {
            PipelineState::Extracting => Some(StageKind::Extraction),
            PipelineState::Classifying => Some(StageKind::Classification),
            PipelineState::Reclassifying => Some(StageKind::Reclassification),
            PipelineState::Succeeded | PipelineState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }

    /// Whether `self → next` is an edge of the state machine
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Extracting, Classifying)
                | (Classifying, Reclassifying)
                | (Extracting | Classifying | Reclassifying, Succeeded)
                | (Extracting | Classifying | Reclassifying, Failed)
        )
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: PipelineState,
    pub new_state: PipelineState,
    pub transitioned_at: DateTime<Utc>,
}

/// Input a stage tolerated under the keep-going policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedInput {
    /// Input file or artifact path
    pub source: String,
    pub reason: String,
}

/// Outcome of one successful stage execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKind,
    /// Inputs considered (measurement files or upstream artifacts)
    pub inputs: usize,
    /// Committed artifact file names, sorted
    pub artifacts: Vec<String>,
    pub skipped: Vec<SkippedInput>,
    pub duration_ms: u64,
}

impl StageReport {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            inputs: 0,
            artifacts: Vec::new(),
            skipped: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Why a run ended in FAILED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub stage: StageKind,
    pub message: String,
}

/// One execution of the pipeline (in-memory state, serialized as the run report)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run identifier
    pub run_id: Uuid,

    /// Current state
    pub state: PipelineState,

    /// Last stage this run executes
    pub stop_after: StageKind,

    /// Reports of stages that succeeded, in execution order
    pub stage_reports: Vec<StageReport>,

    /// Set when the run failed
    pub failure: Option<RunFailure>,

    /// Every transition taken
    pub transitions: Vec<StateTransition>,

    pub started_at: DateTime<Utc>,

    /// Set on reaching a terminal state
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Full run: EXTRACTING through RECLASSIFYING
    pub fn new() -> Self {
        Self::single_range(StageKind::Extraction, StageKind::Reclassification)
    }

    /// Run of exactly one stage
    pub fn single_stage(stage: StageKind) -> Self {
        Self::single_range(stage, stage)
    }

    fn single_range(first: StageKind, stop_after: StageKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: PipelineState::for_stage(first),
            stop_after,
            stage_reports: Vec::new(),
            failure: None,
            transitions: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Stage to execute next (None once terminal)
    pub fn current_stage(&self) -> Option<StageKind> {
        self.state.stage()
    }

    /// Record a successful stage and advance
    ///
    /// Returns the transition taken, or None if the run is already terminal.
    pub fn record_success(&mut self, report: StageReport) -> Option<StateTransition> {
        let stage = self.current_stage()?;
        self.stage_reports.push(report);

        let next = match stage.downstream() {
            Some(next) if stage != self.stop_after => PipelineState::for_stage(next),
            _ => PipelineState::Succeeded,
        };
        Some(self.transition_to(next))
    }

    /// Record a failed stage and move to FAILED
    pub fn record_failure(&mut self, message: String) -> Option<StateTransition> {
        let stage = self.current_stage()?;
        self.failure = Some(RunFailure { stage, message });
        Some(self.transition_to(PipelineState::Failed))
    }

    fn transition_to(&mut self, new_state: PipelineState) -> StateTransition {
        debug_assert!(self.state.can_transition_to(new_state));

        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        self.transitions.push(transition.clone());
        transition
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    /// Stage that failed, if the run failed
    pub fn failed_stage(&self) -> Option<StageKind> {
        self.failure.as_ref().map(|f| f.stage)
    }

    /// Stages that ran to completion, in order
    pub fn completed_stages(&self) -> Vec<StageKind> {
        self.stage_reports.iter().map(|r| r.stage).collect()
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}
