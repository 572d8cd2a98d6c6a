//! Pipeline event system
//!
//! The driver and stages publish [`PipelineEvent`]s on an [`EventBus`]
//! (a `tokio::sync::broadcast` channel). Subscribers see every event emitted
//! after they subscribed, in emission order. Emission never blocks and never
//! fails the pipeline: with no subscribers the event is dropped.

use crate::StageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Driver started a run
    RunStarted {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A stage began executing
    StageStarted {
        run_id: Uuid,
        stage: StageKind,
        timestamp: DateTime<Utc>,
    },

    /// A stage staged one artifact (not yet visible in the store)
    ArtifactWritten {
        run_id: Uuid,
        stage: StageKind,
        artifact: String,
        timestamp: DateTime<Utc>,
    },

    /// A per-artifact error was tolerated under the keep-going policy
    ArtifactSkipped {
        run_id: Uuid,
        stage: StageKind,
        source: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage committed its output
    StageCompleted {
        run_id: Uuid,
        stage: StageKind,
        artifacts: usize,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },

    /// A stage failed; no later stage will run
    StageFailed {
        run_id: Uuid,
        stage: StageKind,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Driver reached a terminal state
    RunFinished {
        run_id: Uuid,
        succeeded: bool,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Stage this event belongs to, if any
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            PipelineEvent::StageStarted { stage, .. }
            | PipelineEvent::ArtifactWritten { stage, .. }
            | PipelineEvent::ArtifactSkipped { stage, .. }
            | PipelineEvent::StageCompleted { stage, .. }
            | PipelineEvent::StageFailed { stage, .. } => Some(*stage),
            PipelineEvent::RunStarted { .. } | PipelineEvent::RunFinished { .. } => None,
        }
    }

    /// Short event name for logs
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "RunStarted",
            PipelineEvent::StageStarted { .. } => "StageStarted",
            PipelineEvent::ArtifactWritten { .. } => "ArtifactWritten",
            PipelineEvent::ArtifactSkipped { .. } => "ArtifactSkipped",
            PipelineEvent::StageCompleted { .. } => "StageCompleted",
            PipelineEvent::StageFailed { .. } => "StageFailed",
            PipelineEvent::RunFinished { .. } => "RunFinished",
        }
    }
}

/// Broadcast bus for pipeline events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per slow subscriber
    /// before it starts lagging (older events are dropped for it).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
