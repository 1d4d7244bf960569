//! Execution events and non-blocking broadcast emitter.

use isthmus_primitives::{IntentId, LinkId};
use isthmus_topology_graph::StepKind;
use isthmus_topology_peering::LinkState;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    StepStarted {
        id: IntentId,
        kind: StepKind,
    },
    StepCompleted {
        id: IntentId,
    },
    /// Completed in an earlier run; not handed to the engine again.
    StepReused {
        id: IntentId,
    },
    StepFailed {
        id: IntentId,
        error: String,
    },
    StepSkipped {
        id: IntentId,
        failed_dependency: IntentId,
    },
    LinkStateChanged {
        link: LinkId,
        old_state: LinkState,
        new_state: LinkState,
    },
    Cancelled {
        outstanding: usize,
    },
}

impl ExecutionEvent {
    pub fn step_id(&self) -> Option<&IntentId> {
        match self {
            Self::StepStarted { id, .. }
            | Self::StepCompleted { id }
            | Self::StepReused { id }
            | Self::StepFailed { id, .. }
            | Self::StepSkipped { id, .. } => Some(id),
            Self::LinkStateChanged { .. } | Self::Cancelled { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::StepFailed { .. } | Self::StepSkipped { .. })
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn step_started(&self, id: IntentId, kind: StepKind) {
        self.emit(ExecutionEvent::StepStarted { id, kind });
    }

    pub fn step_completed(&self, id: IntentId) {
        self.emit(ExecutionEvent::StepCompleted { id });
    }

    pub fn step_reused(&self, id: IntentId) {
        self.emit(ExecutionEvent::StepReused { id });
    }

    pub fn step_failed(&self, id: IntentId, error: String) {
        self.emit(ExecutionEvent::StepFailed { id, error });
    }

    pub fn step_skipped(&self, id: IntentId, failed_dependency: IntentId) {
        self.emit(ExecutionEvent::StepSkipped {
            id,
            failed_dependency,
        });
    }

    pub fn link_state_changed(&self, link: LinkId, old_state: LinkState, new_state: LinkState) {
        self.emit(ExecutionEvent::LinkStateChanged {
            link,
            old_state,
            new_state,
        });
    }

    pub fn cancelled(&self, outstanding: usize) {
        self.emit(ExecutionEvent::Cancelled { outstanding });
    }
}
