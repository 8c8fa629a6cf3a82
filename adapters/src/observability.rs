//! In-memory observability sink for tests and embedded use.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;
use wd_core::traits::ObservabilityHooks;
use wd_core::types::{AgentId, EventRecord, RunStatus, RunTotals, WorkspaceId};

#[derive(Debug, Clone)]
pub struct FinishedRun {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub error_message: Option<String>
}

/// Records every emission instead of persisting it.
#[derive(Default)]
pub struct RecordingObservability {
    events: Mutex<Vec<EventRecord>>,
    started_runs: Mutex<Vec<Uuid>>,
    finished_runs: Mutex<Vec<FinishedRun>>
}

impl RecordingObservability {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }

    pub fn events_of_type(&self, event_type: wd_core::types::EventType) -> Vec<EventRecord> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn started_runs(&self) -> Vec<Uuid> {
        self.started_runs.lock().clone()
    }

    pub fn finished_runs(&self) -> Vec<FinishedRun> {
        self.finished_runs.lock().clone()
    }
}

#[async_trait]
impl ObservabilityHooks for RecordingObservability {
    async fn emit_event(&self, event: EventRecord) {
        self.events.lock().push(event);
    }

    async fn start_run(
        &self,
        _workspace_id: WorkspaceId,
        _agent_id: Option<AgentId>,
        _model: Option<String>,
        _metadata: Value
    ) -> Uuid {
        let run_id = Uuid::new_v4();
        self.started_runs.lock().push(run_id);
        run_id
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
        _totals: RunTotals
    ) {
        self.finished_runs.lock().push(FinishedRun {
            run_id,
            status,
            error_message
        });
    }
}
