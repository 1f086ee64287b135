//! Messages and client for the `TaskHubSidecarService` work-item RPCs.
//!
//! Generated at build time from `proto/orchestrator_service.proto`, which
//! carries the subset of the sidecar contract a work-item worker touches.
//! Field tags match the upstream contract, so fields this crate does not
//! declare (entity requests, most history event kinds, tracing context) are
//! skipped on decode.
//!
//! ## Service
//!
//! - `GetWorkItems` - server-streaming; yields [`WorkItem`]s until the sidecar
//!   closes the stream.
//! - `CompleteOrchestratorTask` / `CompleteActivityTask` - unary; report the
//!   outcome of one work item.
//!
//! The client lives in [`task_hub_sidecar_service_client`].

// The contract declares no protobuf package.
tonic::include_proto!("_");

impl OrchestratorRequest {
    /// Returns the `executionStarted` event from the history, if present.
    pub fn execution_started(&self) -> Option<&ExecutionStartedEvent> {
        self.past_events
            .iter()
            .chain(self.new_events.iter())
            .find_map(|event| match &event.event_type {
                Some(history_event::EventType::ExecutionStarted(started)) => Some(started),
                None => None,
            })
    }
}

impl ActivityRequest {
    /// The owning orchestration's instance id, or `""` when absent.
    pub fn instance_id(&self) -> &str {
        self.orchestration_instance
            .as_ref()
            .map_or("", |instance| instance.instance_id.as_str())
    }
}

impl OrchestratorResponse {
    /// Builds a response that completes the orchestration with the given
    /// terminal status.
    pub fn complete(
        instance_id: impl Into<String>,
        status: OrchestrationStatus,
        result: Option<String>,
        failure_details: Option<TaskFailureDetails>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            actions: vec![OrchestratorAction {
                id: 0,
                orchestrator_action_type: Some(
                    orchestrator_action::OrchestratorActionType::CompleteOrchestration(
                        CompleteOrchestrationAction {
                            orchestration_status: status as i32,
                            result,
                            failure_details,
                            ..Default::default()
                        },
                    ),
                ),
            }],
            ..Default::default()
        }
    }

    /// Returns the `CompleteOrchestration` action, if the turn carries one.
    pub fn completion(&self) -> Option<&CompleteOrchestrationAction> {
        self.actions
            .iter()
            .find_map(|action| match &action.orchestrator_action_type {
                Some(orchestrator_action::OrchestratorActionType::CompleteOrchestration(
                    complete,
                )) => Some(complete),
                _ => None,
            })
    }
}

impl WorkItem {
    /// A short, stable name for the item's kind, used in logs and metrics.
    ///
    /// An absent `request` means the sidecar sent a kind this crate does not
    /// model (for example entity batches).
    pub fn kind(&self) -> &'static str {
        match &self.request {
            Some(work_item::Request::OrchestratorRequest(_)) => "orchestrator",
            Some(work_item::Request::ActivityRequest(_)) => "activity",
            Some(work_item::Request::HealthPing(_)) => "health_ping",
            None => "unknown",
        }
    }
}
