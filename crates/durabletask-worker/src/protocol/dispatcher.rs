//! Item Dispatcher: runs one handler invocation and finalizes its work item.
//!
//! Every dispatch ends in exactly one of three ways:
//!
//! - the handler's response (or its translated failure) is sent to the
//!   sidecar, successfully or not;
//! - cancellation was observed before or during the handler, and the item is
//!   abandoned without a report;
//! - cancellation was observed while the report was in flight, and the send
//!   is dropped.
//!
//! Nothing a dispatch does can fail the receive loop.

use crate::{
    client::SidecarClient,
    handler::WorkItemHandler,
    telemetry::{
        decrement_active_work_items, increment_abandoned_work_items, increment_active_work_items,
        increment_handler_failures, increment_report_failures, record_handler_duration,
    },
};
use core::panic::AssertUnwindSafe;
use durabletask_worker_core::{
    HandlerError, failure_details,
    proto::{
        ActivityRequest, ActivityResponse, OrchestrationStatus, OrchestratorRequest,
        OrchestratorResponse, TaskFailureDetails,
    },
};
use futures::FutureExt;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::Instrument;

/// Number of dispatches currently between entry and exit.
///
/// Observability only; nothing waits on this value.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActiveWorkItems(Arc<AtomicUsize>);

impl ActiveWorkItems {
    pub(crate) fn current(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn enter(&self) -> ActiveGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        increment_active_work_items();
        ActiveGuard(Arc::clone(&self.0))
    }
}

/// Releases one active slot when dropped, on every exit path.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
        decrement_active_work_items();
    }
}

/// A request kind the dispatcher knows how to finalize.
pub(crate) trait WorkRequest: Send + 'static {
    type Response: Send + 'static;

    /// Identity needed to build a failure report once the request has been
    /// handed to the handler.
    type Key: Send + 'static;

    const KIND: &'static str;

    fn key(&self) -> Self::Key;

    fn span(&self) -> tracing::Span;

    fn failure_response(key: Self::Key, details: TaskFailureDetails) -> Self::Response;

    /// Copies the work item's completion token onto a response that lacks
    /// one.
    fn stamp(response: &mut Self::Response, completion_token: &str);

    fn report<C: SidecarClient>(
        client: &C,
        response: Self::Response,
    ) -> impl Future<Output = Result<(), Status>> + Send;
}

impl WorkRequest for OrchestratorRequest {
    type Response = OrchestratorResponse;
    type Key = String;

    const KIND: &'static str = "orchestrator";

    fn key(&self) -> String {
        self.instance_id.clone()
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "work_item",
            kind = Self::KIND,
            instance_id = %self.instance_id,
        )
    }

    fn failure_response(instance_id: String, details: TaskFailureDetails) -> OrchestratorResponse {
        OrchestratorResponse::complete(instance_id, OrchestrationStatus::Failed, None, Some(details))
    }

    fn stamp(response: &mut OrchestratorResponse, completion_token: &str) {
        if response.completion_token.is_empty() {
            response.completion_token = completion_token.to_owned();
        }
    }

    fn report<C: SidecarClient>(
        client: &C,
        response: OrchestratorResponse,
    ) -> impl Future<Output = Result<(), Status>> + Send {
        client.complete_orchestrator_task(response)
    }
}

impl WorkRequest for ActivityRequest {
    type Response = ActivityResponse;
    type Key = (String, i32);

    const KIND: &'static str = "activity";

    fn key(&self) -> (String, i32) {
        (self.instance_id().to_owned(), self.task_id)
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "work_item",
            kind = Self::KIND,
            instance_id = %self.instance_id(),
            activity = %self.name,
            task_id = self.task_id,
        )
    }

    fn failure_response(
        (instance_id, task_id): (String, i32),
        details: TaskFailureDetails,
    ) -> ActivityResponse {
        ActivityResponse {
            instance_id,
            task_id,
            failure_details: Some(details),
            ..Default::default()
        }
    }

    fn stamp(response: &mut ActivityResponse, completion_token: &str) {
        if response.completion_token.is_empty() {
            response.completion_token = completion_token.to_owned();
        }
    }

    fn report<C: SidecarClient>(
        client: &C,
        response: ActivityResponse,
    ) -> impl Future<Output = Result<(), Status>> + Send {
        client.complete_activity_task(response)
    }
}

/// Everything a dispatch task needs, cloned once per work item.
pub(crate) struct Dispatcher<C, O, A> {
    client: C,
    orchestrator_handler: Arc<O>,
    activity_handler: Arc<A>,
    active: ActiveWorkItems,
    cancellation: CancellationToken,
}

impl<C: Clone, O, A> Clone for Dispatcher<C, O, A> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            orchestrator_handler: Arc::clone(&self.orchestrator_handler),
            activity_handler: Arc::clone(&self.activity_handler),
            active: self.active.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<C, O, A> Dispatcher<C, O, A>
where
    C: SidecarClient,
    O: WorkItemHandler<OrchestratorRequest, OrchestratorResponse>,
    A: WorkItemHandler<ActivityRequest, ActivityResponse>,
{
    pub(crate) fn new(
        client: C,
        orchestrator_handler: O,
        activity_handler: A,
        active: ActiveWorkItems,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            client,
            orchestrator_handler: Arc::new(orchestrator_handler),
            activity_handler: Arc::new(activity_handler),
            active,
            cancellation,
        }
    }

    pub(crate) async fn orchestrator(self, request: OrchestratorRequest, completion_token: String) {
        process(
            self.client,
            self.orchestrator_handler,
            self.active,
            self.cancellation,
            request,
            completion_token,
        )
        .await
    }

    pub(crate) async fn activity(self, request: ActivityRequest, completion_token: String) {
        process(
            self.client,
            self.activity_handler,
            self.active,
            self.cancellation,
            request,
            completion_token,
        )
        .await
    }
}

async fn process<C, H, R>(
    client: C,
    handler: Arc<H>,
    active: ActiveWorkItems,
    cancellation: CancellationToken,
    request: R,
    completion_token: String,
) where
    C: SidecarClient,
    H: WorkItemHandler<R, R::Response>,
    R: WorkRequest,
{
    let span = request.span();
    async move {
        let _active = active.enter();
        tracing::debug!(active = active.current(), "Processing work item");

        if cancellation.is_cancelled() {
            tracing::info!("Work item canceled before its handler ran");
            increment_abandoned_work_items(R::KIND);
            return;
        }

        let key = request.key();
        let started = Instant::now();
        // `handle` itself runs inside the guard: closure handlers may panic
        // before they return a future.
        let invocation = {
            let cancellation = cancellation.clone();
            async move { handler.handle(request, cancellation).await }
        };
        let outcome = AssertUnwindSafe(invocation).catch_unwind().await;
        record_handler_duration(R::KIND, started.elapsed().as_secs_f64() * 1_000.0);

        if cancellation.is_cancelled() {
            tracing::info!("Work item canceled while its handler ran; result discarded");
            increment_abandoned_work_items(R::KIND);
            return;
        }

        let result = outcome.unwrap_or_else(|panic| Err(HandlerError::from_panic(panic)));
        let (mut response, failure) = match result {
            Ok(response) => (response, None),
            Err(err) => {
                tracing::error!(
                    error_type = err.error_type(),
                    error = err.message(),
                    "Work item handler failed"
                );
                increment_handler_failures(R::KIND);
                let details = failure_details(&err);
                (R::failure_response(key, details.clone()), Some(details))
            }
        };
        R::stamp(&mut response, &completion_token);

        let sent = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                tracing::info!("Work item canceled before its result was reported");
                increment_abandoned_work_items(R::KIND);
                return;
            }
            sent = R::report(&client, response) => sent,
        };

        if let Err(status) = sent {
            increment_report_failures(R::KIND);
            match failure {
                None => tracing::error!(
                    code = ?status.code(),
                    error = status.message(),
                    "Failed to report work item completion"
                ),
                // The sidecar never learns about this failure; keep every
                // detail in the log.
                Some(details) => tracing::error!(
                    code = ?status.code(),
                    error = status.message(),
                    failure.error_type = %details.error_type,
                    failure.message = %details.error_message,
                    failure.stack_trace = details.stack_trace.as_deref().unwrap_or_default(),
                    "Failed to report work item failure"
                ),
            }
        }
    }
    .instrument(span)
    .await
}
