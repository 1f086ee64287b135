use super::{dispatcher::Dispatcher, registry::InFlight};
use crate::{
    client::{SidecarClient, WorkItemStream},
    handler::WorkItemHandler,
    telemetry::{increment_unknown_work_items, increment_work_items_received},
};
use durabletask_worker_core::{
    Result,
    proto::{
        ActivityRequest, ActivityResponse, OrchestratorRequest, OrchestratorResponse,
        work_item::Request,
    },
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};

/// Reads the work-item stream until it ends, fails, or `cancellation` fires.
///
/// Each orchestrator or activity item is spawned into the in-flight registry
/// and the loop moves straight on to the next read. Other kinds are logged
/// and skipped.
///
/// Whatever ends the loop, the stream is dropped first and then every
/// outstanding dispatch is awaited. A cancelled exit surfaces as a
/// `Cancelled` transport error, which the caller treats as a clean stop.
pub(crate) async fn receive_loop<C, O, A>(
    mut stream: WorkItemStream,
    dispatcher: Dispatcher<C, O, A>,
    prune_threshold: usize,
    cancellation: &CancellationToken,
) -> Result<()>
where
    C: SidecarClient,
    O: WorkItemHandler<OrchestratorRequest, OrchestratorResponse>,
    A: WorkItemHandler<ActivityRequest, ActivityResponse>,
{
    let mut in_flight = InFlight::new(prune_threshold);
    let mut received: u64 = 0;

    let outcome: core::result::Result<(), Status> = loop {
        let next = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                break Err(Status::cancelled("work item stream canceled"));
            }
            next = stream.next() => next,
        };

        let item = match next {
            Some(Ok(item)) => item,
            Some(Err(status)) => break Err(status),
            None => break Ok(()),
        };

        let kind = item.kind();
        increment_work_items_received(kind);
        match item.request {
            Some(Request::OrchestratorRequest(request)) => {
                received += 1;
                in_flight.spawn(
                    dispatcher
                        .clone()
                        .orchestrator(request, item.completion_token),
                );
            }
            Some(Request::ActivityRequest(request)) => {
                received += 1;
                in_flight.spawn(dispatcher.clone().activity(request, item.completion_token));
            }
            Some(Request::HealthPing(_)) => tracing::trace!("Received health ping"),
            None => {
                tracing::warn!(kind, "Received unknown work item type");
                increment_unknown_work_items();
            }
        }
    };

    drop(stream);

    match &outcome {
        Ok(()) => tracing::info!(
            received,
            outstanding = in_flight.len(),
            "Receive loop completed"
        ),
        Err(status) if status.code() == Code::Cancelled => tracing::info!(
            received,
            outstanding = in_flight.len(),
            "Receive loop canceled"
        ),
        Err(status) => tracing::error!(
            code = ?status.code(),
            error = status.message(),
            outstanding = in_flight.len(),
            "Error in receive loop"
        ),
    }

    in_flight.drain().await;
    outcome.map_err(Into::into)
}
