//! The sidecar seam: opening the work-item stream and reporting completions.
//!
//! [`SidecarClient`] is the boundary the protocol handler talks through. The
//! two completion methods are the Completion Reporter: plain pass-through
//! unary calls, no retries. A slow completion never stalls the receive loop
//! because each one is awaited from its own dispatch task.
//!
//! [`GrpcSidecarClient`] is the production implementation over a tonic
//! [`Channel`].

use crate::config::WorkerConfig;
use core::pin::Pin;
use durabletask_worker_core::{
    Error,
    proto::{
        ActivityResponse, GetWorkItemsRequest, OrchestratorResponse, WorkItem,
        task_hub_sidecar_service_client::TaskHubSidecarServiceClient,
    },
};
use futures::StreamExt;
use tokio_stream::Stream;
use tonic::{Status, transport::Channel};

/// The inbound stream of work items.
pub type WorkItemStream = Pin<Box<dyn Stream<Item = Result<WorkItem, Status>> + Send>>;

/// Transport used by the protocol handler.
///
/// Implementations must be cheap to clone; every dispatch task holds its own
/// copy.
pub trait SidecarClient: Clone + Send + Sync + 'static {
    /// Opens the server-streaming `GetWorkItems` call.
    fn get_work_items(
        &self,
        request: GetWorkItemsRequest,
    ) -> impl Future<Output = Result<WorkItemStream, Status>> + Send;

    /// Reports the outcome of one orchestrator turn.
    fn complete_orchestrator_task(
        &self,
        response: OrchestratorResponse,
    ) -> impl Future<Output = Result<(), Status>> + Send;

    /// Reports the outcome of one activity invocation.
    fn complete_activity_task(
        &self,
        response: ActivityResponse,
    ) -> impl Future<Output = Result<(), Status>> + Send;
}

/// [`SidecarClient`] backed by the generated-style tonic client.
#[derive(Debug, Clone)]
pub struct GrpcSidecarClient {
    inner: TaskHubSidecarServiceClient<Channel>,
}

impl GrpcSidecarClient {
    /// Wraps an already-established channel.
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: TaskHubSidecarServiceClient::new(channel),
        }
    }

    /// Connects to the sidecar described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the address is not a valid
    /// URI, and [`Error::Connect`] if the sidecar is unreachable within the
    /// connect timeout.
    pub async fn connect(config: &WorkerConfig) -> Result<Self, Error> {
        let channel = Channel::from_shared(config.sidecar_address.clone())
            .map_err(|e| {
                Error::invalid_configuration(format!(
                    "invalid sidecar address `{}`: {e}",
                    config.sidecar_address
                ))
            })?
            .connect_timeout(config.connect_timeout)
            .http2_keep_alive_interval(config.keep_alive_interval)
            .keep_alive_while_idle(true)
            .connect()
            .await?;

        tracing::debug!(address = %config.sidecar_address, "Connected to sidecar");
        Ok(Self::new(channel))
    }
}

impl SidecarClient for GrpcSidecarClient {
    async fn get_work_items(
        &self,
        request: GetWorkItemsRequest,
    ) -> Result<WorkItemStream, Status> {
        let stream = self
            .inner
            .clone()
            .get_work_items(request)
            .await?
            .into_inner();
        Ok(stream.boxed())
    }

    async fn complete_orchestrator_task(
        &self,
        response: OrchestratorResponse,
    ) -> Result<(), Status> {
        self.inner
            .clone()
            .complete_orchestrator_task(response)
            .await
            .map(|_| ())
    }

    async fn complete_activity_task(
        &self,
        response: ActivityResponse,
    ) -> Result<(), Status> {
        self.inner
            .clone()
            .complete_activity_task(response)
            .await
            .map(|_| ())
    }
}
