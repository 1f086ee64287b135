use super::{
    dispatcher::{ActiveWorkItems, Dispatcher},
    receiver::receive_loop,
};
use crate::{client::SidecarClient, handler::WorkItemHandler};
use durabletask_worker_core::{
    Error, Result,
    proto::{ActivityRequest, ActivityResponse, OrchestratorRequest, OrchestratorResponse},
    types::ConcurrencyHints,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Owns one work-item stream and its cancellation.
///
/// A `ProtocolHandler` is started once and disposed once. Caller-supplied
/// cancellation and [`dispose`](Self::dispose) both stop the receive loop;
/// either way `start` returns `Ok(())` after every dispatched item has
/// finished or been abandoned.
///
/// Only transport failures of the stream itself are returned as errors.
/// Reconnecting is up to the caller.
#[derive(Debug)]
pub struct ProtocolHandler<C> {
    client: C,
    hints: ConcurrencyHints,
    disposal: CancellationToken,
    disposed: AtomicBool,
    started: AtomicBool,
    active: ActiveWorkItems,
}

impl<C: SidecarClient> ProtocolHandler<C> {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] unless both hints are strictly
    /// positive.
    pub fn new(
        client: C,
        max_concurrent_work_items: i32,
        max_concurrent_activities: i32,
    ) -> Result<Self> {
        let hints = ConcurrencyHints::new(max_concurrent_work_items, max_concurrent_activities)?;
        Ok(Self::with_hints(client, hints))
    }

    pub fn with_hints(client: C, hints: ConcurrencyHints) -> Self {
        Self {
            client,
            hints,
            disposal: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            active: ActiveWorkItems::default(),
        }
    }

    pub fn hints(&self) -> ConcurrencyHints {
        self.hints
    }

    /// Dispatches currently running a handler or sending a report.
    pub fn active_work_items(&self) -> usize {
        self.active.current()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Opens the work-item stream and processes items until it ends.
    ///
    /// Returns `Ok(())` when the sidecar closes the stream or when
    /// `cancellation` or [`dispose`](Self::dispose) stops it. Every
    /// dispatched item has reached a terminal outcome by the time this
    /// returns, including on error.
    ///
    /// A transport failure does not cancel running handlers: they finish and
    /// report before the error is returned. Handlers must therefore complete
    /// in bounded time or observe their token. One that does neither holds
    /// back the error, and the caller's reconnect, indefinitely; cancelling
    /// `cancellation` or calling [`dispose`](Self::dispose) only helps
    /// handlers that watch the token.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] on a second call.
    /// - [`Error::Transport`] if the stream could not be opened or broke
    ///   while reading.
    pub async fn start<O, A>(
        &self,
        orchestrator_handler: O,
        activity_handler: A,
        cancellation: CancellationToken,
    ) -> Result<()>
    where
        O: WorkItemHandler<OrchestratorRequest, OrchestratorResponse>,
        A: WorkItemHandler<ActivityRequest, ActivityResponse>,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let linked = self.disposal.child_token();
        // Cancels the forwarder below even if this future is dropped early.
        let linked_guard = linked.clone().drop_guard();
        if cancellation.is_cancelled() {
            linked.cancel();
        }
        let forwarder = {
            let linked = linked.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancellation.cancelled() => linked.cancel(),
                    _ = linked.cancelled() => {}
                }
            })
        };

        tracing::info!(
            max_concurrent_work_items = self.hints.max_concurrent_work_items(),
            max_concurrent_activities = self.hints.max_concurrent_activities(),
            "Starting work item stream with sidecar"
        );

        let result = self
            .run(orchestrator_handler, activity_handler, &linked)
            .await;

        drop(linked_guard);
        if let Err(e) = forwarder.await {
            tracing::warn!(error = %e, "Cancellation forwarder ended abnormally");
        }

        match result {
            Err(e) if e.is_cancelled() => {
                tracing::info!("Work item stream canceled");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Error in protocol handler");
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    async fn run<O, A>(
        &self,
        orchestrator_handler: O,
        activity_handler: A,
        linked: &CancellationToken,
    ) -> Result<()>
    where
        O: WorkItemHandler<OrchestratorRequest, OrchestratorResponse>,
        A: WorkItemHandler<ActivityRequest, ActivityResponse>,
    {
        let stream = tokio::select! {
            biased;
            _ = linked.cancelled() => {
                return Err(Status::cancelled("work item stream canceled before it opened").into());
            }
            opened = self.client.get_work_items(self.hints.to_request()) => opened?,
        };

        let dispatcher = Dispatcher::new(
            self.client.clone(),
            orchestrator_handler,
            activity_handler,
            self.active.clone(),
            linked.clone(),
        );

        receive_loop(stream, dispatcher, self.hints.prune_threshold(), linked).await
    }

    /// Stops the receive loop and releases the stream.
    ///
    /// Idempotent and safe to call concurrently with [`start`](Self::start);
    /// only the first call has any effect.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::info!("Disposing protocol handler");
        self.disposal.cancel();
        tracing::info!("Protocol handler disposed");
    }
}
