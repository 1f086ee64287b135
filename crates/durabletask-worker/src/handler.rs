//! Handler bindings supplied by the worker host.
//!
//! The protocol handler owns no business semantics: for each work item it
//! calls one of two [`WorkItemHandler`]s, one per item kind, and reports
//! whatever comes back.
//!
//! ## Cancellation
//!
//! Each call receives the connection's linked [`CancellationToken`].
//! Cancellation is cooperative only. A handler that ignores the token runs to
//! completion after shutdown was requested; its result is then discarded
//! rather than reported. `ProtocolHandler::start` waits for every running
//! handler before returning, even after a transport failure, so a handler
//! must either finish in bounded time or watch its token.

use durabletask_worker_core::HandlerError;
use tokio_util::sync::CancellationToken;

/// Asynchronous handler for one kind of work item.
///
/// Implemented for any `Fn(Req, CancellationToken) -> impl Future<Output =
/// Result<Resp, HandlerError>>`, so plain closures and `async fn`s work:
///
/// ```
/// use durabletask_worker::handler::WorkItemHandler;
/// use durabletask_worker::proto::{ActivityRequest, ActivityResponse};
/// use durabletask_worker::HandlerError;
/// use tokio_util::sync::CancellationToken;
///
/// async fn echo(
///     request: ActivityRequest,
///     _cancel: CancellationToken,
/// ) -> Result<ActivityResponse, HandlerError> {
///     Ok(ActivityResponse {
///         instance_id: request.instance_id().to_owned(),
///         task_id: request.task_id,
///         result: request.input,
///         ..Default::default()
///     })
/// }
///
/// fn assert_handler<H: WorkItemHandler<ActivityRequest, ActivityResponse>>(_: H) {}
/// assert_handler(echo);
/// ```
pub trait WorkItemHandler<Req, Resp>: Send + Sync + 'static {
    fn handle(
        &self,
        request: Req,
        cancellation: CancellationToken,
    ) -> impl Future<Output = Result<Resp, HandlerError>> + Send;
}

impl<F, Fut, Req, Resp> WorkItemHandler<Req, Resp> for F
where
    F: Fn(Req, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send,
{
    fn handle(
        &self,
        request: Req,
        cancellation: CancellationToken,
    ) -> impl Future<Output = Result<Resp, HandlerError>> + Send {
        self(request, cancellation)
    }
}
