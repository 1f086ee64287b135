//! # `durabletask-worker`: work-item dispatch for durable task workers
//!
//! This crate is the client side of the durable task work-item protocol. A
//! worker opens one server-streaming `GetWorkItems` call against the sidecar,
//! receives orchestrator and activity work items, runs user handlers against
//! them concurrently, and reports each outcome through an independent unary
//! completion call.
//!
//! ## Highlights
//!
//! - **One reader, many workers**: the receive loop never waits on a
//!   dispatched item before reading the next one.
//! - **Contained failures**: a handler error or panic becomes a failure
//!   report; a report that cannot be delivered is logged and dropped. Only a
//!   broken stream ends the connection.
//! - **Clean shutdown**: caller and disposal cancellation are linked, and
//!   every dispatched item reaches a terminal outcome before `start` returns.
//!
//! ## Module Overview
//!
//! - [`protocol`] - the [`ProtocolHandler`](protocol::ProtocolHandler)
//!   lifecycle, receive loop, and item dispatcher.
//! - [`handler`] - the [`WorkItemHandler`](handler::WorkItemHandler) binding
//!   implemented by user code.
//! - [`client`] - the [`SidecarClient`](client::SidecarClient) seam and its
//!   gRPC implementation.
//! - [`config`] - CLI/environment configuration for worker hosts.
//! - [`telemetry`] - logging and optional OpenTelemetry export.

pub mod client;
pub mod config;
pub mod handler;
pub mod protocol;
pub mod telemetry;

pub use durabletask_worker_core::{Error, HandlerError, Result, proto};
