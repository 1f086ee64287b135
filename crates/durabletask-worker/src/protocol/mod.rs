//! # Work-item protocol handler
//!
//! One reader, many workers: [`ProtocolHandler::start`] opens the
//! `GetWorkItems` stream and a single receive loop reads it. Every
//! orchestrator or activity item is forked into its own dispatch task, so a
//! slow handler never delays the next read.
//!
//! ## Structure
//!
//! - `connection` - [`ProtocolHandler`]: stream ownership, linked
//!   cancellation, idempotent disposal.
//! - `receiver` - the receive loop: classify, spawn, prune, drain.
//! - `dispatcher` - one handler invocation and its completion report.
//! - `registry` - the in-flight set of dispatch tasks.
//!
//! ## Concurrency hints
//!
//! The configured maxima are sent to the sidecar and are not enforced
//! locally. They only size the registry's pruning threshold.

mod connection;
mod dispatcher;
mod receiver;
mod registry;


pub use connection::ProtocolHandler;
