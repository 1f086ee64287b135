//! Error types for the work-item worker.
//!
//! Only a narrow set of failures ever crosses the protocol handler boundary.
//! Per-item failures (a handler returning an error, a completion report that
//! could not be delivered) are contained inside the dispatcher and never show
//! up here.
//!
//! ## Error Cases
//! - `InvalidConfiguration`: A setting was rejected while building the worker.
//! - `Transport`: The work-item stream could not be opened or broke while
//!   reading. A `Cancelled` status is the expected way a stream stops.
//! - `Connect`: The gRPC channel to the sidecar could not be established.
//! - `AlreadyStarted`: `start` was invoked on a protocol handler twice.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the work-item worker.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A configuration value was out of range or malformed.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The work-item stream failed or was cancelled.
    #[error("Work item stream error: {0}")]
    Transport(#[from] Status),

    /// The channel to the sidecar could not be established.
    #[error("Failed to connect to sidecar: {0}")]
    Connect(#[from] tonic::transport::Error),

    /// The protocol handler only supports a single `start`.
    #[error("Protocol handler has already been started")]
    AlreadyStarted,
}

impl Error {
    /// Returns `true` for the transport-cancelled class of errors, which mark
    /// a clean stop rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Transport(status) if status.code() == Code::Cancelled)
    }

    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}
