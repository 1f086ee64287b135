//! # Handler failures and their wire representation
//!
//! [`HandlerError`] is what a work-item handler returns when it cannot produce
//! a response. Any `std::error::Error` converts into it, so handlers can use
//! `?` freely; the concrete error type name is recorded at conversion time
//! because it is lost once the value is erased.
//!
//! [`failure_details`] is the Failure Translator: a pure mapping from a
//! [`HandlerError`] to the [`TaskFailureDetails`] that is sent to the sidecar.

use crate::proto::TaskFailureDetails;
use core::any::Any;
use core::fmt;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;

/// Error type reported when a handler panics instead of returning.
pub const PANIC_ERROR_TYPE: &str = "panic";

/// Fallback used when a failure carries no type name.
pub const DEFAULT_ERROR_TYPE: &str = "Error";

/// A failure raised by a work-item handler.
///
/// Deliberately does not implement `std::error::Error` so that the blanket
/// `From<E: Error>` conversion stays coherent.
#[derive(Debug, Clone)]
pub struct HandlerError {
    error_type: Cow<'static, str>,
    message: String,
    stack_trace: Option<String>,
}

impl HandlerError {
    /// Creates a failure with an explicit type name and message.
    pub fn new(error_type: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            stack_trace: None,
        }
    }

    /// Creates a failure from a bare message, typed as `HandlerError`.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(core::any::type_name::<Self>(), message)
    }

    /// Builds a failure from a caught panic payload.
    ///
    /// `panic!` payloads are either `&'static str` or `String`; anything else
    /// is reported with a generic message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "handler panicked with a non-string payload".to_owned(),
            },
        };
        Self::new(PANIC_ERROR_TYPE, message)
    }

    /// Attaches a stack trace, replacing any captured one.
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self {
            error_type: Cow::Borrowed(core::any::type_name::<E>()),
            message: err.to_string(),
            stack_trace: captured_backtrace(),
        }
    }
}

/// Only yields a trace when capture is enabled through `RUST_BACKTRACE` or
/// `RUST_LIB_BACKTRACE`.
fn captured_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

/// Translates a handler failure into the wire-level failure details.
pub fn failure_details(err: &HandlerError) -> TaskFailureDetails {
    let error_type = if err.error_type.is_empty() {
        DEFAULT_ERROR_TYPE.to_owned()
    } else {
        err.error_type.clone().into_owned()
    };

    TaskFailureDetails {
        error_type,
        error_message: err.message.clone(),
        stack_trace: err.stack_trace.clone(),
        inner_failure: None,
        is_non_retriable: false,
    }
}

impl From<&HandlerError> for TaskFailureDetails {
    fn from(err: &HandlerError) -> Self {
        failure_details(err)
    }
}
