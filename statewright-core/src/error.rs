//! Core error types.

use crate::context::{CancelHandle, Context, ContextError};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Error attached to a transition by one of its callbacks.
///
/// Shared rather than boxed: a deferred transition hands the same error to the
/// caller (inside [`AsyncTransition`]) and keeps it for its remaining callbacks.
pub type CallbackError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from the state machine engine.
#[derive(Debug, Error)]
pub enum FsmError {
    #[error("event {event} does not exist")]
    UnknownEvent { event: String },

    #[error("event {event} inappropriate in current state {state}")]
    InvalidEvent { event: String, state: String },

    #[error("event {event} inappropriate because previous transition did not complete")]
    InTransition { event: String },

    #[error("transition inappropriate because no state change in progress")]
    NotInTransition,

    #[error("{}", with_cause("no transition", .err))]
    NoTransition {
        #[source]
        err: Option<CallbackError>,
    },

    #[error("{}", with_cause("transition canceled", .err))]
    Canceled {
        #[source]
        err: Option<CallbackError>,
    },

    #[error("{}", async_started(.0))]
    Async(AsyncTransition),

    #[error("internal error on state transition")]
    Internal,

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Callback(CallbackError),

    #[error("{reason}")]
    InvalidCallback { reason: String },

    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FsmError {
    /// Returns whether the same call may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FsmError::InTransition { .. })
    }

    /// Returns the error attached by a callback, if any.
    pub fn callback_error(&self) -> Option<&CallbackError> {
        match self {
            FsmError::NoTransition { err } | FsmError::Canceled { err } => err.as_ref(),
            FsmError::Async(pending) => pending.err(),
            FsmError::Callback(err) => Some(err),
            _ => None,
        }
    }

    /// Returns a stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            FsmError::UnknownEvent { .. } => "UNKNOWN_EVENT",
            FsmError::InvalidEvent { .. } => "INVALID_EVENT",
            FsmError::InTransition { .. } => "IN_TRANSITION",
            FsmError::NotInTransition => "NOT_IN_TRANSITION",
            FsmError::NoTransition { .. } => "NO_TRANSITION",
            FsmError::Canceled { .. } => "CANCELED",
            FsmError::Async(_) => "ASYNC",
            FsmError::Internal => "INTERNAL",
            FsmError::Context(_) => "CONTEXT_CANCELED",
            FsmError::Callback(_) => "CALLBACK",
            FsmError::InvalidCallback { .. } => "BAD_CALLBACK",
            FsmError::InvalidDefinition { .. } => "BAD_DEFINITION",
            FsmError::Io { .. } => "IO_ERROR",
            FsmError::Json(_) => "BAD_DEFINITION",
            FsmError::Yaml(_) => "BAD_DEFINITION",
        }
    }
}

fn async_started(pending: &AsyncTransition) -> String {
    with_cause("async started", &pending.err)
}

fn with_cause(what: &str, err: &Option<CallbackError>) -> String {
    match err {
        Some(err) => format!("{what} with error: {err}"),
        None => what.to_string(),
    }
}

/// A transition deferred by a leave callback.
///
/// Returned inside [`FsmError::Async`]. The machine keeps its current state
/// until [`Machine::transition`](crate::Machine::transition) is called. The
/// carried context is detached from the caller's: it keeps the caller's values
/// but is canceled only through [`AsyncTransition::cancel_transition`].
pub struct AsyncTransition {
    ctx: Context,
    cancel: CancelHandle,
    err: Option<CallbackError>,
}

impl AsyncTransition {
    pub(crate) fn new(ctx: Context, cancel: CancelHandle, err: Option<CallbackError>) -> Self {
        Self { ctx, cancel, err }
    }

    /// Context shared with the callbacks that will complete the transition.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Cancels the pending transition's context.
    ///
    /// Callbacks waiting on it are released. The context passed to
    /// [`Machine::event`](crate::Machine::event) is not affected.
    pub fn cancel_transition(&self) {
        self.cancel.cancel();
    }

    /// Error set by a callback before the transition was deferred.
    pub fn err(&self) -> Option<&CallbackError> {
        self.err.as_ref()
    }
}

impl fmt::Debug for AsyncTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTransition")
            .field("canceled", &self.ctx.is_done())
            .field("err", &self.err)
            .finish()
    }
}
