//! Error types used by the controller runtime and by reconcilers.
//!
//! This module defines the error enums of the crate:
//!
//! - [`ControllerError`]: construction, registration and lifecycle failures of a controller.
//! - [`ReconcileError`]: failures returned by user reconciliation logic (never fatal).
//! - [`InjectError`]: dependency injection into a reconciler failed.
//! - [`SourceError`]: a watch source could not start or broke down.
//! - [`ManagerError`]: failures surfaced by [`Manager::start`](crate::Manager::start).
//!
//! Each type provides `as_label` returning a short stable snake_case label for logs.

use thiserror::Error;

use crate::core::LifecycleState;

/// # Errors produced by a controller.
///
/// Construction errors ([`Validation`](ControllerError::Validation),
/// [`Injection`](ControllerError::Injection), [`DuplicateName`](ControllerError::DuplicateName))
/// are returned synchronously from [`Controller::new`](crate::Controller::new) and leave no
/// controller behind. Lifecycle errors are returned by `watch` / `start`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Bad construction input (missing name or reconciler).
    #[error("{message}")]
    Validation {
        /// Name of the offending option.
        field: &'static str,
        /// Human-readable description.
        message: String,
    },

    /// Injecting dependencies into the reconciler failed.
    #[error("failed to inject dependencies into reconciler: {0}")]
    Injection(#[from] InjectError),

    /// A controller with this name is already registered with the manager.
    #[error("controller with name {name:?} already exists")]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// Operation is not allowed in the current lifecycle state.
    #[error("cannot {op} controller in state {state}")]
    InvalidState {
        /// Operation that was attempted.
        op: &'static str,
        /// State observed at the time of the call.
        state: LifecycleState,
    },

    /// `start` was called more than once.
    #[error("controller {name:?} was already started")]
    AlreadyStarted {
        /// Controller name.
        name: String,
    },

    /// A registered source failed; the whole controller was stopped.
    #[error("source {source_name:?} failed: {error}")]
    SourceStart {
        /// Name of the failing source.
        source_name: String,
        /// Error reported by the source.
        #[source]
        error: SourceError,
    },
}

impl ControllerError {
    pub(crate) fn missing(field: &'static str, what: &str) -> Self {
        ControllerError::Validation {
            field,
            message: format!("must specify {field} for {what}"),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ctrlvisor::ControllerError;
    ///
    /// let err = ControllerError::DuplicateName { name: "pods".into() };
    /// assert_eq!(err.as_label(), "controller_duplicate_name");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::Validation { .. } => "controller_validation",
            ControllerError::Injection(_) => "controller_injection",
            ControllerError::DuplicateName { .. } => "controller_duplicate_name",
            ControllerError::InvalidState { .. } => "controller_invalid_state",
            ControllerError::AlreadyStarted { .. } => "controller_already_started",
            ControllerError::SourceStart { .. } => "controller_source_failed",
        }
    }

    /// True for errors returned by `Controller::new`.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            ControllerError::Validation { .. }
                | ControllerError::Injection(_)
                | ControllerError::DuplicateName { .. }
        )
    }
}

/// # Errors produced by reconciliation logic.
///
/// These never stop the controller: every failure is reported on the event bus and the key
/// is requeued with rate-limited backoff (except [`ReconcileError::Canceled`]).
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    /// Reconciliation failed and should be retried.
    #[error("reconcile failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Reconciler observed shutdown and gave up; the key is not requeued.
    #[error("reconcile cancelled")]
    Canceled,

    /// Reconciler panicked; the panic was caught and the key is retried.
    #[error("reconciler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl ReconcileError {
    /// Wraps any displayable error as a retryable failure.
    ///
    /// # Example
    /// ```
    /// use ctrlvisor::ReconcileError;
    ///
    /// let err = ReconcileError::fail("connection refused");
    /// assert_eq!(err.to_string(), "reconcile failed: connection refused");
    /// ```
    pub fn fail(error: impl std::fmt::Display) -> Self {
        ReconcileError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReconcileError::Fail { .. } => "reconcile_failed",
            ReconcileError::Canceled => "reconcile_canceled",
            ReconcileError::Panicked { .. } => "reconcile_panicked",
        }
    }

    /// Indicates whether the key should be requeued with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::Fail { .. } | ReconcileError::Panicked { .. }
        )
    }
}

/// Error returned by an [`Inject`](crate::Inject) implementation.
///
/// The message is kept verbatim so construction failures show the dependency's own reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct InjectError {
    message: String,
}

impl InjectError {
    /// Creates an injection error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Convenience for a dependency that the manager does not provide.
    pub fn missing<T: ?Sized>() -> Self {
        Self::new(format!(
            "dependency {} is not provided by the manager",
            std::any::type_name::<T>()
        ))
    }

    /// The original message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// # Errors produced by watch sources.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source was started twice (e.g. a channel source whose receiver was already taken).
    #[error("source already started")]
    AlreadyStarted,

    /// The source could not be started or its upstream broke.
    #[error("{error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },
}

impl SourceError {
    /// Wraps any displayable error.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        SourceError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SourceError::AlreadyStarted => "source_already_started",
            SourceError::Failed { .. } => "source_failed",
        }
    }
}

/// # Errors produced by the manager.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ManagerError {
    /// A controller stopped with an error; all other controllers were stopped too.
    #[error("controller {name:?} failed: {error}")]
    Controller {
        /// Name of the failing controller.
        name: String,
        /// The controller's error.
        #[source]
        error: ControllerError,
    },

    /// `start` was called on a manager that already ran.
    #[error("manager was already started")]
    AlreadyStarted,

    /// Installing OS signal handlers failed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
}

impl ManagerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::Controller { .. } => "manager_controller_failed",
            ManagerError::AlreadyStarted => "manager_already_started",
            ManagerError::Signal(_) => "manager_signal",
        }
    }
}
