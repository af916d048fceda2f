//! Error types and error handling strategy for tasklane.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Callback panics are isolated and surfaced as [`ErrorKind::CallbackPanicked`];
//!   they never unwind through the dispatcher
//! - Abort reasons propagate verbatim: [`Error::aborted`] carries the exact
//!   [`AbortReason`] the signal was aborted with
//!
//! # Error Categories
//!
//! - **Validation**: programmer errors at the dynamic boundary (priority
//!   parsing, configuration)
//! - **NotAllowed**: operations rejected by protocol, such as re-entrant
//!   `set_priority` from inside a `prioritychange` listener
//! - **Cancellation**: the task's signal was aborted
//! - **Execution**: the user callback panicked
//! - **Internal**: scheduler misuse or bugs

use crate::signal::AbortReason;
use core::fmt;
use std::any::Any;
use std::rc::Rc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Validation ===
    /// A priority string did not name a known priority.
    InvalidPriority,
    /// A delay value was not usable (reserved for config/string boundaries;
    /// in-process delays are unsigned by construction).
    InvalidDelay,
    /// A signal value was not usable as a cancellation signal.
    InvalidSignal,
    /// Configuration was invalid.
    ConfigError,

    // === NotAllowed ===
    /// `set_priority` was called from inside a `prioritychange` listener.
    PriorityChangeInProgress,

    // === Cancellation ===
    /// The task's signal was aborted.
    Aborted,

    // === Execution ===
    /// The user callback panicked.
    CallbackPanicked,

    // === Internal ===
    /// No scheduler is installed on this thread.
    NoScheduler,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPriority | Self::InvalidDelay | Self::InvalidSignal | Self::ConfigError => {
                ErrorCategory::Validation
            }
            Self::PriorityChangeInProgress => ErrorCategory::NotAllowed,
            Self::Aborted => ErrorCategory::Cancellation,
            Self::CallbackPanicked => ErrorCategory::Execution,
            Self::NoScheduler => ErrorCategory::Internal,
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Programmer errors at the dynamic boundary.
    Validation,
    /// Operations rejected by protocol.
    NotAllowed,
    /// Signal-driven cancellation.
    Cancellation,
    /// User callback failures.
    Execution,
    /// Scheduler misuse or bugs.
    Internal,
}

/// The main error type for scheduler operations.
///
/// Settled task handles reject with this type: validation failures reject
/// synchronously, aborts carry the signal's reason, and callback panics carry
/// the panic payload.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    reason: Option<AbortReason>,
    panic: Option<Rc<dyn Any>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            reason: None,
            panic: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if this error represents an abort.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self.kind, ErrorKind::Aborted)
    }

    /// Returns the abort reason, when the error carries one.
    ///
    /// The reason is the exact value the signal was aborted with; equality
    /// is payload identity, so this round-trips through the scheduler
    /// unchanged.
    #[must_use]
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.reason.as_ref()
    }

    /// Returns the captured panic payload, when the error carries one.
    #[must_use]
    pub fn panic_payload(&self) -> Option<&dyn Any> {
        self.panic.as_deref()
    }

    /// Creates an invalid-priority error for an unknown priority name.
    #[must_use]
    pub fn invalid_priority(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::InvalidPriority).with_message(format!("unknown priority {name:?}"))
    }

    /// Creates an invalid-delay error.
    #[must_use]
    pub fn invalid_delay(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDelay).with_message(detail)
    }

    /// Creates an invalid-signal error.
    #[must_use]
    pub fn invalid_signal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSignal).with_message(detail)
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigError).with_message(detail)
    }

    /// Creates the re-entrant `set_priority` rejection.
    #[must_use]
    pub fn priority_change_in_progress() -> Self {
        Self::new(ErrorKind::PriorityChangeInProgress)
            .with_message("set_priority called from inside a prioritychange listener")
    }

    /// Creates an abort error carrying the signal's reason verbatim.
    #[must_use]
    pub fn aborted(reason: AbortReason) -> Self {
        let mut err = Self::new(ErrorKind::Aborted).with_message(reason.description().to_owned());
        err.reason = Some(reason);
        err
    }

    /// Creates an execution error from a caught callback panic.
    #[must_use]
    pub fn callback_panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref())
            .map_or_else(|| "callback panicked".to_owned(), ToOwned::to_owned);
        let mut err = Self::new(ErrorKind::CallbackPanicked).with_message(message);
        let payload: Box<dyn Any> = payload;
        err.panic = Some(Rc::from(payload));
        err
    }

    /// Creates the no-installed-scheduler error.
    #[must_use]
    pub fn no_scheduler() -> Self {
        Self::new(ErrorKind::NoScheduler).with_message("no scheduler installed on this thread")
    }
}

/// Extracts a human-readable message from a panic payload, when possible.
fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Error");
        s.field("kind", &self.kind);
        if let Some(msg) = &self.message {
            s.field("message", msg);
        }
        s.finish_non_exhaustive()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for scheduler operations.
pub type Result<T> = core::result::Result<T, Error>;
