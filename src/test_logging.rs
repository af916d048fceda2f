//! Test logging infrastructure.
//!
//! Captures typed scheduler events with timestamps so a failing test can
//! print exactly what the dispatcher did. The pieces:
//!
//! - [`TestLogLevel`]: configurable verbosity, `TEST_LOG_LEVEL` env override
//! - [`TestEvent`]: typed events for posting, dispatch, aborts, host wakes
//! - [`TestLogger`]: captures events and renders a report
//!
//! The exported macros come in two groups: logger-backed (`test_log!`,
//! `assert_log!`, ...) and the structured phase markers used by unit tests
//! (`test_phase!`, `test_section!`, `assert_with_log!`, `test_complete!`),
//! which emit through the tracing facade.
//!
//! # Example
//!
//! ```ignore
//! use tasklane::test_logging::{TestLogger, TestLogLevel, TestEvent};
//!
//! let logger = TestLogger::new(TestLogLevel::Debug);
//! logger.log(TestEvent::TaskPosted { task: 1, priority: "user-visible", delay_ms: 0 });
//! println!("{}", logger.report());
//! ```

use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Instant;

// ============================================================================
// TestLogLevel
// ============================================================================

/// Logging verbosity level for tests.
///
/// Levels are ordered from least to most verbose:
/// `Error < Warn < Info < Debug < Trace`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TestLogLevel {
    /// Only errors and failures.
    Error,
    /// Warnings and above.
    Warn,
    /// General test progress.
    #[default]
    Info,
    /// Queue motion and host wake detail.
    Debug,
    /// Everything, including per-task dispatch.
    Trace,
}

impl TestLogLevel {
    /// Returns a human-readable name for the level.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Returns the level from the `TEST_LOG_LEVEL` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for TestLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TestLogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

// ============================================================================
// TestEvent
// ============================================================================

/// A typed scheduler event captured during a test.
#[derive(Debug, Clone)]
pub enum TestEvent {
    /// A task was submitted.
    TaskPosted {
        /// Test-assigned task number.
        task: u64,
        /// Effective priority name.
        priority: &'static str,
        /// Requested delay in milliseconds.
        delay_ms: u64,
    },
    /// A task's callback ran.
    TaskRan {
        /// Test-assigned task number.
        task: u64,
    },
    /// A task's handle was rejected by an abort.
    TaskAborted {
        /// Test-assigned task number.
        task: u64,
    },
    /// A host wake was scheduled.
    HostScheduled {
        /// The chosen callback mode.
        mode: &'static str,
    },
    /// A host wake fired.
    HostWake {
        /// The delivering callback mode.
        mode: &'static str,
    },
    /// Queued tasks migrated between priorities.
    QueueMerge {
        /// Source priority name.
        from: &'static str,
        /// Destination priority name.
        to: &'static str,
        /// Number of tasks moved.
        moved: usize,
    },
    /// A custom event.
    Custom {
        /// Event category.
        category: &'static str,
        /// Free-form message.
        message: String,
    },
    /// A warning.
    Warn {
        /// Event category.
        category: &'static str,
        /// Free-form message.
        message: String,
    },
    /// An error.
    Error {
        /// Event category.
        category: &'static str,
        /// Free-form message.
        message: String,
    },
}

impl TestEvent {
    /// The minimum level at which this event is captured.
    #[must_use]
    pub const fn level(&self) -> TestLogLevel {
        match self {
            Self::Error { .. } => TestLogLevel::Error,
            Self::Warn { .. } => TestLogLevel::Warn,
            Self::Custom { .. } => TestLogLevel::Info,
            Self::TaskPosted { .. } | Self::QueueMerge { .. } | Self::HostScheduled { .. } => {
                TestLogLevel::Debug
            }
            Self::TaskRan { .. } | Self::TaskAborted { .. } | Self::HostWake { .. } => {
                TestLogLevel::Trace
            }
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Self::TaskPosted {
                task,
                priority,
                delay_ms,
            } => {
                let _ = write!(out, "task {task} posted at {priority} (delay {delay_ms}ms)");
            }
            Self::TaskRan { task } => {
                let _ = write!(out, "task {task} ran");
            }
            Self::TaskAborted { task } => {
                let _ = write!(out, "task {task} aborted");
            }
            Self::HostScheduled { mode } => {
                let _ = write!(out, "host wake scheduled ({mode})");
            }
            Self::HostWake { mode } => {
                let _ = write!(out, "host wake fired ({mode})");
            }
            Self::QueueMerge { from, to, moved } => {
                let _ = write!(out, "merged {moved} task(s) {from} -> {to}");
            }
            Self::Custom { category, message }
            | Self::Warn { category, message }
            | Self::Error { category, message } => {
                let _ = write!(out, "[{category}] {message}");
            }
        }
    }
}

// ============================================================================
// TestLogger
// ============================================================================

/// Captures [`TestEvent`]s with elapsed timestamps and renders a report.
pub struct TestLogger {
    level: TestLogLevel,
    start: Instant,
    events: Mutex<Vec<(u128, TestEvent)>>,
}

impl TestLogger {
    /// Creates a logger capturing events at or below `level`.
    #[must_use]
    pub fn new(level: TestLogLevel) -> Self {
        Self {
            level,
            start: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Creates a logger at the level named by `TEST_LOG_LEVEL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(TestLogLevel::from_env())
    }

    /// Captures an event if it passes the level filter.
    pub fn log(&self, event: TestEvent) {
        if event.level() > self.level {
            return;
        }
        let elapsed = self.start.elapsed().as_micros();
        self.events
            .lock()
            .expect("lock poisoned")
            .push((elapsed, event));
    }

    /// Number of captured events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().expect("lock poisoned").len()
    }

    /// True if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the captured events, one line each, with microsecond offsets.
    #[must_use]
    pub fn report(&self) -> String {
        let events = self.events.lock().expect("lock poisoned");
        let mut out = String::with_capacity(events.len() * 48 + 32);
        let _ = writeln!(out, "--- test log ({} events) ---", events.len());
        for (elapsed, event) in events.iter() {
            let _ = write!(out, "{elapsed:>8}us  {:5}  ", event.level().name());
            event.render(&mut out);
            out.push('\n');
        }
        out
    }

    /// Clears all captured events.
    pub fn clear(&self) {
        self.events.lock().expect("lock poisoned").clear();
    }
}

impl Default for TestLogger {
    fn default() -> Self {
        Self::new(TestLogLevel::Info)
    }
}

// ============================================================================
// Logger-backed macros
// ============================================================================

/// Log a custom event to a test logger.
///
/// # Example
///
/// ```ignore
/// test_log!(logger, "setup", "posting {} tasks", n);
/// ```
#[macro_export]
macro_rules! test_log {
    ($logger:expr, $cat:literal, $($arg:tt)*) => {
        $logger.log($crate::test_logging::TestEvent::Custom {
            category: $cat,
            message: format!($($arg)*),
        });
    };
}

/// Log an error event to a test logger.
#[macro_export]
macro_rules! test_error {
    ($logger:expr, $cat:literal, $($arg:tt)*) => {
        $logger.log($crate::test_logging::TestEvent::Error {
            category: $cat,
            message: format!($($arg)*),
        });
    };
}

/// Log a warning event to a test logger.
#[macro_export]
macro_rules! test_warn {
    ($logger:expr, $cat:literal, $($arg:tt)*) => {
        $logger.log($crate::test_logging::TestEvent::Warn {
            category: $cat,
            message: format!($($arg)*),
        });
    };
}

/// Assert a condition, printing the full log on failure.
#[macro_export]
macro_rules! assert_log {
    ($logger:expr, $cond:expr) => {
        if !$cond {
            eprintln!("{}", $logger.report());
            panic!("assertion failed: {}", stringify!($cond));
        }
    };
    ($logger:expr, $cond:expr, $($arg:tt)*) => {
        if !$cond {
            eprintln!("{}", $logger.report());
            panic!($($arg)*);
        }
    };
}

/// Assert equality, printing the full log on failure.
#[macro_export]
macro_rules! assert_eq_log {
    ($logger:expr, $left:expr, $right:expr) => {
        if $left != $right {
            eprintln!("{}", $logger.report());
            panic!(
                "assertion failed: `(left == right)`\n  left: {:?}\n right: {:?}",
                $left, $right
            );
        }
    };
}

// ============================================================================
// Phase-marker macros (unit-test structure)
// ============================================================================

/// Marks the start of a test in structured logs.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::tracing_compat::info!(test = $name, "=== TEST START ===");
    };
}

/// Marks a section inside a test.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        $crate::tracing_compat::info!(section = $name, "--- section ---");
    };
}

/// Marks a test as complete, with optional summary fields.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::tracing_compat::info!(test = $name, "=== TEST COMPLETE ===");
    };
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        $crate::tracing_compat::info!(test = $name, $($key = $value,)+ "=== TEST COMPLETE ===");
    };
}

/// Assertion with structured logging on failure.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            $crate::tracing_compat::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(TestLogLevel::Error < TestLogLevel::Warn);
        assert!(TestLogLevel::Warn < TestLogLevel::Info);
        assert!(TestLogLevel::Info < TestLogLevel::Debug);
        assert!(TestLogLevel::Debug < TestLogLevel::Trace);
    }

    #[test]
    fn level_from_str() {
        assert_eq!("error".parse(), Ok(TestLogLevel::Error));
        assert_eq!("WARN".parse(), Ok(TestLogLevel::Warn));
        assert_eq!("warning".parse(), Ok(TestLogLevel::Warn));
        assert_eq!("info".parse(), Ok(TestLogLevel::Info));
        assert_eq!("debug".parse(), Ok(TestLogLevel::Debug));
        assert_eq!("trace".parse(), Ok(TestLogLevel::Trace));
        assert_eq!("loud".parse::<TestLogLevel>(), Err(()));
    }

    #[test]
    fn logger_filters_by_level() {
        let logger = TestLogger::new(TestLogLevel::Info);
        logger.log(TestEvent::TaskRan { task: 1 }); // trace: filtered
        logger.log(TestEvent::Custom {
            category: "setup",
            message: "kept".into(),
        });
        assert_eq!(logger.len(), 1);
    }

    #[test]
    fn report_renders_all_events() {
        let logger = TestLogger::new(TestLogLevel::Trace);
        logger.log(TestEvent::TaskPosted {
            task: 3,
            priority: "background",
            delay_ms: 2,
        });
        logger.log(TestEvent::QueueMerge {
            from: "user-visible",
            to: "user-blocking",
            moved: 1,
        });
        let report = logger.report();
        assert!(report.contains("task 3 posted at background (delay 2ms)"), "{report}");
        assert!(report.contains("merged 1 task(s) user-visible -> user-blocking"), "{report}");
    }

    #[test]
    fn clear_empties_logger() {
        let logger = TestLogger::new(TestLogLevel::Trace);
        logger.log(TestEvent::HostWake { mode: "immediate" });
        assert!(!logger.is_empty());
        logger.clear();
        assert!(logger.is_empty());
    }
}
