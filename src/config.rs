//! Scheduler configuration.
//!
//! This module provides:
//! - Typed configuration with validation
//! - Host capability toggles (which event-loop primitives to advertise)
//! - Layered loading (defaults + environment overrides)
//!
//! Environment parsing is deliberately forgiving: an unreadable value is
//! logged and ignored rather than failing startup.

use crate::error::Error;
use crate::tracing_compat::warn;
use core::fmt;

/// Which event-loop primitives a host advertises.
///
/// The timer primitive is always available and has no toggle; disabling
/// the others exercises the host-callback fallback chain
/// (idle → immediate → timer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Advertise the immediate-tick primitive.
    pub immediate: bool,
    /// Advertise the idle-time primitive.
    pub idle: bool,
}

impl HostCapabilities {
    /// Every primitive available.
    pub const FULL: Self = Self {
        immediate: true,
        idle: true,
    };

    /// Timer-only host, the minimal contract.
    pub const TIMER_ONLY: Self = Self {
        immediate: false,
        idle: false,
    };
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::FULL
    }
}

/// Top-level scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Host capability toggles.
    pub capabilities: HostCapabilities,
    /// Initial capacity of the task arena.
    pub task_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capabilities: HostCapabilities::default(),
            task_capacity: 32,
        }
    }
}

impl SchedulerConfig {
    /// Validates the configuration for basic sanity.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_capacity == 0 {
            return Err(ConfigError::ZeroTaskCapacity);
        }
        Ok(())
    }

    /// Builds a configuration from defaults plus environment overrides.
    ///
    /// Recognized variables:
    /// - `TASKLANE_NO_IDLE` — truthy disables the idle primitive
    /// - `TASKLANE_NO_IMMEDIATE` — truthy disables the immediate primitive
    /// - `TASKLANE_TASK_CAPACITY` — initial task arena capacity
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if env_flag("TASKLANE_NO_IDLE") {
            config.capabilities.idle = false;
        }
        if env_flag("TASKLANE_NO_IMMEDIATE") {
            config.capabilities.immediate = false;
        }
        if let Some(raw) = std::env::var_os("TASKLANE_TASK_CAPACITY") {
            match raw.to_str().and_then(|s| s.parse::<usize>().ok()) {
                Some(capacity) if capacity > 0 => config.task_capacity = capacity,
                _ => {
                    warn!(
                        value = ?raw,
                        "ignoring invalid TASKLANE_TASK_CAPACITY"
                    );
                }
            }
        }
        config
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            let v = v.trim();
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(false)
}

/// Configuration validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `task_capacity` must be at least 1.
    ZeroTaskCapacity,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroTaskCapacity => write!(f, "task_capacity must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capabilities, HostCapabilities::FULL);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = SchedulerConfig {
            task_capacity: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTaskCapacity));
        let err: Error = ConfigError::ZeroTaskCapacity.into();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn capability_presets() {
        assert!(HostCapabilities::FULL.idle);
        assert!(HostCapabilities::FULL.immediate);
        assert!(!HostCapabilities::TIMER_ONLY.idle);
        assert!(!HostCapabilities::TIMER_ONLY.immediate);
    }
}
