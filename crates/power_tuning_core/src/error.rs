use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single power value inside a lifecycle batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PowerValueFailure {
    pub power_value: u32,
    pub message: String,
    /// Published version that could not be deleted and must be removed by
    /// hand; its alias is already gone, so cleanup cannot find it again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphaned_version: Option<String>,
}

impl PowerValueFailure {
    pub fn new(power_value: u32, message: impl Into<String>) -> Self {
        Self {
            power_value,
            message: message.into(),
            orphaned_version: None,
        }
    }

    pub fn with_orphaned_version(mut self, version: impl Into<String>) -> Self {
        self.orphaned_version = Some(version.into());
        self
    }
}

impl fmt::Display for PowerValueFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}MB: {}", self.power_value, self.message)?;
        if let Some(version) = &self.orphaned_version {
            write!(f, " (version {version} left behind)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TuningError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("alias '{alias}' is in an unexpected state: {message}")]
    ResourceConflict { alias: String, message: String },

    #[error("{operation} failed{} after {attempts} attempt(s): {message}", power_suffix(.power_value))]
    OperationFailed {
        operation: String,
        power_value: Option<u32>,
        attempts: u32,
        message: String,
    },

    #[error("all {count} invocation(s) failed for {value}MB: {last_error}")]
    AllInvocationsFailed {
        value: u32,
        count: usize,
        last_error: String,
    },

    #[error("initialization failed: {}", describe_initialization(.failures, .restore_failure))]
    InitializationFailed {
        failures: Vec<PowerValueFailure>,
        /// Set when the target's original memory size could not be put back.
        restore_failure: Option<String>,
    },

    #[error("version {version} of {power_value}MB was left behind after {attempts} attempt(s): {message}")]
    OrphanedVersion {
        power_value: u32,
        version: String,
        attempts: u32,
        message: String,
    },

    #[error("cleanup failed for {} power value(s): {}", .failures.len(), join_failures(.failures))]
    CleanupPartialFailure { failures: Vec<PowerValueFailure> },
}

impl TuningError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Stable machine-readable name, used as the error type reported to the
    /// orchestrator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "InvalidInput",
            Self::Configuration(_) => "Configuration",
            Self::ResourceConflict { .. } => "ResourceConflict",
            Self::OperationFailed { .. } => "OperationFailed",
            Self::AllInvocationsFailed { .. } => "AllInvocationsFailed",
            Self::InitializationFailed { .. } => "InitializationFailed",
            Self::OrphanedVersion { .. } => "OrphanedVersion",
            Self::CleanupPartialFailure { .. } => "CleanupPartialFailure",
        }
    }
}

fn power_suffix(power_value: &Option<u32>) -> String {
    power_value
        .map(|value| format!(" for {value}MB"))
        .unwrap_or_default()
}

fn describe_initialization(failures: &[PowerValueFailure], restore_failure: &Option<String>) -> String {
    let mut parts = Vec::new();
    if !failures.is_empty() {
        parts.push(format!(
            "{} power value(s): {}",
            failures.len(),
            join_failures(failures)
        ));
    }
    if let Some(message) = restore_failure {
        parts.push(format!("restoring the original memory size failed: {message}"));
    }
    parts.join("; ")
}

fn join_failures(failures: &[PowerValueFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_failed_mentions_power_value_when_known() {
        let error = TuningError::OperationFailed {
            operation: "publish_version".to_string(),
            power_value: Some(512),
            attempts: 3,
            message: "throttled".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "publish_version failed for 512MB after 3 attempt(s): throttled"
        );
    }

    #[test]
    fn cleanup_failure_lists_every_failing_value() {
        let error = TuningError::CleanupPartialFailure {
            failures: vec![
                PowerValueFailure::new(128, "denied"),
                PowerValueFailure::new(1024, "timeout").with_orphaned_version("7"),
            ],
        };

        assert_eq!(error.kind(), "CleanupPartialFailure");
        assert_eq!(
            error.to_string(),
            "cleanup failed for 2 power value(s): 128MB: denied; 1024MB: timeout (version 7 left behind)"
        );
    }

    #[test]
    fn restore_failure_is_reported_apart_from_power_values() {
        let error = TuningError::InitializationFailed {
            failures: Vec::new(),
            restore_failure: Some("throttled".to_string()),
        };

        assert_eq!(
            error.to_string(),
            "initialization failed: restoring the original memory size failed: throttled"
        );
    }
}
