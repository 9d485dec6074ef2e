use futures::future::join_all;
use power_tuning_core::aliases::ExecutionAlias;
use power_tuning_core::config::TuningConfig;
use power_tuning_core::contract::TargetRef;
use power_tuning_core::error::{PowerValueFailure, TuningError};
use tracing::{info, warn};

use crate::adapters::function_control::{FunctionControl, PlatformError};
use crate::engine::alias_manager::{AliasManager, TeardownOutcome};
use crate::engine::retry::retry_platform_call;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<u32>,
    pub already_absent: Vec<u32>,
}

/// Applies the alias manager across every configured power value of one
/// tuning run.
pub struct LifecycleCoordinator<'a> {
    api: &'a dyn FunctionControl,
    config: &'a TuningConfig,
}

impl<'a> LifecycleCoordinator<'a> {
    pub fn new(api: &'a dyn FunctionControl, config: &'a TuningConfig) -> Self {
        Self { api, config }
    }

    /// Ensures one alias per power value. Every `ensure` runs to completion,
    /// even when others fail, so cleanup always faces a known set of
    /// resources. The target's original memory setting is put back afterwards.
    pub async fn initialize(&self, target: &TargetRef) -> Result<Vec<ExecutionAlias>, TuningError> {
        let api = self.api;
        let original_memory = retry_platform_call(
            &self.config.retry,
            "get_memory_size",
            PlatformError::is_transient,
            move || api.get_memory_size(target),
        )
        .await
        .map_err(|exhausted| exhausted.into_tuning_error("get_memory_size", None))?;

        let manager = AliasManager::new(self.api, self.config.retry);
        let results = join_all(
            self.config
                .power_values
                .iter()
                .map(|power_value| manager.ensure(target, *power_value)),
        )
        .await;

        let mut aliases = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (power_value, result) in self.config.power_values.iter().zip(results) {
            match result {
                Ok(alias) => aliases.push(alias),
                Err(error) => {
                    warn!(
                        event = "ensure_failed",
                        target = %target,
                        power_value = *power_value,
                        error = %error,
                    );
                    failures.push(PowerValueFailure::new(*power_value, error.to_string()));
                }
            }
        }

        let mut restore_failure = None;
        if manager.configuration_changed() {
            if let Err(error) = self.restore_memory(target, original_memory).await {
                warn!(
                    event = "memory_restore_failed",
                    target = %target,
                    original_memory,
                    error = %error,
                );
                restore_failure = Some(error.to_string());
            }
        }

        if !failures.is_empty() || restore_failure.is_some() {
            return Err(TuningError::InitializationFailed {
                failures,
                restore_failure,
            });
        }

        info!(
            event = "initialization_completed",
            target = %target,
            aliases = aliases.len(),
            original_memory,
        );
        Ok(aliases)
    }

    async fn restore_memory(&self, target: &TargetRef, memory_mb: u32) -> Result<(), TuningError> {
        let api = self.api;
        retry_platform_call(
            &self.config.retry,
            "set_memory_size",
            PlatformError::is_transient_or_conflict,
            move || api.set_memory_size(target, memory_mb),
        )
        .await
        .map_err(|exhausted| exhausted.into_tuning_error("set_memory_size", None))
    }

    /// Tears down every power value's alias. A failure for one value is
    /// logged and does not stop the others; the failing subset is reported.
    pub async fn cleanup(&self, target: &TargetRef) -> Result<CleanupReport, TuningError> {
        let manager = AliasManager::new(self.api, self.config.retry);
        let results = join_all(
            self.config
                .power_values
                .iter()
                .map(|power_value| manager.teardown(target, *power_value)),
        )
        .await;

        let mut report = CleanupReport::default();
        let mut failures = Vec::new();
        for (power_value, result) in self.config.power_values.iter().zip(results) {
            match result {
                Ok(TeardownOutcome::Removed { .. }) => report.removed.push(*power_value),
                Ok(TeardownOutcome::AlreadyAbsent) => report.already_absent.push(*power_value),
                Err(error) => {
                    warn!(
                        event = "teardown_failed",
                        target = %target,
                        power_value = *power_value,
                        error = %error,
                    );
                    let failure = PowerValueFailure::new(*power_value, error.to_string());
                    failures.push(match error {
                        TuningError::OrphanedVersion { version, .. } => {
                            failure.with_orphaned_version(version)
                        }
                        _ => failure,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(TuningError::CleanupPartialFailure { failures });
        }

        info!(
            event = "cleanup_completed",
            target = %target,
            removed = report.removed.len(),
            already_absent = report.already_absent.len(),
        );
        Ok(report)
    }
}
