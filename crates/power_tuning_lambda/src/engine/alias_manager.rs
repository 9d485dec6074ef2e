use std::sync::atomic::{AtomicBool, Ordering};

use power_tuning_core::aliases::{alias_name_for, is_deletable_version, ExecutionAlias};
use power_tuning_core::config::RetryPolicy;
use power_tuning_core::contract::TargetRef;
use power_tuning_core::error::TuningError;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::adapters::function_control::{FunctionControl, PlatformError, PlatformErrorKind};
use crate::engine::retry::{retry_platform_call, RetryExhausted};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    Removed { version: String },
    AlreadyAbsent,
}

/// Creates and removes the per-power-value aliases of one target.
///
/// The target's memory setting is the only mutable state shared between
/// power values, so the update-then-publish window is serialized; lookups,
/// alias creation and teardown run freely in parallel.
pub struct AliasManager<'a> {
    api: &'a dyn FunctionControl,
    retry: RetryPolicy,
    configuration_lock: Mutex<()>,
    configuration_changed: AtomicBool,
}

impl<'a> AliasManager<'a> {
    pub fn new(api: &'a dyn FunctionControl, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            configuration_lock: Mutex::new(()),
            configuration_changed: AtomicBool::new(false),
        }
    }

    /// Whether any `ensure` call on this manager updated the target's memory.
    pub fn configuration_changed(&self) -> bool {
        self.configuration_changed.load(Ordering::SeqCst)
    }

    pub async fn lookup(
        &self,
        target: &TargetRef,
        power_value: u32,
    ) -> Result<Option<ExecutionAlias>, TuningError> {
        let api = self.api;
        let alias_name = alias_name_for(power_value);
        let name = alias_name.as_str();

        let description = retry_platform_call(
            &self.retry,
            "get_alias",
            PlatformError::is_transient,
            move || api.get_alias(target, name),
        )
        .await
        .map_err(|exhausted| exhausted.into_tuning_error("get_alias", Some(power_value)))?;

        Ok(description.map(|description| ExecutionAlias {
            target: target.to_string(),
            power_value,
            version: description.version,
            alias_name: alias_name.clone(),
        }))
    }

    /// Idempotent create: an existing alias is returned untouched.
    pub async fn ensure(
        &self,
        target: &TargetRef,
        power_value: u32,
    ) -> Result<ExecutionAlias, TuningError> {
        if let Some(existing) = self.lookup(target, power_value).await? {
            info!(
                event = "alias_reused",
                target = %target,
                power_value,
                alias = %existing.alias_name,
                version = %existing.version,
            );
            return Ok(existing);
        }

        let version = self.publish_configured_version(target, power_value).await?;
        let alias_name = alias_name_for(power_value);
        let api = self.api;
        let name = alias_name.as_str();
        let published = version.as_str();

        let created = retry_platform_call(
            &self.retry,
            "create_alias",
            PlatformError::is_transient,
            move || api.create_alias(target, published, name),
        )
        .await;

        match created {
            Ok(()) => {
                info!(
                    event = "alias_created",
                    target = %target,
                    power_value,
                    alias = %alias_name,
                    version = %version,
                );
                Ok(ExecutionAlias {
                    target: target.to_string(),
                    power_value,
                    version,
                    alias_name,
                })
            }
            Err(exhausted) if exhausted.error.kind == PlatformErrorKind::Conflict => {
                self.adopt_concurrent_alias(target, power_value, &version)
                    .await
            }
            Err(exhausted) => {
                self.release_orphaned_version(target, power_value, &version)
                    .await;
                Err(exhausted.into_tuning_error("create_alias", Some(power_value)))
            }
        }
    }

    async fn publish_configured_version(
        &self,
        target: &TargetRef,
        power_value: u32,
    ) -> Result<String, TuningError> {
        let api = self.api;
        let _guard = self.configuration_lock.lock().await;

        retry_platform_call(
            &self.retry,
            "set_memory_size",
            PlatformError::is_transient_or_conflict,
            move || api.set_memory_size(target, power_value),
        )
        .await
        .map_err(|exhausted| exhausted.into_tuning_error("set_memory_size", Some(power_value)))?;
        self.configuration_changed.store(true, Ordering::SeqCst);

        let version = retry_platform_call(
            &self.retry,
            "publish_version",
            PlatformError::is_transient_or_conflict,
            move || api.publish_version(target),
        )
        .await
        .map_err(|exhausted| exhausted.into_tuning_error("publish_version", Some(power_value)))?;

        info!(
            event = "version_published",
            target = %target,
            power_value,
            version = %version,
        );
        Ok(version)
    }

    /// Another writer created the alias between lookup and creation. Its
    /// alias wins and the version published here is released.
    async fn adopt_concurrent_alias(
        &self,
        target: &TargetRef,
        power_value: u32,
        orphaned_version: &str,
    ) -> Result<ExecutionAlias, TuningError> {
        let Some(existing) = self.lookup(target, power_value).await? else {
            return Err(TuningError::ResourceConflict {
                alias: alias_name_for(power_value),
                message: "alias creation conflicted but the alias cannot be found".to_string(),
            });
        };

        if existing.version != orphaned_version {
            self.release_orphaned_version(target, power_value, orphaned_version)
                .await;
        }

        info!(
            event = "alias_reused",
            target = %target,
            power_value,
            alias = %existing.alias_name,
            version = %existing.version,
        );
        Ok(existing)
    }

    async fn release_orphaned_version(&self, target: &TargetRef, power_value: u32, version: &str) {
        if !is_deletable_version(version) {
            return;
        }
        if let Err(exhausted) = self.delete_version(target, version).await {
            warn!(
                event = "orphaned_version_not_deleted",
                target = %target,
                power_value,
                version,
                attempts = exhausted.attempts,
                error = %exhausted.error,
            );
        }
    }

    /// Best-effort idempotent removal: the alias goes first so it never
    /// points at a deleted version.
    pub async fn teardown(
        &self,
        target: &TargetRef,
        power_value: u32,
    ) -> Result<TeardownOutcome, TuningError> {
        let Some(existing) = self.lookup(target, power_value).await? else {
            info!(event = "alias_absent", target = %target, power_value);
            return Ok(TeardownOutcome::AlreadyAbsent);
        };

        let api = self.api;
        let name = existing.alias_name.as_str();
        let deleted = retry_platform_call(
            &self.retry,
            "delete_alias",
            PlatformError::is_transient,
            move || api.delete_alias(target, name),
        )
        .await;
        match deleted {
            Ok(()) => {}
            Err(exhausted) if exhausted.error.is_not_found() => {}
            Err(exhausted) => {
                return Err(exhausted.into_tuning_error("delete_alias", Some(power_value)))
            }
        }

        if is_deletable_version(&existing.version) {
            let deleted = self.delete_version(target, &existing.version).await;
            if let Err(exhausted) = deleted {
                return Err(TuningError::OrphanedVersion {
                    power_value,
                    version: existing.version,
                    attempts: exhausted.attempts,
                    message: exhausted.error.to_string(),
                });
            }
        }

        info!(
            event = "alias_removed",
            target = %target,
            power_value,
            alias = %existing.alias_name,
            version = %existing.version,
        );
        Ok(TeardownOutcome::Removed {
            version: existing.version,
        })
    }

    async fn delete_version(&self, target: &TargetRef, version: &str) -> Result<(), RetryExhausted> {
        let api = self.api;
        match retry_platform_call(
            &self.retry,
            "delete_version",
            PlatformError::is_transient,
            move || api.delete_version(target, version),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(exhausted) if exhausted.error.is_not_found() => Ok(()),
            Err(exhausted) => Err(exhausted),
        }
    }
}
