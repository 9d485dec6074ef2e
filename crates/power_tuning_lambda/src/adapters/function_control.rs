use async_trait::async_trait;
use power_tuning_core::contract::TargetRef;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorKind {
    /// The alias, version or function does not exist.
    NotFound,
    /// The resource already exists or an update is still in progress.
    Conflict,
    /// Throttling, timeouts and service-side failures.
    Transient,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct PlatformError {
    pub kind: PlatformErrorKind,
    pub message: String,
}

impl PlatformError {
    pub fn new(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == PlatformErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind == PlatformErrorKind::Transient
    }

    /// Configuration updates and publishing report an in-progress update as
    /// a conflict that clears on its own.
    pub fn is_transient_or_conflict(&self) -> bool {
        matches!(
            self.kind,
            PlatformErrorKind::Transient | PlatformErrorKind::Conflict
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasDescription {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvocationOutcome {
    /// Decoded log tail of the invocation.
    pub log_tail: Option<String>,
    pub function_error: Option<String>,
    pub payload: Vec<u8>,
}

/// The platform operations the tuning engine depends on.
#[async_trait]
pub trait FunctionControl: Send + Sync {
    async fn get_alias(
        &self,
        target: &TargetRef,
        alias_name: &str,
    ) -> Result<Option<AliasDescription>, PlatformError>;

    async fn get_memory_size(&self, target: &TargetRef) -> Result<u32, PlatformError>;

    async fn set_memory_size(&self, target: &TargetRef, memory_mb: u32)
        -> Result<(), PlatformError>;

    async fn publish_version(&self, target: &TargetRef) -> Result<String, PlatformError>;

    async fn create_alias(
        &self,
        target: &TargetRef,
        version: &str,
        alias_name: &str,
    ) -> Result<(), PlatformError>;

    async fn delete_alias(&self, target: &TargetRef, alias_name: &str)
        -> Result<(), PlatformError>;

    async fn delete_version(&self, target: &TargetRef, version: &str) -> Result<(), PlatformError>;

    /// Synchronous invocation with the log tail requested. `qualifier` is an
    /// alias name, or `None` for the unqualified function.
    async fn invoke(
        &self,
        target: &TargetRef,
        qualifier: Option<&str>,
        payload: &[u8],
    ) -> Result<InvocationOutcome, PlatformError>;
}
