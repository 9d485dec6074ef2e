use serde::{Deserialize, Serialize};

pub const ALIAS_PREFIX: &str = "RAM";
pub const LATEST_VERSION: &str = "$LATEST";

/// A named binding between the target and one published version configured
/// with a single power value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionAlias {
    pub target: String,
    pub power_value: u32,
    pub version: String,
    pub alias_name: String,
}

/// Alias name for a power value. Cleanup relies on this being derivable
/// without any bookkeeping from the init phase.
pub fn alias_name_for(power_value: u32) -> String {
    format!("{ALIAS_PREFIX}{power_value}")
}

/// Only numbered versions are owned by a tuning run.
pub fn is_deletable_version(version: &str) -> bool {
    version != LATEST_VERSION && !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit())
}
