use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::aliases::ExecutionAlias;
use crate::config::TuningConfig;
use crate::error::TuningError;

pub const TARGET_FIELD: &str = "lambdaARN";
pub const TARGET_FIELD_ALIAS: &str = "target";
pub const MAX_FUNCTION_NAME_LEN: usize = 64;
/// Request size limit for synchronous invocations.
pub const MAX_SYNC_PAYLOAD_BYTES: usize = 6 * 1024 * 1024;

/// Validated identifier of the function under test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TargetRef(String);

impl TargetRef {
    pub fn parse(raw: &str) -> Result<Self, TuningError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TuningError::invalid_input(format!(
                "{TARGET_FIELD} cannot be empty"
            )));
        }
        if trimmed.starts_with("arn:") {
            validate_full_arn(trimmed)?;
        } else if trimmed.contains(':') {
            validate_partial_arn(trimmed)?;
        } else {
            validate_function_name(trimmed)?;
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_full_arn(arn: &str) -> Result<(), TuningError> {
    let segments: Vec<&str> = arn.split(':').collect();
    let well_formed = segments.len() == 7
        && !segments[1].is_empty()
        && segments[2] == "lambda"
        && !segments[3].is_empty()
        && is_account_id(segments[4])
        && segments[5] == "function";
    if !well_formed {
        return Err(TuningError::invalid_input(format!(
            "{TARGET_FIELD} '{arn}' is not an unqualified Lambda function ARN"
        )));
    }
    validate_function_name(segments[6])
}

fn validate_partial_arn(partial: &str) -> Result<(), TuningError> {
    match partial.split(':').collect::<Vec<_>>().as_slice() {
        [account, "function", name] if is_account_id(account) => validate_function_name(name),
        _ => Err(TuningError::invalid_input(format!(
            "{TARGET_FIELD} '{partial}' is not a valid partial function ARN"
        ))),
    }
}

fn validate_function_name(name: &str) -> Result<(), TuningError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_FUNCTION_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TuningError::invalid_input(format!(
            "'{name}' is not a valid function name"
        )))
    }
}

fn is_account_id(raw: &str) -> bool {
    raw.len() == 12 && raw.bytes().all(|b| b.is_ascii_digit())
}

/// Resolves the target of a phase event. Missing events, non-objects and any
/// falsy target (`null`, `""`, `false`, `0`) are rejected.
pub fn resolve_target(event: &Value) -> Result<TargetRef, TuningError> {
    let Some(object) = event.as_object() else {
        return Err(TuningError::invalid_input(
            "event payload must be a JSON object",
        ));
    };

    let raw = object
        .get(TARGET_FIELD)
        .or_else(|| object.get(TARGET_FIELD_ALIAS))
        .unwrap_or(&Value::Null);

    if is_falsy(raw) {
        return Err(TuningError::invalid_input(format!(
            "{TARGET_FIELD} is required"
        )));
    }

    match raw.as_str() {
        Some(text) => TargetRef::parse(text),
        None => Err(TuningError::invalid_input(format!(
            "{TARGET_FIELD} must be a string"
        ))),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().map(|n| n == 0.0).unwrap_or(false),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Accepts positive integers given either as JSON numbers or as numeric
/// strings such as `"128"`.
pub fn coerce_positive_integer(value: Option<&Value>, field: &str) -> Result<u64, TuningError> {
    let parsed = match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|n| n.is_finite() && n.fract() == 0.0 && *n >= 0.0 && *n <= u64::MAX as f64)
                .map(|n| n as u64)
        }),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(0) | None => Err(TuningError::invalid_input(format!(
            "{field} must be a positive integer"
        ))),
        Some(number) => Ok(number),
    }
}

fn optional_flag(object: &serde_json::Map<String, Value>, field: &str) -> Result<bool, TuningError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(TuningError::invalid_input(format!(
            "{field} must be a boolean"
        ))),
    }
}

pub fn default_payload() -> Value {
    json!({})
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializerRequest {
    pub target: TargetRef,
}

impl InitializerRequest {
    pub fn from_event(event: &Value) -> Result<Self, TuningError> {
        Ok(Self {
            target: resolve_target(event)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanerRequest {
    pub target: TargetRef,
}

impl CleanerRequest {
    pub fn from_event(event: &Value) -> Result<Self, TuningError> {
        Ok(Self {
            target: resolve_target(event)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorRequest {
    pub target: TargetRef,
    pub value: u32,
    pub num: usize,
    pub parallel: bool,
    pub payload: Value,
    pub include_records: bool,
}

impl ExecutorRequest {
    /// Validates an executor event against the configured power values and
    /// invocation limit.
    pub fn from_event(event: &Value, config: &TuningConfig) -> Result<Self, TuningError> {
        let target = resolve_target(event)?;
        let object = event
            .as_object()
            .ok_or_else(|| TuningError::invalid_input("event payload must be a JSON object"))?;

        let value = coerce_positive_integer(object.get("value"), "value")?;
        let value = u32::try_from(value)
            .ok()
            .filter(|value| config.is_allowed_power_value(*value))
            .ok_or_else(|| {
                TuningError::invalid_input(format!(
                    "value {value} is not one of the configured power values {:?}",
                    config.power_values
                ))
            })?;

        let num = coerce_positive_integer(object.get("num"), "num")?;
        let num = usize::try_from(num)
            .ok()
            .filter(|num| *num <= config.max_invocations)
            .ok_or_else(|| {
                TuningError::invalid_input(format!(
                    "num {num} exceeds the limit of {} invocations",
                    config.max_invocations
                ))
            })?;

        let parallel = optional_flag(object, "parallelInvocation")?;
        let include_records = optional_flag(object, "includeRecords")?;

        let payload = match object.get("payload") {
            None | Some(Value::Null) => default_payload(),
            Some(payload) => payload.clone(),
        };
        let payload_size = serde_json::to_vec(&payload)
            .map(|bytes| bytes.len())
            .map_err(|error| TuningError::invalid_input(format!("payload is not serializable: {error}")))?;
        if payload_size > MAX_SYNC_PAYLOAD_BYTES {
            return Err(TuningError::invalid_input(format!(
                "payload is {payload_size} bytes, above the {MAX_SYNC_PAYLOAD_BYTES} byte invocation limit"
            )));
        }

        Ok(Self {
            target,
            value,
            num,
            parallel,
            payload,
            include_records,
        })
    }
}

/// Result of a single invocation. Failed invocations carry zero duration and
/// cost and are excluded from averages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationRecord {
    pub duration_ms: f64,
    pub billed_duration_ms: f64,
    pub cost: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationRecord {
    pub fn failed(error: impl Into<String>, output: Option<Value>) -> Self {
        Self {
            duration_ms: 0.0,
            billed_duration_ms: 0.0,
            cost: 0.0,
            success: false,
            output,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSummary {
    pub value: u32,
    /// Average cost of a successful invocation.
    pub price: f64,
    /// Average duration in milliseconds of a successful invocation.
    pub duration: f64,
    pub invocations: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<InvocationRecord>>,
}

impl PerformanceSummary {
    pub fn from_records(
        value: u32,
        records: Vec<InvocationRecord>,
        include_records: bool,
    ) -> Result<Self, TuningError> {
        let invocations = records.len();
        let successful: Vec<&InvocationRecord> = records.iter().filter(|r| r.success).collect();

        if successful.is_empty() {
            let last_error = records
                .iter()
                .rev()
                .find_map(|record| record.error.clone())
                .unwrap_or_else(|| "no invocations were performed".to_string());
            return Err(TuningError::AllInvocationsFailed {
                value,
                count: invocations,
                last_error,
            });
        }

        let samples = successful.len() as f64;
        let price = successful.iter().map(|r| r.cost).sum::<f64>() / samples;
        let duration = successful.iter().map(|r| r.duration_ms).sum::<f64>() / samples;
        let successful_count = successful.len();

        Ok(Self {
            value,
            price,
            duration,
            invocations,
            successful: successful_count,
            failed: invocations - successful_count,
            records: include_records.then_some(records),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasSummary {
    pub value: u32,
    pub alias: String,
    pub version: String,
}

impl From<&ExecutionAlias> for AliasSummary {
    fn from(alias: &ExecutionAlias) -> Self {
        Self {
            value: alias.power_value,
            alias: alias.alias_name.clone(),
            version: alias.version.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitializerOutput {
    #[serde(rename = "lambdaARN")]
    pub target: String,
    pub aliases: Vec<AliasSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanerOutput {
    #[serde(rename = "lambdaARN")]
    pub target: String,
    pub removed: Vec<u32>,
    pub already_absent: Vec<u32>,
}
