use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::TuningError;
use crate::pricing::{
    PriceTable, DEFAULT_BASE_MEMORY_MB, DEFAULT_BASE_PRICE, DEFAULT_BILLING_GRANULARITY_MS,
};

pub const MIN_POWER_VALUE: u32 = 128;
pub const MAX_POWER_VALUE: u32 = 10_240;
pub const DEFAULT_MAX_PARALLEL_INVOCATIONS: usize = 64;
pub const DEFAULT_MAX_INVOCATIONS: usize = 10_000;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;

pub const POWER_VALUES_VAR: &str = "powerValues";
pub const MIN_RAM_VAR: &str = "minRAM";
pub const MIN_COST_VAR: &str = "minCost";
pub const BILLING_GRANULARITY_VAR: &str = "billingGranularityMs";
pub const MAX_PARALLEL_VAR: &str = "maxParallelInvocations";
pub const MAX_INVOCATIONS_VAR: &str = "maxInvocations";
pub const PRICE_OVERRIDES_VAR: &str = "priceOverrides";
pub const RETRY_MAX_ATTEMPTS_VAR: &str = "retryMaxAttempts";
pub const RETRY_BASE_DELAY_VAR: &str = "retryBaseDelayMs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before the given retry (1-based), doubling each time.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Process-wide tuning configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningConfig {
    pub power_values: Vec<u32>,
    pub price_table: PriceTable,
    pub max_parallel_invocations: usize,
    /// Upper bound on `num` for a single executor run.
    pub max_invocations: usize,
    pub retry: RetryPolicy,
}

impl TuningConfig {
    pub fn new(power_values: Vec<u32>, price_table: PriceTable) -> Result<Self, TuningError> {
        let config = Self {
            power_values,
            price_table,
            max_parallel_invocations: DEFAULT_MAX_PARALLEL_INVOCATIONS,
            max_invocations: DEFAULT_MAX_INVOCATIONS,
            retry: RetryPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, TuningError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TuningError> {
        let raw_power_values = lookup(POWER_VALUES_VAR).ok_or_else(|| {
            TuningError::Configuration(format!("{POWER_VALUES_VAR} must be configured"))
        })?;
        let power_values = parse_power_values(&raw_power_values)?;

        let mut price_table = PriceTable::new(
            parse_var(&lookup, MIN_COST_VAR)?.unwrap_or(DEFAULT_BASE_PRICE),
            parse_var(&lookup, MIN_RAM_VAR)?.unwrap_or(DEFAULT_BASE_MEMORY_MB),
            parse_var(&lookup, BILLING_GRANULARITY_VAR)?.unwrap_or(DEFAULT_BILLING_GRANULARITY_MS),
        )?;
        if let Some(raw) = lookup(PRICE_OVERRIDES_VAR) {
            for (power_value, price_per_unit) in parse_price_overrides(&raw)? {
                price_table = price_table.with_override(power_value, price_per_unit);
            }
        }

        let retry = RetryPolicy {
            max_attempts: parse_var(&lookup, RETRY_MAX_ATTEMPTS_VAR)?
                .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
            base_delay: Duration::from_millis(
                parse_var(&lookup, RETRY_BASE_DELAY_VAR)?.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            ),
        };

        let config = Self {
            power_values,
            price_table,
            max_parallel_invocations: parse_var(&lookup, MAX_PARALLEL_VAR)?
                .unwrap_or(DEFAULT_MAX_PARALLEL_INVOCATIONS),
            max_invocations: parse_var(&lookup, MAX_INVOCATIONS_VAR)?
                .unwrap_or(DEFAULT_MAX_INVOCATIONS),
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TuningError> {
        self.price_table.validate()?;

        if self.power_values.is_empty() {
            return Err(TuningError::Configuration(format!(
                "{POWER_VALUES_VAR} cannot be empty"
            )));
        }
        for value in &self.power_values {
            if !(MIN_POWER_VALUE..=MAX_POWER_VALUE).contains(value) {
                return Err(TuningError::Configuration(format!(
                    "power value {value} is outside {MIN_POWER_VALUE}..={MAX_POWER_VALUE}"
                )));
            }
            if *value < self.price_table.base_memory_mb {
                return Err(TuningError::Configuration(format!(
                    "power value {value} is below {MIN_RAM_VAR}={}",
                    self.price_table.base_memory_mb
                )));
            }
        }
        if let Some(value) = self
            .price_table
            .overrides
            .keys()
            .find(|value| !self.is_allowed_power_value(**value))
        {
            return Err(TuningError::Configuration(format!(
                "{PRICE_OVERRIDES_VAR} names {value}, which is not a configured power value"
            )));
        }
        if self.max_invocations == 0 {
            return Err(TuningError::Configuration(format!(
                "{MAX_INVOCATIONS_VAR} must be a positive integer"
            )));
        }
        if self.max_parallel_invocations == 0 {
            return Err(TuningError::Configuration(format!(
                "{MAX_PARALLEL_VAR} must be a positive integer"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(TuningError::Configuration(format!(
                "{RETRY_MAX_ATTEMPTS_VAR} must be a positive integer"
            )));
        }
        Ok(())
    }

    pub fn is_allowed_power_value(&self, value: u32) -> bool {
        self.power_values.contains(&value)
    }
}

/// Parses a comma-separated list, sorting and dropping duplicates so each
/// power value maps to exactly one alias.
pub fn parse_power_values(raw: &str) -> Result<Vec<u32>, TuningError> {
    let mut values = Vec::new();
    for item in raw.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let value = item.parse::<u32>().map_err(|_| {
            TuningError::Configuration(format!(
                "{POWER_VALUES_VAR} contains a non-integer entry '{item}'"
            ))
        })?;
        values.push(value);
    }
    values.sort_unstable();
    values.dedup();
    Ok(values)
}

/// Parses `value:price` pairs such as `512:1.0e-6,1024:2.0e-6`.
pub fn parse_price_overrides(raw: &str) -> Result<BTreeMap<u32, f64>, TuningError> {
    let mut overrides = BTreeMap::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let parsed = item.split_once(':').and_then(|(value, price)| {
            Some((
                value.trim().parse::<u32>().ok()?,
                price.trim().parse::<f64>().ok()?,
            ))
        });
        let Some((power_value, price_per_unit)) = parsed else {
            return Err(TuningError::Configuration(format!(
                "{PRICE_OVERRIDES_VAR} entry '{item}' is not of the form value:price"
            )));
        };
        overrides.insert(power_value, price_per_unit);
    }
    Ok(overrides)
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, TuningError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| TuningError::Configuration(format!("{name} has invalid value '{raw}'"))),
    }
}
