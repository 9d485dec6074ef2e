use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TuningError;

pub const DEFAULT_BASE_PRICE: f64 = 2.08e-7;
pub const DEFAULT_BASE_MEMORY_MB: u32 = 128;
pub const DEFAULT_BILLING_GRANULARITY_MS: u64 = 100;

/// Price of one billing unit per power value.
///
/// Values without an explicit override scale linearly from the base price,
/// which is the cost of one billing unit at `base_memory_mb`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceTable {
    pub base_price: f64,
    pub base_memory_mb: u32,
    pub billing_granularity_ms: u64,
    #[serde(default)]
    pub overrides: BTreeMap<u32, f64>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            base_price: DEFAULT_BASE_PRICE,
            base_memory_mb: DEFAULT_BASE_MEMORY_MB,
            billing_granularity_ms: DEFAULT_BILLING_GRANULARITY_MS,
            overrides: BTreeMap::new(),
        }
    }
}

impl PriceTable {
    pub fn new(
        base_price: f64,
        base_memory_mb: u32,
        billing_granularity_ms: u64,
    ) -> Result<Self, TuningError> {
        let table = Self {
            base_price,
            base_memory_mb,
            billing_granularity_ms,
            overrides: BTreeMap::new(),
        };
        table.validate()?;
        Ok(table)
    }

    pub fn with_override(mut self, power_value: u32, price_per_unit: f64) -> Self {
        self.overrides.insert(power_value, price_per_unit);
        self
    }

    pub fn validate(&self) -> Result<(), TuningError> {
        if !self.base_price.is_finite() || self.base_price <= 0.0 {
            return Err(TuningError::Configuration(
                "minCost must be a positive number".to_string(),
            ));
        }
        if self.base_memory_mb == 0 {
            return Err(TuningError::Configuration(
                "minRAM must be a positive integer".to_string(),
            ));
        }
        if self.billing_granularity_ms == 0 {
            return Err(TuningError::Configuration(
                "billingGranularityMs must be a positive integer".to_string(),
            ));
        }
        if let Some((value, _)) = self
            .overrides
            .iter()
            .find(|(_, price)| !price.is_finite() || **price < 0.0)
        {
            return Err(TuningError::Configuration(format!(
                "price override for {value}MB must be a non-negative number"
            )));
        }
        Ok(())
    }

    pub fn price_per_unit(&self, power_value: u32) -> f64 {
        match self.overrides.get(&power_value) {
            Some(price) => *price,
            None => self.base_price * f64::from(power_value) / f64::from(self.base_memory_mb),
        }
    }

    /// Billed duration rounded up to the next whole billing unit.
    pub fn billing_units(&self, billed_duration_ms: f64) -> u64 {
        if !billed_duration_ms.is_finite() || billed_duration_ms <= 0.0 {
            return 0;
        }
        (billed_duration_ms / self.billing_granularity_ms as f64).ceil() as u64
    }

    pub fn cost(&self, power_value: u32, billed_duration_ms: f64) -> f64 {
        self.billing_units(billed_duration_ms) as f64 * self.price_per_unit(power_value)
    }
}
