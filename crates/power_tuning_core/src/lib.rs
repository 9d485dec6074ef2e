//! Shared power tuning domain primitives.
//!
//! This crate owns request validation, configuration, the cost model and the
//! phase contracts. AWS SDK, Lambda runtime and async runtime concerns live in
//! `power_tuning_lambda`.

pub mod aliases;
pub mod config;
pub mod contract;
pub mod error;
pub mod log_tail;
pub mod pricing;
