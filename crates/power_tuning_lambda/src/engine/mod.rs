//! Alias lifecycle, invocation measurement and the phase-level coordinator.

pub mod alias_manager;
pub mod invocation;
pub mod lifecycle;
pub mod retry;
