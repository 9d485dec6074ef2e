//! Phase entry points consumed by the external orchestrator.
//!
//! Each phase has a `*_phase` function that validates its event
//! synchronously and returns the work as a future, plus a `handle_*_event`
//! convenience that awaits it.

pub mod cleaner;
pub mod executor;
pub mod initializer;
