//! AWS-oriented engine, adapters and handlers for Lambda power tuning.
//!
//! The engine only talks to the platform through the `FunctionControl`
//! capability set, so alias lifecycle and invocation measurement are tested
//! against an in-memory fake. The AWS SDK adapter and the Lambda runtime
//! wiring live at the edges (`adapters::aws_lambda`, `runtime`).

pub mod adapters;
pub mod engine;
pub mod handlers;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_support;
