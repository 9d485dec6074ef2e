//! Lambda runtime wiring shared by the three phase binaries.

use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use power_tuning_core::config::TuningConfig;
use power_tuning_core::error::TuningError;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::adapters::aws_lambda::AwsFunctionControl;
use crate::adapters::function_control::FunctionControl;
use crate::handlers::cleaner::handle_cleaner_event;
use crate::handlers::executor::handle_executor_event;
use crate::handlers::initializer::handle_initializer_event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializer,
    Executor,
    Cleaner,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Initializer => "initializer",
            Self::Executor => "executor",
            Self::Cleaner => "cleaner",
        }
    }
}

/// Runs one phase on a raw event and returns its JSON output.
pub async fn dispatch(
    phase: Phase,
    event: Value,
    config: &TuningConfig,
    api: &dyn FunctionControl,
) -> Result<Value, TuningError> {
    match phase {
        Phase::Initializer => to_output(handle_initializer_event(event, config, api).await?),
        Phase::Executor => to_output(handle_executor_event(event, config, api).await?),
        Phase::Cleaner => to_output(handle_cleaner_event(event, config, api).await?),
    }
}

fn to_output(output: impl Serialize) -> Result<Value, TuningError> {
    serde_json::to_value(output).map_err(|error| TuningError::OperationFailed {
        operation: "serialize_output".to_string(),
        power_value: None,
        attempts: 1,
        message: error.to_string(),
    })
}

/// Failures surface to the caller as `<Kind>: <message>` so state machine
/// retry and catch rules can match on the prefix.
fn into_runtime_error(error: TuningError) -> Error {
    Error::from(format!("{}: {error}", error.kind()))
}

pub async fn run(phase: Phase) -> Result<(), Error> {
    lambda_runtime::tracing::init_default_subscriber();

    let config = Arc::new(TuningConfig::from_env().map_err(into_runtime_error)?);
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let api = Arc::new(AwsFunctionControl::new(aws_sdk_lambda::Client::new(
        &aws_config,
    )));
    info!(
        event = "runtime_started",
        phase = phase.name(),
        power_values = ?config.power_values,
        max_parallel_invocations = config.max_parallel_invocations,
    );

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let config = Arc::clone(&config);
        let api = Arc::clone(&api);
        async move {
            let request_id = event.context.request_id.clone();
            dispatch(phase, event.payload, &config, api.as_ref())
                .await
                .map_err(|failure| {
                    error!(
                        event = "phase_failed",
                        phase = phase.name(),
                        request_id = %request_id,
                        kind = failure.kind(),
                        error = %failure,
                    );
                    into_runtime_error(failure)
                })
        }
    }))
    .await
}
