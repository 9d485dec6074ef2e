use std::future::Future;

use power_tuning_core::aliases::alias_name_for;
use power_tuning_core::config::TuningConfig;
use power_tuning_core::contract::{ExecutorRequest, PerformanceSummary};
use power_tuning_core::error::TuningError;
use serde_json::Value;

use crate::adapters::function_control::FunctionControl;
use crate::engine::invocation::{InvocationEngine, InvocationOptions, InvocationTarget};

/// Invokes the alias of the requested power value `num` times.
pub fn executor_phase<'a>(
    event: &Value,
    config: &'a TuningConfig,
    api: &'a dyn FunctionControl,
) -> Result<impl Future<Output = Result<PerformanceSummary, TuningError>> + Send + 'a, TuningError>
{
    let request = ExecutorRequest::from_event(event, config)?;

    Ok(async move {
        let engine = InvocationEngine::new(
            api,
            &config.price_table,
            config.retry,
            config.max_parallel_invocations,
        );
        let alias_name = alias_name_for(request.value);
        let options = InvocationOptions {
            parallel: request.parallel,
            payload: request.payload,
            include_records: request.include_records,
        };
        engine
            .run(
                InvocationTarget {
                    target: &request.target,
                    qualifier: Some(alias_name.as_str()),
                    power_value: request.value,
                },
                request.num,
                &options,
            )
            .await
    })
}

pub async fn handle_executor_event(
    event: Value,
    config: &TuningConfig,
    api: &dyn FunctionControl,
) -> Result<PerformanceSummary, TuningError> {
    executor_phase(&event, config, api)?.await
}
