use std::future::Future;

use power_tuning_core::config::TuningConfig;
use power_tuning_core::contract::{AliasSummary, InitializerOutput, InitializerRequest};
use power_tuning_core::error::TuningError;
use serde_json::Value;

use crate::adapters::function_control::FunctionControl;
use crate::engine::lifecycle::LifecycleCoordinator;

/// Validates the event before any platform call is made; a malformed event
/// is rejected here instead of inside the returned future.
pub fn initializer_phase<'a>(
    event: &Value,
    config: &'a TuningConfig,
    api: &'a dyn FunctionControl,
) -> Result<impl Future<Output = Result<InitializerOutput, TuningError>> + Send + 'a, TuningError>
{
    let request = InitializerRequest::from_event(event)?;

    Ok(async move {
        let aliases = LifecycleCoordinator::new(api, config)
            .initialize(&request.target)
            .await?;
        Ok(InitializerOutput {
            target: request.target.to_string(),
            aliases: aliases.iter().map(AliasSummary::from).collect(),
        })
    })
}

pub async fn handle_initializer_event(
    event: Value,
    config: &TuningConfig,
    api: &dyn FunctionControl,
) -> Result<InitializerOutput, TuningError> {
    initializer_phase(&event, config, api)?.await
}
