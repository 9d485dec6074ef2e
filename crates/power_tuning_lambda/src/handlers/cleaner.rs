use std::future::Future;

use power_tuning_core::config::TuningConfig;
use power_tuning_core::contract::{CleanerOutput, CleanerRequest};
use power_tuning_core::error::TuningError;
use serde_json::Value;

use crate::adapters::function_control::FunctionControl;
use crate::engine::lifecycle::LifecycleCoordinator;

pub fn cleaner_phase<'a>(
    event: &Value,
    config: &'a TuningConfig,
    api: &'a dyn FunctionControl,
) -> Result<impl Future<Output = Result<CleanerOutput, TuningError>> + Send + 'a, TuningError> {
    let request = CleanerRequest::from_event(event)?;

    Ok(async move {
        let report = LifecycleCoordinator::new(api, config)
            .cleanup(&request.target)
            .await?;
        Ok(CleanerOutput {
            target: request.target.to_string(),
            removed: report.removed,
            already_absent: report.already_absent,
        })
    })
}

pub async fn handle_cleaner_event(
    event: Value,
    config: &TuningConfig,
    api: &dyn FunctionControl,
) -> Result<CleanerOutput, TuningError> {
    cleaner_phase(&event, config, api)?.await
}
