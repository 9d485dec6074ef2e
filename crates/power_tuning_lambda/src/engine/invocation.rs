use std::time::Instant;

use futures::stream::{self, StreamExt};
use power_tuning_core::config::RetryPolicy;
use power_tuning_core::contract::{InvocationRecord, PerformanceSummary, TargetRef};
use power_tuning_core::error::TuningError;
use power_tuning_core::log_tail::parse_report;
use power_tuning_core::pricing::PriceTable;
use serde_json::Value;
use tracing::{info, warn};

use crate::adapters::function_control::{FunctionControl, PlatformError};
use crate::engine::retry::retry_platform_call;

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOptions {
    pub parallel: bool,
    pub payload: Value,
    pub include_records: bool,
}

/// What to invoke: the target itself, or one of its aliases. `power_value`
/// prices the billed duration.
#[derive(Debug, Clone, Copy)]
pub struct InvocationTarget<'t> {
    pub target: &'t TargetRef,
    pub qualifier: Option<&'t str>,
    pub power_value: u32,
}

pub struct InvocationEngine<'a> {
    api: &'a dyn FunctionControl,
    price_table: &'a PriceTable,
    retry: RetryPolicy,
    max_parallel: usize,
}

impl<'a> InvocationEngine<'a> {
    pub fn new(
        api: &'a dyn FunctionControl,
        price_table: &'a PriceTable,
        retry: RetryPolicy,
        max_parallel: usize,
    ) -> Self {
        Self {
            api,
            price_table,
            retry,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Performs exactly `count` invocations and aggregates them. Sequential
    /// runs wait for each invocation to settle before starting the next;
    /// parallel runs keep at most `max_parallel` in flight and wait for all of
    /// them before aggregating.
    pub async fn run(
        &self,
        destination: InvocationTarget<'_>,
        count: usize,
        options: &InvocationOptions,
    ) -> Result<PerformanceSummary, TuningError> {
        if count == 0 {
            return Err(TuningError::invalid_input("num must be a positive integer"));
        }
        let payload = serde_json::to_vec(&options.payload).map_err(|error| {
            TuningError::invalid_input(format!("payload is not serializable: {error}"))
        })?;

        let started_at = Instant::now();
        info!(
            event = "invocations_started",
            target = %destination.target,
            qualifier = destination.qualifier.unwrap_or("$LATEST"),
            power_value = destination.power_value,
            count,
            parallel = options.parallel,
        );

        let records: Vec<InvocationRecord> = if options.parallel {
            stream::iter(0..count)
                .map(|_| self.invoke_once(destination, &payload))
                .buffer_unordered(self.max_parallel)
                .collect()
                .await
        } else {
            let mut records = Vec::new();
            for _ in 0..count {
                records.push(self.invoke_once(destination, &payload).await);
            }
            records
        };

        let summary = PerformanceSummary::from_records(
            destination.power_value,
            records,
            options.include_records,
        );
        match &summary {
            Ok(summary) => info!(
                event = "invocations_completed",
                target = %destination.target,
                power_value = summary.value,
                successful = summary.successful,
                failed = summary.failed,
                average_duration_ms = summary.duration,
                average_price = summary.price,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
            ),
            Err(error) => warn!(
                event = "invocations_failed",
                target = %destination.target,
                power_value = destination.power_value,
                error = %error,
            ),
        }
        summary
    }

    async fn invoke_once(
        &self,
        destination: InvocationTarget<'_>,
        payload: &[u8],
    ) -> InvocationRecord {
        let api = self.api;
        let InvocationTarget {
            target, qualifier, ..
        } = destination;

        let outcome = retry_platform_call(
            &self.retry,
            "invoke",
            PlatformError::is_transient,
            move || api.invoke(target, qualifier, payload),
        )
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(exhausted) => {
                return InvocationRecord::failed(
                    format!(
                        "invocation failed after {} attempt(s): {}",
                        exhausted.attempts, exhausted.error
                    ),
                    None,
                )
            }
        };

        let output = serde_json::from_slice::<Value>(&outcome.payload).ok();
        if let Some(function_error) = outcome.function_error {
            return InvocationRecord::failed(format!("function error: {function_error}"), output);
        }

        let Some(report) = outcome.log_tail.as_deref().and_then(parse_report) else {
            return InvocationRecord::failed("log tail contains no REPORT line", output);
        };

        InvocationRecord {
            duration_ms: report.duration_ms,
            billed_duration_ms: report.billed_duration_ms,
            cost: self
                .price_table
                .cost(destination.power_value, report.billed_duration_ms),
            success: true,
            output,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use power_tuning_core::pricing::DEFAULT_BASE_PRICE;
    use serde_json::json;

    use super::*;
    use crate::adapters::function_control::PlatformErrorKind;
    use crate::test_support::FakeFunctionControl;

    fn target() -> TargetRef {
        TargetRef::parse("arnOK").expect("target should parse")
    }

    fn options(parallel: bool) -> InvocationOptions {
        InvocationOptions {
            parallel,
            payload: json!({}),
            include_records: true,
        }
    }

    async fn run_against(
        api: &FakeFunctionControl,
        count: usize,
        parallel: bool,
        max_parallel: usize,
    ) -> Result<PerformanceSummary, TuningError> {
        let table = PriceTable::default();
        let engine = InvocationEngine::new(api, &table, RetryPolicy::no_delay(3), max_parallel);
        let target = target();
        engine
            .run(
                InvocationTarget {
                    target: &target,
                    qualifier: Some("RAM128"),
                    power_value: 128,
                },
                count,
                &options(parallel),
            )
            .await
    }

    #[tokio::test]
    async fn performs_exactly_the_requested_number_of_invocations() {
        for count in [1, 10, 100] {
            for parallel in [false, true] {
                let api = FakeFunctionControl::new(1024);
                api.seed_alias("RAM128", 128);

                let summary = run_against(&api, count, parallel, 16)
                    .await
                    .expect("run should succeed");

                assert_eq!(api.count("invoke"), count, "parallel={parallel}");
                assert_eq!(summary.invocations, count);
                assert_eq!(summary.records.map(|records| records.len()), Some(count));
            }
        }
    }

    #[tokio::test]
    async fn sequential_runs_never_overlap() {
        let api = FakeFunctionControl::new(1024);
        api.seed_alias("RAM128", 128);

        run_against(&api, 10, false, 16).await.expect("run");

        assert_eq!(api.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn parallel_runs_are_bounded_by_the_pool() {
        let api = FakeFunctionControl::new(1024);
        api.seed_alias("RAM128", 128);

        run_against(&api, 20, true, 4).await.expect("run");

        assert!(api.max_in_flight() > 1);
        assert!(api.max_in_flight() <= 4);
    }

    #[tokio::test]
    async fn prices_billed_duration_of_the_alias() {
        let api = FakeFunctionControl::new(1024);
        api.seed_alias("RAM128", 128);

        let summary = run_against(&api, 10, false, 16).await.expect("run");

        // 400 ms at 128 MB is four billing units.
        assert_eq!(summary.value, 128);
        assert!((summary.price - 4.0 * DEFAULT_BASE_PRICE).abs() < 1e-15);
        assert!((summary.duration - 400.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_invocations_are_recorded_without_aborting() {
        let api = FakeFunctionControl::new(1024);
        api.seed_alias("RAM128", 128);
        api.fail_function_calls(3);

        let summary = run_against(&api, 10, false, 16).await.expect("run");

        assert_eq!(api.count("invoke"), 10);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.successful, 7);
        let records = summary.records.expect("records requested");
        assert!(records
            .iter()
            .filter(|record| !record.success)
            .all(|record| record.error.as_deref() == Some("function error: Unhandled")));
    }

    #[tokio::test]
    async fn throttled_invocations_are_retried() {
        let api = FakeFunctionControl::new(1024);
        api.seed_alias("RAM128", 128);
        api.fail_next("invoke", PlatformErrorKind::Transient, 2);

        let summary = run_against(&api, 5, false, 16).await.expect("run");

        assert_eq!(summary.successful, 5);
        assert_eq!(api.count("invoke"), 7);
    }

    #[tokio::test]
    async fn all_failed_invocations_fail_the_run() {
        let api = FakeFunctionControl::new(1024);
        api.seed_alias("RAM128", 128);
        api.fail_function_calls(10);

        let error = run_against(&api, 10, true, 16)
            .await
            .expect_err("run should fail");

        assert!(matches!(
            error,
            TuningError::AllInvocationsFailed {
                value: 128,
                count: 10,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_alias_counts_as_failed_invocations() {
        let api = FakeFunctionControl::new(1024);

        let error = run_against(&api, 2, false, 16)
            .await
            .expect_err("run should fail");

        assert!(error.to_string().contains("alias RAM128 not found"));
    }

    #[tokio::test]
    async fn records_carry_the_function_output() {
        let api = FakeFunctionControl::new(1024);
        api.seed_alias("RAM128", 128);
        let table = PriceTable::default();
        let engine = InvocationEngine::new(&api, &table, RetryPolicy::no_delay(1), 4);
        let target = target();

        let summary = engine
            .run(
                InvocationTarget {
                    target: &target,
                    qualifier: Some("RAM128"),
                    power_value: 128,
                },
                1,
                &InvocationOptions {
                    parallel: false,
                    payload: json!({"key1": "value1"}),
                    include_records: true,
                },
            )
            .await
            .expect("run");

        let records = summary.records.expect("records requested");
        assert_eq!(
            records[0].output,
            Some(json!({"memory": 128, "echo": {"key1": "value1"}}))
        );
    }
}
