//! In-memory `FunctionControl` used by the engine and handler tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use power_tuning_core::contract::TargetRef;
use serde_json::json;

use crate::adapters::function_control::{
    AliasDescription, FunctionControl, InvocationOutcome, PlatformError, PlatformErrorKind,
};

struct ScriptedFailure {
    operation: &'static str,
    subject: Option<String>,
    kind: PlatformErrorKind,
    remaining: Option<u32>,
}

#[derive(Default)]
struct FakeState {
    memory_mb: u32,
    next_version: u32,
    versions: BTreeMap<String, u32>,
    aliases: BTreeMap<String, String>,
    operations: Vec<&'static str>,
    failures: Vec<ScriptedFailure>,
    races: BTreeMap<String, u32>,
    vanishing: BTreeSet<String>,
    function_errors: u32,
    in_flight: usize,
    max_in_flight: usize,
}

impl FakeState {
    fn take_failure(&mut self, operation: &'static str, subject: &str) -> Option<PlatformError> {
        let index = self.failures.iter().position(|failure| {
            failure.operation == operation
                && failure
                    .subject
                    .as_deref()
                    .map(|expected| expected == subject)
                    .unwrap_or(true)
                && failure.remaining != Some(0)
        })?;
        let failure = &mut self.failures[index];
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(PlatformError::new(
            failure.kind,
            format!("scripted {operation} failure for {subject}"),
        ))
    }

    fn publish(&mut self) -> String {
        self.next_version += 1;
        let version = self.next_version.to_string();
        self.versions.insert(version.clone(), self.memory_mb);
        version
    }
}

pub(crate) struct FakeFunctionControl {
    state: Mutex<FakeState>,
}

impl FakeFunctionControl {
    pub(crate) fn new(memory_mb: u32) -> Self {
        Self {
            state: Mutex::new(FakeState {
                memory_mb,
                ..FakeState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("poisoned mutex")
    }

    /// Fails the next `times` calls of `operation`.
    pub(crate) fn fail_next(&self, operation: &'static str, kind: PlatformErrorKind, times: u32) {
        self.lock().failures.push(ScriptedFailure {
            operation,
            subject: None,
            kind,
            remaining: Some(times),
        });
    }

    /// Fails every call of `operation` on `subject`: the alias name, the
    /// version, or the memory size for `set_memory_size`.
    pub(crate) fn fail_always_for(
        &self,
        operation: &'static str,
        subject: &str,
        kind: PlatformErrorKind,
    ) {
        self.lock().failures.push(ScriptedFailure {
            operation,
            subject: Some(subject.to_string()),
            kind,
            remaining: None,
        });
    }

    /// The next invocations report a function error instead of a result.
    pub(crate) fn fail_function_calls(&self, times: u32) {
        self.lock().function_errors = times;
    }

    pub(crate) fn seed_alias(&self, alias_name: &str, memory_mb: u32) -> String {
        let mut state = self.lock();
        let previous = state.memory_mb;
        state.memory_mb = memory_mb;
        let version = state.publish();
        state.memory_mb = previous;
        state.aliases.insert(alias_name.to_string(), version.clone());
        version
    }

    /// Another writer creates `alias_name` right before this client does.
    pub(crate) fn race_alias_creation(&self, alias_name: &str, memory_mb: u32) {
        self.lock().races.insert(alias_name.to_string(), memory_mb);
    }

    /// The alias disappears right after its next lookup.
    pub(crate) fn vanish_after_lookup(&self, alias_name: &str) {
        self.lock().vanishing.insert(alias_name.to_string());
    }

    pub(crate) fn operations(&self) -> Vec<&'static str> {
        self.lock().operations.clone()
    }

    pub(crate) fn count(&self, operation: &str) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|recorded| **recorded == operation)
            .count()
    }

    pub(crate) fn memory_mb(&self) -> u32 {
        self.lock().memory_mb
    }

    pub(crate) fn alias_count(&self) -> usize {
        self.lock().aliases.len()
    }

    pub(crate) fn alias_names(&self) -> Vec<String> {
        self.lock().aliases.keys().cloned().collect()
    }

    pub(crate) fn alias_version(&self, alias_name: &str) -> Option<String> {
        self.lock().aliases.get(alias_name).cloned()
    }

    pub(crate) fn version_count(&self) -> usize {
        self.lock().versions.len()
    }

    pub(crate) fn version_memory(&self, version: &str) -> Option<u32> {
        self.lock().versions.get(version).copied()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }
}

fn not_found(what: &str) -> PlatformError {
    PlatformError::new(PlatformErrorKind::NotFound, format!("{what} not found"))
}

#[async_trait]
impl FunctionControl for FakeFunctionControl {
    async fn get_alias(
        &self,
        _target: &TargetRef,
        alias_name: &str,
    ) -> Result<Option<AliasDescription>, PlatformError> {
        let mut state = self.lock();
        state.operations.push("get_alias");
        if let Some(error) = state.take_failure("get_alias", alias_name) {
            return Err(error);
        }
        let description = state.aliases.get(alias_name).map(|version| AliasDescription {
            name: alias_name.to_string(),
            version: version.clone(),
        });
        if state.vanishing.remove(alias_name) {
            state.aliases.remove(alias_name);
        }
        Ok(description)
    }

    async fn get_memory_size(&self, target: &TargetRef) -> Result<u32, PlatformError> {
        let mut state = self.lock();
        state.operations.push("get_memory_size");
        if let Some(error) = state.take_failure("get_memory_size", target.as_str()) {
            return Err(error);
        }
        Ok(state.memory_mb)
    }

    async fn set_memory_size(
        &self,
        _target: &TargetRef,
        memory_mb: u32,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        state.operations.push("set_memory_size");
        if let Some(error) = state.take_failure("set_memory_size", &memory_mb.to_string()) {
            return Err(error);
        }
        state.memory_mb = memory_mb;
        Ok(())
    }

    async fn publish_version(&self, target: &TargetRef) -> Result<String, PlatformError> {
        let mut state = self.lock();
        state.operations.push("publish_version");
        if let Some(error) = state.take_failure("publish_version", target.as_str()) {
            return Err(error);
        }
        Ok(state.publish())
    }

    async fn create_alias(
        &self,
        _target: &TargetRef,
        version: &str,
        alias_name: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        state.operations.push("create_alias");
        if let Some(error) = state.take_failure("create_alias", alias_name) {
            return Err(error);
        }
        if let Some(memory_mb) = state.races.remove(alias_name) {
            let previous = state.memory_mb;
            state.memory_mb = memory_mb;
            let winner = state.publish();
            state.memory_mb = previous;
            state.aliases.insert(alias_name.to_string(), winner);
        }
        if state.aliases.contains_key(alias_name) {
            return Err(PlatformError::new(
                PlatformErrorKind::Conflict,
                format!("alias {alias_name} already exists"),
            ));
        }
        if !state.versions.contains_key(version) {
            return Err(not_found(&format!("version {version}")));
        }
        state
            .aliases
            .insert(alias_name.to_string(), version.to_string());
        Ok(())
    }

    async fn delete_alias(
        &self,
        _target: &TargetRef,
        alias_name: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        state.operations.push("delete_alias");
        if let Some(error) = state.take_failure("delete_alias", alias_name) {
            return Err(error);
        }
        state
            .aliases
            .remove(alias_name)
            .map(|_| ())
            .ok_or_else(|| not_found(&format!("alias {alias_name}")))
    }

    async fn delete_version(&self, _target: &TargetRef, version: &str) -> Result<(), PlatformError> {
        let mut state = self.lock();
        state.operations.push("delete_version");
        if let Some(error) = state.take_failure("delete_version", version) {
            return Err(error);
        }
        if state.aliases.values().any(|aliased| aliased == version) {
            return Err(PlatformError::new(
                PlatformErrorKind::Conflict,
                format!("version {version} is still referenced by an alias"),
            ));
        }
        state
            .versions
            .remove(version)
            .map(|_| ())
            .ok_or_else(|| not_found(&format!("version {version}")))
    }

    async fn invoke(
        &self,
        _target: &TargetRef,
        qualifier: Option<&str>,
        payload: &[u8],
    ) -> Result<InvocationOutcome, PlatformError> {
        let memory_mb = {
            let mut state = self.lock();
            state.operations.push("invoke");
            if let Some(error) = state.take_failure("invoke", qualifier.unwrap_or("$LATEST")) {
                return Err(error);
            }
            let memory_mb = match qualifier {
                None => state.memory_mb,
                Some(alias_name) => {
                    let version = state
                        .aliases
                        .get(alias_name)
                        .cloned()
                        .ok_or_else(|| not_found(&format!("alias {alias_name}")))?;
                    state
                        .versions
                        .get(&version)
                        .copied()
                        .ok_or_else(|| not_found(&format!("version {version}")))?
                }
            };
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            memory_mb
        };

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let mut state = self.lock();
        state.in_flight -= 1;
        let request_id = state.operations.len();

        if state.function_errors > 0 {
            state.function_errors -= 1;
            return Ok(InvocationOutcome {
                log_tail: Some(format!("START RequestId: {request_id}\nEND RequestId: {request_id}\n")),
                function_error: Some("Unhandled".to_string()),
                payload: br#"{"errorMessage":"boom"}"#.to_vec(),
            });
        }

        // Duration halves each time memory doubles: 400 ms at 128 MB.
        let duration_ms = 51_200.0 / f64::from(memory_mb);
        let billed_ms = duration_ms.ceil();
        let echoed: serde_json::Value = serde_json::from_slice(payload).unwrap_or(json!(null));
        Ok(InvocationOutcome {
            log_tail: Some(format!(
                "START RequestId: {request_id}\nEND RequestId: {request_id}\n\
                 REPORT RequestId: {request_id}\tDuration: {duration_ms:.2} ms\tBilled Duration: {billed_ms} ms\tMemory Size: {memory_mb} MB\tMax Memory Used: 64 MB\t\n"
            )),
            function_error: None,
            payload: serde_json::to_vec(&json!({"memory": memory_mb, "echo": echoed}))
                .expect("fake payload should serialize"),
        })
    }
}
