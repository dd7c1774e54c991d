//! In-memory remote services shared by the integration tests.

#![allow(dead_code)]

use logsub::{
    PermissionGrant, PolicySource, PutSubscriptionRequest, ReconcilerConfig, RemoteError,
    RetryPolicy, StatusSource, StreamReadinessConfig, SubscriptionFilter, SubscriptionReconciler,
    SubscriptionSpec, SubscriptionStore,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub const ACCOUNT: &str = "123456789012";
pub const FUNCTION_ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:shipper";
pub const STREAM_ARN: &str = "arn:aws:kinesis:us-east-1:123456789012:stream/events";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// --- Streams ---

/// Replays scripted stream states; the last one repeats once drained.
#[derive(Default)]
pub struct FakeStreams {
    script: Mutex<VecDeque<Result<String, RemoteError>>>,
    last: Mutex<Option<String>>,
    polls: Mutex<u32>,
}

impl FakeStreams {
    pub fn with_states(states: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        *fake.script.lock() = states.iter().map(|s| Ok(s.to_string())).collect();
        Arc::new(fake)
    }

    pub fn failing(error: RemoteError) -> Arc<Self> {
        let fake = Self::default();
        fake.script.lock().push_back(Err(error));
        Arc::new(fake)
    }

    pub fn polls(&self) -> u32 {
        *self.polls.lock()
    }
}

impl StatusSource for FakeStreams {
    fn get_status(&self, _resource_name: &str) -> Result<String, RemoteError> {
        *self.polls.lock() += 1;
        match self.script.lock().pop_front() {
            Some(Ok(state)) => {
                *self.last.lock() = Some(state.clone());
                Ok(state)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .clone()
                .ok_or_else(|| RemoteError::not_found("stream not found")),
        }
    }
}

// --- Functions ---

/// Policy store keyed by function name. Functions without statements have
/// no policy at all, like the real service.
#[derive(Default)]
pub struct FakeFunctions {
    statements: Mutex<HashMap<String, Vec<String>>>,
    pub add_error: Mutex<Option<RemoteError>>,
    pub remove_error: Mutex<Option<RemoteError>>,
    pub raw_policy: Mutex<Option<String>>,
    policy_reads: Mutex<u32>,
    adds: Mutex<u32>,
    removes: Mutex<u32>,
}

impl FakeFunctions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_statement(function: &str, statement_id: &str) -> Arc<Self> {
        let fake = Self::default();
        fake.statements
            .lock()
            .insert(function.to_string(), vec![statement_id.to_string()]);
        Arc::new(fake)
    }

    pub fn statements(&self, function: &str) -> Vec<String> {
        self.statements
            .lock()
            .get(function)
            .cloned()
            .unwrap_or_default()
    }

    pub fn adds(&self) -> u32 {
        *self.adds.lock()
    }

    pub fn removes(&self) -> u32 {
        *self.removes.lock()
    }

    pub fn policy_reads(&self) -> u32 {
        *self.policy_reads.lock()
    }
}

impl PolicySource for FakeFunctions {
    fn get_policy(&self, function: &str) -> Result<String, RemoteError> {
        *self.policy_reads.lock() += 1;
        if let Some(raw) = self.raw_policy.lock().clone() {
            return Ok(raw);
        }
        let statements = self.statements.lock();
        match statements.get(function) {
            Some(ids) if !ids.is_empty() => {
                let statement: Vec<_> = ids
                    .iter()
                    .map(|id| {
                        json!({
                            "Sid": id,
                            "Effect": "Allow",
                            "Resource": format!("arn:aws:lambda:us-east-1:{ACCOUNT}:function:{function}"),
                        })
                    })
                    .collect();
                Ok(json!({"Version": "2012-10-17", "Statement": statement}).to_string())
            }
            _ => Err(RemoteError::not_found(format!(
                "The resource you requested does not exist: {function}"
            ))),
        }
    }

    fn add_permission(&self, grant: &PermissionGrant) -> Result<(), RemoteError> {
        *self.adds.lock() += 1;
        if let Some(e) = self.add_error.lock().clone() {
            return Err(e);
        }
        let mut statements = self.statements.lock();
        let ids = statements
            .entry(grant.function_identifier.clone())
            .or_default();
        if ids.contains(&grant.statement_id) {
            return Err(RemoteError::conflict("statement id already exists"));
        }
        ids.push(grant.statement_id.clone());
        Ok(())
    }

    fn remove_permission(&self, function: &str, statement_id: &str) -> Result<(), RemoteError> {
        *self.removes.lock() += 1;
        if let Some(e) = self.remove_error.lock().clone() {
            return Err(e);
        }
        let mut statements = self.statements.lock();
        let ids = statements
            .get_mut(function)
            .ok_or_else(|| RemoteError::not_found("no policy"))?;
        let before = ids.len();
        ids.retain(|id| id != statement_id);
        if ids.len() == before {
            return Err(RemoteError::not_found("statement not found"));
        }
        Ok(())
    }
}

// --- Log subscriptions ---

/// Subscription filters keyed by (log group, filter name).
#[derive(Default)]
pub struct FakeLogs {
    filters: Mutex<HashMap<(String, String), PutSubscriptionRequest>>,
    put_failures: Mutex<VecDeque<RemoteError>>,
    delete_failures: Mutex<VecDeque<RemoteError>>,
    pub describe_error: Mutex<Option<RemoteError>>,
    puts: Mutex<u32>,
    deletes: Mutex<u32>,
}

impl FakeLogs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next puts with these errors, in order.
    pub fn fail_puts(&self, errors: impl IntoIterator<Item = RemoteError>) {
        self.put_failures.lock().extend(errors);
    }

    pub fn fail_deletes(&self, errors: impl IntoIterator<Item = RemoteError>) {
        self.delete_failures.lock().extend(errors);
    }

    pub fn filter(&self, log_group: &str, name: &str) -> Option<PutSubscriptionRequest> {
        self.filters
            .lock()
            .get(&(log_group.to_string(), name.to_string()))
            .cloned()
    }

    /// Drop a filter behind the reconciler's back.
    pub fn remove_remotely(&self, log_group: &str, name: &str) {
        self.filters
            .lock()
            .remove(&(log_group.to_string(), name.to_string()));
    }

    pub fn puts(&self) -> u32 {
        *self.puts.lock()
    }

    pub fn deletes(&self) -> u32 {
        *self.deletes.lock()
    }
}

impl SubscriptionStore for FakeLogs {
    fn put(&self, request: &PutSubscriptionRequest) -> Result<(), RemoteError> {
        *self.puts.lock() += 1;
        if let Some(e) = self.put_failures.lock().pop_front() {
            return Err(e);
        }
        self.filters.lock().insert(
            (request.log_group_name.clone(), request.filter_name.clone()),
            request.clone(),
        );
        Ok(())
    }

    fn delete(&self, log_group_name: &str, filter_name: &str) -> Result<(), RemoteError> {
        *self.deletes.lock() += 1;
        if let Some(e) = self.delete_failures.lock().pop_front() {
            return Err(e);
        }
        self.filters
            .lock()
            .remove(&(log_group_name.to_string(), filter_name.to_string()))
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found("filter does not exist"))
    }

    fn describe(
        &self,
        log_group_name: &str,
        name_prefix: &str,
    ) -> Result<Vec<SubscriptionFilter>, RemoteError> {
        if let Some(e) = self.describe_error.lock().clone() {
            return Err(e);
        }
        Ok(self
            .filters
            .lock()
            .values()
            .filter(|r| r.log_group_name == log_group_name && r.filter_name.starts_with(name_prefix))
            .map(|r| SubscriptionFilter {
                filter_name: r.filter_name.clone(),
                log_group_name: r.log_group_name.clone(),
                destination_arn: r.destination_arn.clone(),
                filter_pattern: r.filter_pattern.clone(),
                role_arn: r.role_arn.clone(),
            })
            .collect())
    }
}

// --- Setup ---

pub fn fast_config() -> ReconcilerConfig {
    ReconcilerConfig {
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            jitter_fraction: 0.5,
        },
        stream_readiness: StreamReadinessConfig {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
            ..Default::default()
        },
        serialize_per_identity: true,
    }
}

pub struct Harness {
    pub streams: Arc<FakeStreams>,
    pub functions: Arc<FakeFunctions>,
    pub logs: Arc<FakeLogs>,
    pub reconciler: SubscriptionReconciler,
}

impl Harness {
    pub fn new(streams: Arc<FakeStreams>, functions: Arc<FakeFunctions>) -> Self {
        Self::with_config(fast_config(), streams, functions)
    }

    pub fn with_config(
        config: ReconcilerConfig,
        streams: Arc<FakeStreams>,
        functions: Arc<FakeFunctions>,
    ) -> Self {
        init_tracing();
        let logs = FakeLogs::new();
        let reconciler =
            SubscriptionReconciler::new(config, streams.clone(), functions.clone(), logs.clone())
                .unwrap();
        Self {
            streams,
            functions,
            logs,
            reconciler,
        }
    }

    pub fn default_fakes() -> Self {
        Self::new(FakeStreams::with_states(&["ACTIVE"]), FakeFunctions::new())
    }
}

pub fn function_spec(log_group: &str) -> SubscriptionSpec {
    SubscriptionSpec::new("ship-errors", log_group, FUNCTION_ARN, "ERROR").unwrap()
}

pub fn stream_spec(log_group: &str) -> SubscriptionSpec {
    SubscriptionSpec::new("to-stream", log_group, STREAM_ARN, "")
        .unwrap()
        .with_role_arn(format!("arn:aws:iam::{ACCOUNT}:role/logs-to-kinesis"))
}
