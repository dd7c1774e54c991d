//! Core types for subscription reconciliation.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Prefix of every subscription identity.
const IDENTITY_PREFIX: &str = "cwlsf-";

/// Hex characters of the digest kept in an identity.
const IDENTITY_HEX_LEN: usize = 16;

/// Deterministic identity of a reconciled subscription.
///
/// Derived from the log group alone (one subscription per log group), so
/// repeated runs recognize the same resource without asking the remote side.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// Compute the identity for a log group.
    pub fn for_log_group(log_group_name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(log_group_name.as_bytes());
        hasher.update(b"-");
        let digest = hex::encode(hasher.finalize());
        SubscriptionId(format!("{IDENTITY_PREFIX}{}", &digest[..IDENTITY_HEX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of endpoint receives the routed records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// A data stream; must be active before it is addressable.
    Stream,
    /// A function; needs an invocation permission for the log service.
    FunctionInvoke,
    Other,
}

/// Destination reference, parsed once from its ARN.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRef {
    pub kind: DestinationKind,
    /// Stream name, function name, or the raw resource part.
    pub identifier: String,
    /// Function version or alias, when the ARN names one.
    #[serde(default)]
    pub qualifier: Option<String>,
    pub arn: String,
    pub partition: String,
    pub region: String,
    pub account_id: String,
}

impl DestinationRef {
    /// Parse `arn:<partition>:<service>:<region>:<account>:<resource>`.
    pub fn parse(arn: &str) -> Result<Self> {
        let parts: Vec<&str> = arn.splitn(6, ':').collect();
        if parts.len() < 6 || parts[0] != "arn" {
            return Err(ReconcileError::InvalidDestination(format!(
                "not an ARN: {arn}"
            )));
        }
        let (partition, service, region, account_id, resource) =
            (parts[1], parts[2], parts[3], parts[4], parts[5]);
        if resource.is_empty() {
            return Err(ReconcileError::InvalidDestination(format!(
                "ARN has no resource: {arn}"
            )));
        }

        let (kind, identifier, qualifier) = match service {
            "kinesis" => {
                let name = resource.strip_prefix("stream/").ok_or_else(|| {
                    ReconcileError::InvalidDestination(format!("not a stream ARN: {arn}"))
                })?;
                (DestinationKind::Stream, name.to_string(), None)
            }
            "lambda" => {
                let mut segments = resource.splitn(3, ':');
                match (segments.next(), segments.next(), segments.next()) {
                    (Some("function"), Some(name), qualifier) if !name.is_empty() => {
                        let qualifier = match qualifier {
                            Some("") => {
                                return Err(ReconcileError::InvalidDestination(format!(
                                    "empty function qualifier: {arn}"
                                )))
                            }
                            other => other.map(str::to_string),
                        };
                        (DestinationKind::FunctionInvoke, name.to_string(), qualifier)
                    }
                    _ => {
                        return Err(ReconcileError::InvalidDestination(format!(
                            "not a function ARN: {arn}"
                        )))
                    }
                }
            }
            _ => (DestinationKind::Other, resource.to_string(), None),
        };

        Ok(Self {
            kind,
            identifier,
            qualifier,
            arn: arn.to_string(),
            partition: partition.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
        })
    }

    /// Function reference for policy calls: `name` or `name:qualifier`.
    pub fn function_ref(&self) -> String {
        match &self.qualifier {
            Some(qualifier) => format!("{}:{}", self.identifier, qualifier),
            None => self.identifier.clone(),
        }
    }

    pub fn requires_readiness(&self) -> bool {
        self.kind == DestinationKind::Stream
    }

    pub fn requires_authorization(&self) -> bool {
        self.kind == DestinationKind::FunctionInvoke
    }
}

/// Desired state of the composite subscription resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// Filter name. Immutable.
    pub name: String,
    /// Source log group. Immutable.
    pub log_group_name: String,
    /// Immutable.
    pub destination: DestinationRef,
    pub filter_pattern: String,
    #[serde(default)]
    pub role_arn: Option<String>,
}

impl SubscriptionSpec {
    /// Build a spec, parsing the destination ARN at the boundary.
    pub fn new(
        name: impl Into<String>,
        log_group_name: impl Into<String>,
        destination_arn: &str,
        filter_pattern: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            log_group_name: log_group_name.into(),
            destination: DestinationRef::parse(destination_arn)?,
            filter_pattern: filter_pattern.into(),
            role_arn: None,
        })
    }

    pub fn with_role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    pub fn identity(&self) -> SubscriptionId {
        SubscriptionId::for_log_group(&self.log_group_name)
    }

    /// First immutable field that differs from `prior`, if any.
    pub fn replacement_field(&self, prior: &SubscriptionSpec) -> Option<&'static str> {
        if self.name != prior.name {
            Some("name")
        } else if self.log_group_name != prior.log_group_name {
            Some("log_group_name")
        } else if self.destination.arn != prior.destination.arn {
            Some("destination_arn")
        } else {
            None
        }
    }

    /// Request body for the subscription store.
    pub fn put_request(&self) -> PutSubscriptionRequest {
        PutSubscriptionRequest {
            filter_name: self.name.clone(),
            log_group_name: self.log_group_name.clone(),
            destination_arn: self.destination.arn.clone(),
            filter_pattern: self.filter_pattern.clone(),
            role_arn: self.role_arn.clone(),
        }
    }
}

/// Create-or-update body sent to the subscription store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutSubscriptionRequest {
    pub filter_name: String,
    pub log_group_name: String,
    pub destination_arn: String,
    pub filter_pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
}

/// A subscription filter as described by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    pub filter_name: String,
    pub log_group_name: String,
    pub destination_arn: String,
    pub filter_pattern: String,
    #[serde(default)]
    pub role_arn: Option<String>,
}

/// One invocation permission on a destination function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub statement_id: String,
    pub principal: String,
    pub action: String,
    pub source_arn: String,
    pub source_account: String,
    pub function_identifier: String,
}

impl PermissionGrant {
    pub const INVOKE_ACTION: &'static str = "lambda:InvokeFunction";

    /// Grant letting the log service of the destination's region invoke it.
    pub fn for_subscription(spec: &SubscriptionSpec, statement_id: String) -> Self {
        let dest = &spec.destination;
        Self {
            statement_id,
            principal: format!("logs.{}.amazonaws.com", dest.region),
            action: Self::INVOKE_ACTION.to_string(),
            source_arn: format!(
                "arn:{}:logs:{}:{}:log-group:{}:*",
                dest.partition, dest.region, dest.account_id, spec.log_group_name
            ),
            source_account: dest.account_id.clone(),
            function_identifier: dest.function_ref(),
        }
    }
}

/// A function's invocation policy document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Statement", default, deserialize_with = "one_or_many")]
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn contains(&self, statement_id: &str) -> bool {
        self.statements
            .iter()
            .any(|s| s.id.as_deref() == Some(statement_id))
    }
}

/// One statement of a policy document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Sid", default)]
    pub id: Option<String>,
    #[serde(rename = "Effect", default)]
    pub effect: Option<String>,
    #[serde(rename = "Resource", default)]
    pub resource: Option<serde_json::Value>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<PolicyStatement>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(PolicyStatement),
        Many(Vec<PolicyStatement>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(statement) => vec![statement],
        OneOrMany::Many(statements) => statements,
    })
}

/// Readiness wait parameters for one upstream dependency.
#[derive(Clone, Debug)]
pub struct DependencyReadiness {
    pub resource_name: String,
    pub pending_states: BTreeSet<String>,
    pub target_states: BTreeSet<String>,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl DependencyReadiness {
    pub fn new<P, T>(resource_name: impl Into<String>, pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            resource_name: resource_name.into(),
            pending_states: pending.into_iter().map(Into::into).collect(),
            target_states: target.into_iter().map(Into::into).collect(),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Retry settings for throttled calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first.
    pub max_attempts: u32,
    #[serde(with = "duration_millis", rename = "base_delay_ms")]
    pub base_delay: Duration,
    /// Upper bound of the random extra delay, as a fraction of `base_delay`.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            base_delay: Duration::from_millis(2000),
            jitter_fraction: 0.5,
        }
    }
}

/// Serde helper storing a `Duration` as whole milliseconds.
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
