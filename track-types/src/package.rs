//! Activity packages: the units of work queued for delivery.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::PackageId;
use crate::kind::ActivityKind;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value (counters, durations, timestamps).
    Int(i64),
    /// Floating point value (revenue).
    Float(f64),
    /// String value.
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(v) => f.write_str(v),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Ordered parameter mapping sent with a package.
pub type Parameters = BTreeMap<String, ParamValue>;

/// One queued unit of work, ready for transmission.
///
/// Packages are immutable: the only change a package ever sees is its retry
/// count, and that goes through [`ActivityPackage::with_failed_attempt`],
/// which consumes the old value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPackage {
    id: PackageId,
    kind: ActivityKind,
    parameters: Parameters,
    /// Milliseconds since the Unix epoch.
    created_at: u64,
    #[serde(default)]
    retries: u32,
}

impl ActivityPackage {
    /// Create a package with a fresh id and no retries.
    pub fn new(kind: ActivityKind, parameters: Parameters, created_at: u64) -> Self {
        Self {
            id: PackageId::new(),
            kind,
            parameters,
            created_at,
            retries: 0,
        }
    }

    /// Package identifier.
    pub fn id(&self) -> PackageId {
        self.id
    }

    /// Package kind.
    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    /// Endpoint path this package is delivered to.
    pub fn path(&self) -> &'static str {
        self.kind.path()
    }

    /// Parameters in key order.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Look up a single parameter.
    pub fn parameter(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Number of failed delivery attempts so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Record one failed delivery attempt.
    pub fn with_failed_attempt(mut self) -> Self {
        self.retries = self.retries.saturating_add(1);
        self
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self.parameters.get("event_token") {
            Some(token) => format!("{}:{}", self.kind, token),
            None => self.kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Parameters {
        let mut p = Parameters::new();
        p.insert("event_token".into(), "abc123".into());
        p.insert("event_count".into(), 3i64.into());
        p.insert("revenue".into(), 1.25f64.into());
        p
    }

    #[test]
    fn new_package_has_no_retries() {
        let pkg = ActivityPackage::new(ActivityKind::Event, params(), 1_700_000_000_000);
        assert_eq!(pkg.retries(), 0);
        assert_eq!(pkg.path(), "/event");
        assert_eq!(pkg.created_at(), 1_700_000_000_000);
    }

    #[test]
    fn failed_attempt_only_touches_retry_count() {
        let pkg = ActivityPackage::new(ActivityKind::Event, params(), 10);
        let retried = pkg.clone().with_failed_attempt().with_failed_attempt();

        assert_eq!(retried.retries(), 2);
        assert_eq!(retried.id(), pkg.id());
        assert_eq!(retried.parameters(), pkg.parameters());
        assert_eq!(retried.created_at(), pkg.created_at());
    }

    #[test]
    fn parameter_values_keep_their_type_through_json() {
        let pkg = ActivityPackage::new(ActivityKind::Event, params(), 10);
        let json = serde_json::to_string(&pkg).unwrap();
        let restored: ActivityPackage = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.parameter("event_count"), Some(&ParamValue::Int(3)));
        assert_eq!(restored.parameter("revenue"), Some(&ParamValue::Float(1.25)));
        assert_eq!(
            restored.parameter("event_token"),
            Some(&ParamValue::Str("abc123".into()))
        );
    }

    #[test]
    fn missing_retry_count_defaults_to_zero() {
        let pkg = ActivityPackage::new(ActivityKind::SessionStart, Parameters::new(), 10);
        let mut value = serde_json::to_value(&pkg).unwrap();
        value.as_object_mut().unwrap().remove("retries");

        let restored: ActivityPackage = serde_json::from_value(value).unwrap();
        assert_eq!(restored.retries(), 0);
    }

    #[test]
    fn describe_includes_event_token() {
        let pkg = ActivityPackage::new(ActivityKind::Event, params(), 10);
        assert_eq!(pkg.describe(), "event:abc123");

        let session = ActivityPackage::new(ActivityKind::SessionStart, Parameters::new(), 10);
        assert_eq!(session.describe(), "session");
    }

    #[test]
    fn huge_unsigned_values_saturate() {
        assert_eq!(ParamValue::from(u64::MAX), ParamValue::Int(i64::MAX));
    }
}
