// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The metric record exchanged between agent and collector.
//!
//! Only two kinds exist. A gauge carries `value` and is stored with latest-value semantics, a
//! counter carries `delta` and is accumulated by the collector. Exactly one of the two value
//! fields is populated, selected by the kind.
//!
//! ```
//! use metrics_common::metric::{Metric, MetricValue};
//!
//! let metric: Metric = serde_json::from_str(r#"{"id":"Alloc","type":"gauge","value":123.0}"#).unwrap();
//! assert_eq!(metric.validate(), Ok(MetricValue::Gauge(123.0)));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

const GAUGE: &str = "gauge";
const COUNTER: &str = "counter";

/// Metric kind as carried in the `type` field.
///
/// Unrecognized kinds are preserved rather than rejected at decode time so that batch ingestion
/// can skip them individually.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricKind {
    Gauge,
    Counter,
    Unknown(String),
}

impl MetricKind {
    pub fn as_str(&self) -> &str {
        match self {
            MetricKind::Gauge => GAUGE,
            MetricKind::Counter => COUNTER,
            MetricKind::Unknown(raw) => raw,
        }
    }

    /// Parses a kind coming from a URL segment or config, rejecting unknown values.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match MetricKind::from(raw.to_string()) {
            MetricKind::Unknown(raw) => Err(ValidationError::UnknownKind(raw)),
            kind => Ok(kind),
        }
    }
}

impl From<String> for MetricKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            GAUGE => MetricKind::Gauge,
            COUNTER => MetricKind::Counter,
            _ => MetricKind::Unknown(raw),
        }
    }
}

impl From<MetricKind> for String {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated value, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(value) => write!(f, "{value}"),
            MetricValue::Counter(delta) => write!(f, "{delta}"),
        }
    }
}

/// Wire representation of a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// A record carrying only an id and a kind, as used by value queries.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Metric {
            id: id.into(),
            kind,
            delta: None,
            value: None,
        }
    }

    pub fn from_value(id: impl Into<String>, value: MetricValue) -> Self {
        match value {
            MetricValue::Gauge(value) => Metric::gauge(id, value),
            MetricValue::Counter(delta) => Metric::counter(id, delta),
        }
    }

    /// Builds a record from the textual `{type}/{name}/{value}` form.
    pub fn parse_text(kind: &str, id: &str, raw: &str) -> Result<Self, ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        match MetricKind::parse(kind)? {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(|value| Metric::gauge(id, value))
                .ok_or_else(|| ValidationError::InvalidValue {
                    kind: GAUGE,
                    raw: raw.to_string(),
                }),
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(|delta| Metric::counter(id, delta))
                .map_err(|_| ValidationError::InvalidValue {
                    kind: COUNTER,
                    raw: raw.to_string(),
                }),
            MetricKind::Unknown(raw) => Err(ValidationError::UnknownKind(raw)),
        }
    }

    /// Checks the id and kind only, as required for read-back queries.
    pub fn validate_query(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        if let MetricKind::Unknown(raw) = &self.kind {
            return Err(ValidationError::UnknownKind(raw.clone()));
        }
        Ok(())
    }

    /// Enforces the record shape rules and returns the typed value.
    pub fn validate(&self) -> Result<MetricValue, ValidationError> {
        self.validate_query()?;
        match (&self.kind, self.value, self.delta) {
            (MetricKind::Gauge, _, Some(_)) => Err(ValidationError::UnexpectedField {
                field: "delta",
                kind: GAUGE,
            }),
            (MetricKind::Gauge, Some(value), None) if !value.is_finite() => {
                Err(ValidationError::InvalidValue {
                    kind: GAUGE,
                    raw: value.to_string(),
                })
            }
            (MetricKind::Gauge, Some(value), None) => Ok(MetricValue::Gauge(value)),
            (MetricKind::Gauge, None, None) => Err(ValidationError::MissingValue),
            (MetricKind::Counter, Some(_), _) => Err(ValidationError::UnexpectedField {
                field: "value",
                kind: COUNTER,
            }),
            (MetricKind::Counter, None, Some(delta)) => Ok(MetricValue::Counter(delta)),
            (MetricKind::Counter, None, None) => Err(ValidationError::MissingDelta),
            (MetricKind::Unknown(raw), _, _) => Err(ValidationError::UnknownKind(raw.clone())),
        }
    }
}
