// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shared data types for the fieldlink client.
//!
//! These types are protocol-facing but SDK-agnostic: a [`NodeAddress`]
//! identifies a point on the server, a [`Value`] carries what was read or
//! will be written, and a [`Quality`] summarizes the server's status word.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

// =============================================================================
// TagId
// =============================================================================

/// Identifier of a tag in the monitoring platform's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    /// Creates a new tag id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the tag id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TagId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TagId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// NodeAddress
// =============================================================================

/// Namespace-qualified identifier part of a node address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeIdentifier {
    /// Numeric identifier (`i=...`).
    Numeric(u32),
    /// String identifier (`s=...`).
    String(String),
}

/// Protocol-level address of a single readable/writable/subscribable point.
///
/// The canonical text form follows the `ns=<index>;i=<n>` /
/// `ns=<index>;s=<name>` convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Namespace index on the server.
    pub namespace: u16,

    /// Identifier within the namespace.
    pub identifier: NodeIdentifier,
}

impl NodeAddress {
    /// Creates a numeric node address.
    pub fn numeric(namespace: u16, id: u32) -> Self {
        Self {
            namespace,
            identifier: NodeIdentifier::Numeric(id),
        }
    }

    /// Creates a string node address.
    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: NodeIdentifier::String(id.into()),
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            NodeIdentifier::Numeric(id) => write!(f, "ns={};i={}", self.namespace, id),
            NodeIdentifier::String(id) => write!(f, "ns={};s={}", self.namespace, id),
        }
    }
}

impl FromStr for NodeAddress {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigurationError::invalid_address(s, reason);

        let (ns_part, id_part) = s
            .split_once(';')
            .ok_or_else(|| invalid("expected 'ns=<index>;<id>'"))?;

        let namespace = ns_part
            .strip_prefix("ns=")
            .ok_or_else(|| invalid("missing 'ns=' prefix"))?
            .parse::<u16>()
            .map_err(|_| invalid("namespace index is not a u16"))?;

        if let Some(numeric) = id_part.strip_prefix("i=") {
            let id = numeric
                .parse::<u32>()
                .map_err(|_| invalid("numeric identifier is not a u32"))?;
            Ok(Self::numeric(namespace, id))
        } else if let Some(name) = id_part.strip_prefix("s=") {
            if name.is_empty() {
                return Err(invalid("string identifier is empty"));
            }
            Ok(Self::string(namespace, name))
        } else {
            Err(invalid("identifier must start with 'i=' or 's='"))
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// A value read from or written to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// String value.
    String(String),
    /// Date/time value.
    DateTime(DateTime<Utc>),
    /// Null / no value.
    Null,
}

impl Value {
    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to interpret the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::Int32(v) => Some(*v != 0),
            Self::Int64(v) => Some(*v != 0),
            Self::UInt32(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Attempts to interpret the value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Float(v) => Some(*v as i64),
            Self::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Attempts to interpret the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt32(v) => Some(f64::from(*v)),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Null => f.write_str("null"),
        }
    }
}

// =============================================================================
// Quality
// =============================================================================

/// Quality of a value, derived from the protocol status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// The value is trustworthy.
    #[default]
    Good,
    /// The value may be stale or degraded.
    Uncertain,
    /// The value is unusable.
    Bad,
}

impl Quality {
    /// Derives a quality from a protocol status word.
    ///
    /// The top two bits carry the severity: `1x` is bad, `01` is uncertain.
    pub fn from_status(status: u32) -> Self {
        if status & 0x8000_0000 != 0 {
            Self::Bad
        } else if status & 0x4000_0000 != 0 {
            Self::Uncertain
        } else {
            Self::Good
        }
    }

    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => f.write_str("Good"),
            Self::Uncertain => f.write_str("Uncertain"),
            Self::Bad => f.write_str("Bad"),
        }
    }
}

// =============================================================================
// DataPoint
// =============================================================================

/// A timestamped value update for a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// The tag the update belongs to.
    pub tag: TagId,

    /// The new value.
    pub value: Value,

    /// Quality of the value.
    pub quality: Quality,

    /// When the update was observed.
    pub timestamp: DateTime<Utc>,
}

impl DataPoint {
    /// Creates a data point timestamped now.
    pub fn new(tag: TagId, value: Value, quality: Quality) -> Self {
        Self {
            tag,
            value,
            quality,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// EquipmentState
// =============================================================================

/// Connection state reported outward to the monitoring platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentState {
    /// Connected and operating.
    Ok,
    /// The initial connection could not be established.
    ConnectionFailed,
    /// A previously working connection was lost.
    ConnectionLost,
}

impl fmt::Display for EquipmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::ConnectionFailed => f.write_str("CONNECTION_FAILED"),
            Self::ConnectionLost => f.write_str("CONNECTION_LOST"),
        }
    }
}

// =============================================================================
// Deadband
// =============================================================================

/// Kind of deadband filter applied to a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeadbandKind {
    /// Report every change.
    #[default]
    None,
    /// Minimum absolute change before a report.
    Absolute,
    /// Minimum change as a percentage of the engineering-unit range.
    Percent,
}

/// Minimum change required before a value update is reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Deadband {
    /// Filter kind.
    pub kind: DeadbandKind,

    /// Magnitude; meaning depends on `kind`.
    pub value: f64,
}

impl Deadband {
    /// No deadband filtering.
    pub fn none() -> Self {
        Self::default()
    }

    /// Absolute deadband of the given magnitude.
    pub fn absolute(value: f64) -> Self {
        Self {
            kind: DeadbandKind::Absolute,
            value,
        }
    }

    /// Percentage deadband of the given magnitude.
    pub fn percent(value: f64) -> Self {
        Self {
            kind: DeadbandKind::Percent,
            value,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
