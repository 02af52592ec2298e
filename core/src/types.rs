//! Core types for BINVOTE
//!
//! Defines the data structures exchanged between processes and exposed to
//! operators: process identifiers, binary values, vote messages and the
//! observable process state.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Round counter of a single process
pub type Round = u32;

/// Index of a process in the cluster, unique in `[0, N)`
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub usize);

impl ProcessId {
    pub fn new(index: usize) -> Self {
        ProcessId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }

    /// All ids of an `n`-process cluster
    pub fn all(n: usize) -> impl Iterator<Item = ProcessId> {
        (0..n).map(ProcessId)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", self.0)
    }
}

/// Value held by a process.
///
/// On the wire this is `0`, `1` or the undetermined sentinel `"?"`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    Zero,
    One,
    Undetermined,
}

impl Value {
    /// Only `0` and `1` count as votes
    pub fn is_binary(&self) -> bool {
        matches!(self, Value::Zero | Value::One)
    }

    /// Interpret a raw JSON value leniently.
    ///
    /// Returns `None` for anything that is not `0`, `1` or `"?"`.
    pub fn from_json(raw: &serde_json::Value) -> Option<Value> {
        match raw {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(v) if v == 0.0 => Some(Value::Zero),
                Some(v) if v == 1.0 => Some(Value::One),
                _ => None,
            },
            serde_json::Value::String(s) if s == "?" => Some(Value::Undetermined),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Zero => write!(f, "0"),
            Value::One => write!(f, "1"),
            Value::Undetermined => write!(f, "?"),
        }
    }
}

impl FromStr for Value {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Value::Zero),
            "1" => Ok(Value::One),
            "?" => Ok(Value::Undetermined),
            other => Err(format!("invalid value '{}', expected 0, 1 or ?", other)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Zero => serializer.serialize_u8(0),
            Value::One => serializer.serialize_u8(1),
            Value::Undetermined => serializer.serialize_str("?"),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid process value: {}", raw)))
    }
}

/// Observable state of a process, as returned by `getState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    pub killed: bool,
    /// Current value, `None` once stopped or when faulty
    #[serde(rename = "x")]
    pub value: Option<Value>,
    pub decided: Option<bool>,
    /// Current round, `None` once stopped or when faulty
    #[serde(rename = "k")]
    pub round: Option<Round>,
}

impl ProcessState {
    /// Fresh state of a healthy process
    pub fn initial(value: Value) -> Self {
        Self {
            killed: false,
            value: Some(value),
            decided: Some(false),
            round: Some(0),
        }
    }

    /// Permanently undetermined state of a faulty process
    pub fn faulty() -> Self {
        Self {
            killed: false,
            value: None,
            decided: None,
            round: None,
        }
    }

    /// State after `stop`
    pub fn killed() -> Self {
        Self {
            killed: true,
            value: None,
            decided: None,
            round: None,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.decided == Some(true)
    }
}

/// Vote sent from one process to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub from: ProcessId,
    pub value: Value,
}

/// Answer of the `status` operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Live,
    Faulty,
}

impl ProcessStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, ProcessStatus::Live)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Live => write!(f, "live"),
            ProcessStatus::Faulty => write!(f, "faulty"),
        }
    }
}
