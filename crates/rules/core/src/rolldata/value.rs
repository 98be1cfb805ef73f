//! Dynamic value tree used as the formula evaluation environment.
//!
//! Persistent game data lives in typed structs (`model`). The roll-data
//! context is the one place where dynamic, dotted-path access is the right
//! tool: formulas reference arbitrary `@a.b.c` paths and combat changes
//! write back to arbitrary destinations. `Value` keeps that dynamism
//! contained to the ephemeral snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A node in the roll-data tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Empty object node.
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Numeric view of this value.
    ///
    /// Booleans coerce to 0/1 and numeric strings parse; everything else
    /// (including missing paths, handled by the caller) is 0. This mirrors
    /// the "undefined path substitutes zero" evaluation policy.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Str(s) => s.trim().parse().unwrap_or(0.0),
            Value::Array(_) | Value::Object(_) => 0.0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            other => other.as_number() != 0.0,
        }
    }

    /// String view; numbers render without a trailing `.0` when integral.
    pub fn render(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => String::new(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Render an f64 the way dice totals are usually read: integers without
/// a decimal point.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
