// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # The Dynamic `Value` Tree
//!
//! The resolver context (`trigger`, `stages`, `item`) is a heterogeneous
//! tree. Rather than operate on `serde_json::Value` directly throughout the
//! evaluator, the domain models it as its own tagged union so that
//! comparison semantics (missing path → `Null`, incompatible-type
//! comparison → `false`) are explicit domain rules rather than incidental
//! JSON behavior.
//!
//! Conversions to and from `serde_json::Value` exist at the boundary
//! because pipeline triggers, actor inputs, and actor outputs are
//! serialized as JSON on the wire and in Redis.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number as JsonNumber;

/// A dynamic, JSON-like value. `Map` uses a `BTreeMap` so that
/// `combine: object` output and any other map serialization is
/// deterministic regardless of insertion order, which matters for the
/// `gathered` symbol exposed by `combine: object` gather stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by `when` predicates and scatter `condition`s: only
    /// an explicit `Bool(true)` is truthy. Everything else, including
    /// non-empty strings and non-zero numbers, is not — the evaluator is
    /// not JavaScript.
    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Renders a stable string key for `groupBy`. Used so a `groupBy`
    /// expression result of any scalar type can key a `HashMap` of groups.
    pub fn to_group_key(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Equality/ordering comparisons per §4.3: comparing incompatible types
    /// yields `false` rather than raising.
    pub fn compare(&self, op: CompareOp, other: &Value) -> bool {
        use CompareOp::*;
        match op {
            Eq => self.loose_eq(other),
            Ne => !self.loose_eq(other),
            Lt | Gt | Le | Ge => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => match op {
                    Lt => a < b,
                    Gt => a > b,
                    Le => a <= b,
                    Ge => a >= b,
                    Eq | Ne => unreachable!(),
                },
                _ => false,
            },
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y)),
            (Value::Map(a), Value::Map(b)) => a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| v.loose_eq(bv))),
            _ => false,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts from the wire format used for triggers, actor inputs, and
    /// actor outputs.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => JsonNumber::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => {
                serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from_json(value)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

/// Comparison operators supported by the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_path_style_comparisons_of_incompatible_types_are_false() {
        let a = Value::String("x".to_string());
        let b = Value::Number(1.0);
        assert!(!a.compare(CompareOp::Eq, &b));
        assert!(!a.compare(CompareOp::Lt, &b));
    }

    #[test]
    fn null_is_not_truthy() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::String("true".into()).is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }

    #[test]
    fn group_key_is_stable_for_scalars() {
        assert_eq!(Value::Number(3.0).to_group_key(), "3");
        assert_eq!(Value::String("a".into()).to_group_key(), "a");
    }

    #[test]
    fn json_round_trip() {
        let json = json!({"a": 1, "b": [true, null, "x"]});
        let value = Value::from_json(json.clone());
        assert_eq!(value.to_json(), json);
    }
}
