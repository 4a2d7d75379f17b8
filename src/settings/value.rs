//! Untyped settings tree.
//!
//! Persisted settings and command-line edits arrive as loosely shaped data.
//! [`SettingValue`] is the tagged union the sanitizer walks; it can express
//! everything a stored settings blob might contain, including the
//! `Undefined` marker a JSON document cannot carry but an in-process caller
//! can.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One node of an untrusted settings tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// A key that is present but carries no value.
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<SettingValue>),
    Group(BTreeMap<String, SettingValue>),
}

impl SettingValue {
    /// An empty group.
    pub fn empty_group() -> Self {
        SettingValue::Group(BTreeMap::new())
    }

    /// Build a group from `(key, value)` pairs.
    pub fn group<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, SettingValue)>,
    {
        SettingValue::Group(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wrap `value` in nested groups following a dotted key path.
    ///
    /// `"simplifyOptions.ratio"` becomes `{simplifyOptions: {ratio: value}}`.
    pub fn at_path(path: &str, value: SettingValue) -> Self {
        path.rsplit('.')
            .fold(value, |inner, key| SettingValue::group([(key, inner)]))
    }

    /// Undefined and empty-string leaves are never accepted.
    pub fn is_disallowed(&self) -> bool {
        match self {
            SettingValue::Undefined => true,
            SettingValue::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    /// `Some([a, b])` when this is a list of exactly two numbers.
    pub fn as_pair(&self) -> Option<[f64; 2]> {
        match self {
            SettingValue::List(items) => match items.as_slice() {
                [SettingValue::Num(a), SettingValue::Num(b)] => Some([*a, *b]),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&BTreeMap<String, SettingValue>> {
        match self {
            SettingValue::Group(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, SettingValue::Group(_))
    }

    /// Short type name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Undefined => "undefined",
            SettingValue::Null => "null",
            SettingValue::Bool(_) => "boolean",
            SettingValue::Num(_) => "number",
            SettingValue::Str(_) => "string",
            SettingValue::List(_) => "list",
            SettingValue::Group(_) => "group",
        }
    }

    /// Deep-merge `patch` on top of `self`.
    ///
    /// Groups merge key by key; any other patch value replaces the node.
    /// No schema checks happen here, that is the sanitizer's job.
    pub fn overlay(&mut self, patch: SettingValue) {
        match (self, patch) {
            (SettingValue::Group(base), SettingValue::Group(patch)) => {
                for (key, value) in patch {
                    match base.get_mut(&key) {
                        Some(existing) => existing.overlay(value),
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
            }
            (slot, patch) => *slot = patch,
        }
    }

    /// Convert to JSON. `Undefined` has no JSON form and yields `None`;
    /// undefined members of groups and lists are dropped.
    pub fn to_json(&self) -> Option<Value> {
        Some(match self {
            SettingValue::Undefined => return None,
            SettingValue::Null => Value::Null,
            SettingValue::Bool(b) => Value::Bool(*b),
            SettingValue::Num(n) => number_to_json(*n),
            SettingValue::Str(s) => Value::String(s.clone()),
            SettingValue::List(items) => {
                Value::Array(items.iter().filter_map(SettingValue::to_json).collect())
            }
            SettingValue::Group(map) => Value::Object(
                map.iter()
                    .filter_map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                    .collect::<Map<String, Value>>(),
            ),
        })
    }
}

/// Integral values go back out as JSON integers so they decode into
/// integer fields of the typed schema.
fn number_to_json(n: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<Value> for SettingValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SettingValue::Null,
            Value::Bool(b) => SettingValue::Bool(b),
            Value::Number(n) => n.as_f64().map(SettingValue::Num).unwrap_or(SettingValue::Null),
            Value::String(s) => SettingValue::Str(s),
            Value::Array(items) => SettingValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                SettingValue::Group(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        SettingValue::Bool(b)
    }
}

impl From<f64> for SettingValue {
    fn from(n: f64) -> Self {
        SettingValue::Num(n)
    }
}

impl From<i64> for SettingValue {
    fn from(n: i64) -> Self {
        SettingValue::Num(n as f64)
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::Str(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        SettingValue::Str(s)
    }
}

impl<T: Into<SettingValue>> From<Vec<T>> for SettingValue {
    fn from(items: Vec<T>) -> Self {
        SettingValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Some(json) => write!(f, "{json}"),
            None => f.write_str("undefined"),
        }
    }
}
