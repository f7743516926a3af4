//! Property and selector values.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered property map of a rule or of a resolved context.
pub type PropertyMap = IndexMap<String, Value>;

/// A rule value.
///
/// `Override` wraps a value that replaces whatever a broader rule contributed
/// instead of merging with it. `FieldPath` is a `$path` reference evaluated
/// against the bound object at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Override(Box<Value>),
    FieldPath(String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn overriding(value: Value) -> Self {
        match value {
            Value::Override(_) => value,
            other => Value::Override(Box::new(other)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Override(inner) => inner.as_str(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Override(inner) => inner.as_bool(),
            _ => None,
        }
    }

    /// Strips any override markers.
    pub fn unwrapped(&self) -> &Value {
        match self {
            Value::Override(inner) => inner.unwrapped(),
            other => other,
        }
    }

    pub fn is_override(&self) -> bool {
        matches!(self, Value::Override(_))
    }

    /// List view of a value: lists as-is, null as empty, scalars as singletons.
    pub fn to_list(&self) -> Vec<Value> {
        match self.unwrapped() {
            Value::Null => Vec::new(),
            Value::List(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Truthiness used by selector matching and boolean mergers.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "false",
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::FieldPath(_) => true,
            Value::Override(inner) => inner.is_truthy(),
        }
    }

    /// `*` or `true`: the selector only requires the key to be present.
    pub fn is_any(&self) -> bool {
        match self {
            Value::Bool(true) => true,
            Value::String(s) => s == crate::keys::KEY_ANY,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Debug-oriented plain text, used for cache keys and log fields.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("}")
            }
            Value::Override(inner) => write!(f, "{inner}!"),
            Value::FieldPath(path) => write!(f, "${path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_list_treats_scalars_as_singletons() {
        assert_eq!(Value::from("a").to_list(), vec![Value::from("a")]);
        assert!(Value::Null.to_list().is_empty());
        let wrapped = Value::overriding(Value::list([1, 2]));
        assert_eq!(wrapped.to_list(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn overriding_does_not_double_wrap() {
        let once = Value::overriding(Value::from(true));
        let twice = Value::overriding(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn any_marker_and_true_are_presence_checks() {
        assert!(Value::Bool(true).is_any());
        assert!(Value::from("*").is_any());
        assert!(!Value::from("Foo").is_any());
    }
}
