//! Property merge policies.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// How two assignments of the same property combine when both rules apply.
///
/// Properties without a merger are last-wins. An `Override` value always
/// replaces, whatever the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Merger {
    /// Ordered union of both lists.
    ListUnion,
    /// Logical AND of both values.
    And,
    /// Logical OR of both values.
    Or,
}

impl Merger {
    pub fn merge(&self, orig: &Value, new: &Value) -> Value {
        if new.is_override() {
            return new.clone();
        }
        let merged = match self {
            Merger::ListUnion => {
                let mut out = orig.to_list();
                for item in new.to_list() {
                    if !out.contains(&item) {
                        out.push(item);
                    }
                }
                Value::List(out)
            }
            Merger::And => Value::Bool(orig.is_truthy() && new.is_truthy()),
            Merger::Or => Value::Bool(orig.is_truthy() || new.is_truthy()),
        };
        // Merging more in keeps an earlier override in force.
        if orig.is_override() {
            Value::overriding(merged)
        } else {
            merged
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Merger::ListUnion => "list_union",
            Merger::And => "and",
            Merger::Or => "or",
        }
    }
}

/// Combine `new` into `orig` with an optional merger; no merger means `new` wins.
pub fn merge_values(merger: Option<Merger>, orig: &Value, new: &Value) -> Value {
    match merger {
        Some(m) => m.merge(orig, new),
        None => new.clone(),
    }
}
