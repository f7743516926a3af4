//! Selectors and rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::keys;
use crate::value::{PropertyMap, Value};

/// Rank at and above which rules are editor-managed. Rules in the generated
/// block of a rule file and rules added at runtime all rank here or higher.
pub const EDITOR_RULE_PRIORITY: i32 = 100_000;

/// Separates user-authored rules from the machine-generated block of a rule
/// file. Everything after it is rewritten on every save.
pub const GENERATED_RULES_MARKER: &str =
    "/*!--- Editor Generated Rules -- Content below this line will be overwritten ---*/";

/// Stable handle of a rule inside an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub u32);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single `key = value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub key: String,
    pub value: Value,
}

impl Selector {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_property_scope(&self) -> bool {
        keys::is_property_scope_key(&self.key)
    }

    /// Whether this selector holds for the given context values.
    pub fn matches(&self, values: &PropertyMap) -> bool {
        match values.get(&self.key) {
            None => false,
            Some(actual) if self.value.is_any() => {
                !matches!(actual, Value::Null | Value::Bool(false))
            }
            Some(actual) => self.value == *actual,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_any() {
            f.write_str(&self.key)
        } else {
            write!(f, "{}={}", self.key, self.value)
        }
    }
}

/// Selectors, the properties they assign and a priority rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    pub properties: PropertyMap,
    pub rank: i32,
    /// Name of the rule set (source) the rule belongs to.
    pub rule_set: Option<String>,
    pub disabled: bool,
}

impl Rule {
    pub fn new(selectors: Vec<Selector>, properties: PropertyMap, rank: i32) -> Self {
        Self {
            selectors,
            properties,
            rank,
            rule_set: None,
            disabled: false,
        }
    }

    pub fn selector(&self, key: &str) -> Option<&Value> {
        self.selectors.iter().find(|s| s.key == key).map(|s| &s.value)
    }

    pub fn is_editable(&self) -> bool {
        self.rank >= EDITOR_RULE_PRIORITY
    }

    /// The last selector on a scope key with a concrete value, if any.
    pub fn scope_selector(&self) -> Option<&Selector> {
        self.selectors
            .iter()
            .rev()
            .find(|s| !s.is_property_scope())
            .filter(|s| keys::is_scope_key(&s.key) && !s.value.is_any())
    }

    /// Merge a property patch in place. `Null` entries remove the key.
    pub fn apply_patch(&mut self, patch: &PropertyMap) {
        for (key, value) in patch {
            if value.is_null() {
                self.properties.shift_remove(key);
            } else {
                self.properties.insert(key.clone(), value.clone());
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.selectors.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{s}")?;
        }
        write!(f, " {{ {} properties, rank {} }}", self.properties.len(), self.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_null_removes_key() {
        let mut props = PropertyMap::new();
        props.insert("visible".into(), Value::Bool(false));
        props.insert("label".into(), Value::from("Name"));
        let mut rule = Rule::new(vec![Selector::new("class", "Foo")], props, EDITOR_RULE_PRIORITY);

        let mut patch = PropertyMap::new();
        patch.insert("visible".into(), Value::Null);
        patch.insert("after".into(), Value::from("zTop"));
        rule.apply_patch(&patch);

        assert!(!rule.properties.contains_key("visible"));
        assert_eq!(rule.properties.get("after"), Some(&Value::from("zTop")));
        assert_eq!(rule.properties.len(), 2);
    }

    #[test]
    fn scope_selector_skips_property_scope() {
        let rule = Rule::new(
            vec![
                Selector::new("class", "Foo"),
                Selector::new("field", "bar"),
                Selector::new("field_p", true),
            ],
            PropertyMap::new(),
            0,
        );
        assert_eq!(rule.scope_selector().map(|s| s.key.as_str()), Some("field"));
    }

    #[test]
    fn any_selector_requires_presence() {
        let mut values = PropertyMap::new();
        values.insert("field".into(), Value::from("bar"));
        assert!(Selector::new("field", true).matches(&values));
        assert!(!Selector::new("layout", true).matches(&values));
        assert!(Selector::new("field", "bar").matches(&values));
        assert!(!Selector::new("field", "baz").matches(&values));
    }
}
