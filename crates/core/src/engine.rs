//! The rule engine contract the edit core drives.
//!
//! Matching, resolution and rule-file loading live behind [`RuleEngine`];
//! the edit core only synthesizes, patches, retires and persists rules
//! through it.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::context::{Context, InspectorInfo};
use crate::error::Result;
use crate::merger::Merger;
use crate::rule::{Rule, RuleId};

/// Where a rule set came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSource {
    /// Unique name, the path relative to the rules directory for files.
    pub name: String,
    /// Backing file; `None` for built-in rule sets, which are never editable.
    pub path: Option<PathBuf>,
    /// Dotted package the rules apply to, derived from the file's directory.
    pub package: String,
}

impl RuleSource {
    pub fn file(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        package: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            package: package.into(),
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            package: String::new(),
        }
    }

    pub fn is_file_backed(&self) -> bool {
        self.path.is_some()
    }
}

/// Load generation of a rule set. Every (re)load yields a new, larger value,
/// so an unchanged version means "same rules as when last observed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleSetVersion {
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct RuleSetInfo {
    pub source: RuleSource,
    pub version: RuleSetVersion,
}

/// A newly registered rule plus the derived rules registered with it.
#[derive(Debug, Clone)]
pub struct RuleAdded {
    pub id: RuleId,
    pub extras: Vec<RuleId>,
}

/// An item and the predecessor it is chained `after`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemInfo {
    pub name: String,
    pub predecessor: String,
}

/// predecessor (item or zone) -> items directly following it, in order.
pub type PredecessorMap = IndexMap<String, Vec<ItemInfo>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Boolean,
    String,
    List,
    Map,
    Any,
}

/// Meta-information about an editable property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    /// Scope keys the property is meaningful for; empty means all.
    pub scopes: Vec<String>,
    pub merger: Option<Merger>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            scopes: Vec::new(),
            merger: None,
        }
    }

    pub fn with_merger(mut self, merger: Merger) -> Self {
        self.merger = Some(merger);
        self
    }

    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = scopes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn applies_to(&self, scope_key: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| s == scope_key)
    }
}

pub trait RuleEngine {
    fn new_context(&self) -> Context;

    /// Resolve a context, keeping the trace of contributing assignments.
    fn inspect(&self, context: &Context) -> InspectorInfo;

    fn property_for_key(&self, key: &str) -> Option<PropertyDescriptor>;

    fn property_descriptors(&self) -> Vec<PropertyDescriptor>;

    fn merger_for_property(&self, key: &str) -> Option<Merger> {
        self.property_for_key(key).and_then(|d| d.merger)
    }

    /// Items of kind `key` declared under `context`, in declaration order.
    fn item_names(&self, context: &Context, key: &str) -> Vec<String>;

    /// Zones items of kind `key` are chained from under `context`.
    fn zones(&self, context: &Context, default_zone: &str) -> Vec<String>;

    fn predecessor_map(&self, context: &Context, key: &str, default_zone: &str) -> PredecessorMap;

    fn loaded_rule_sets(&self) -> Vec<RuleSetInfo>;

    fn rule_set_version(&self, name: &str) -> Option<RuleSetVersion>;

    /// Every rule registered for the set in its current generation, disabled ones included.
    fn rules_in_set(&self, name: &str) -> Vec<RuleId>;

    fn rule(&self, id: RuleId) -> Option<&Rule>;

    /// Derived rules currently registered for `id`.
    fn extras_of(&self, id: RuleId) -> Vec<RuleId>;

    fn resume_editing_rule_set(&mut self, name: &str) -> Result<()>;

    fn end_rule_set(&mut self);

    fn add_rule_returning_extras(&mut self, rule: Rule) -> Result<RuleAdded>;

    /// Replace the content of `id`, retiring `old_extras`; returns the new extras.
    fn update_edited_rule(
        &mut self,
        id: RuleId,
        rule: Rule,
        old_extras: &[RuleId],
    ) -> Result<Vec<RuleId>>;

    fn disable_rule(&mut self, id: RuleId);

    /// Undo [`disable_rule`](Self::disable_rule) for a rule that is still
    /// registered in its set's current generation.
    fn enable_rule(&mut self, id: RuleId);

    fn invalidate_rules(&mut self);

    fn reload_rule_file(&mut self, name: &str) -> Result<RuleSetVersion>;
}

/// Holds a rule set open for editing; ends the bracket when dropped, so the
/// engine never stays in editing state after an early return.
pub struct EditingGuard<'a> {
    engine: &'a mut dyn RuleEngine,
}

impl<'a> EditingGuard<'a> {
    pub fn resume(engine: &'a mut dyn RuleEngine, rule_set: &str) -> Result<Self> {
        engine.resume_editing_rule_set(rule_set)?;
        Ok(Self { engine })
    }
}

impl<'a> Deref for EditingGuard<'a> {
    type Target = dyn RuleEngine + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.engine
    }
}

impl<'a> DerefMut for EditingGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.engine
    }
}

impl Drop for EditingGuard<'_> {
    fn drop(&mut self) {
        self.engine.end_rule_set();
    }
}

/// Flatten a predecessor map into display order, walking each zone's chain.
/// Items whose predecessor is unreachable from any zone come last.
pub fn ordered_items(map: &PredecessorMap, zones: &[String]) -> Vec<String> {
    fn visit(map: &PredecessorMap, pred: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        if let Some(followers) = map.get(pred) {
            for item in followers {
                if seen.insert(item.name.clone()) {
                    out.push(item.name.clone());
                    visit(map, &item.name, seen, out);
                }
            }
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for zone in zones {
        visit(map, zone, &mut seen, &mut out);
    }
    for followers in map.values() {
        for item in followers {
            if seen.insert(item.name.clone()) {
                out.push(item.name.clone());
                visit(map, &item.name, &mut seen, &mut out);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, pred: &str) -> ItemInfo {
        ItemInfo {
            name: name.to_string(),
            predecessor: pred.to_string(),
        }
    }

    #[test]
    fn ordered_items_follows_chains_per_zone() {
        let mut map = PredecessorMap::new();
        map.insert("zMain".into(), vec![item("a", "zMain"), item("d", "zMain")]);
        map.insert("a".into(), vec![item("c", "a")]);
        map.insert("c".into(), vec![item("b", "c")]);
        map.insert("zSide".into(), vec![item("e", "zSide")]);

        let order = ordered_items(&map, &["zMain".to_string(), "zSide".to_string()]);
        assert_eq!(order, vec!["a", "c", "b", "d", "e"]);
    }

    #[test]
    fn dangling_items_are_appended() {
        let mut map = PredecessorMap::new();
        map.insert("ghost".into(), vec![item("x", "ghost")]);
        let order = ordered_items(&map, &["zMain".to_string()]);
        assert_eq!(order, vec!["x"]);
    }

    #[test]
    fn descriptor_scopes() {
        let d = PropertyDescriptor::new("after", PropertyKind::String)
            .with_scopes(&["field", "action"]);
        assert!(d.applies_to("field"));
        assert!(!d.applies_to("class"));
        assert!(PropertyDescriptor::new("label", PropertyKind::String).applies_to("class"));
    }
}
