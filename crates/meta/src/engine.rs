//! In-memory rule engine.
//!
//! Keeps every rule in an arena addressed by [`RuleId`], groups them into
//! rule sets (one per loaded source) stamped with a load generation, and
//! resolves contexts by applying matching rules in rank order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use oss_core::keys::{self, KEY_AFTER, KEY_DECLARE, KEY_ZONES};
use oss_core::merger::merge_values;
use oss_core::{
    AssignmentRecord, Context, InspectorInfo, ItemInfo, Merger, OssError, PredecessorMap,
    PropertyDescriptor, PropertyKind, PropertyMap, Result, Rule, RuleAdded, RuleEngine, RuleId,
    RuleSetInfo, RuleSetVersion, RuleSource, Selector, Value, EDITOR_RULE_PRIORITY,
};

use crate::parser::parse_rules;

struct StoredRule {
    rule: Rule,
    /// Bumped every time the rule's content is replaced.
    version: u32,
    extras: Vec<RuleId>,
}

struct RuleSetState {
    source: RuleSource,
    version: RuleSetVersion,
    rules: Vec<RuleId>,
    content_hash: Option<String>,
}

pub struct Meta {
    rules: Vec<StoredRule>,
    rule_sets: IndexMap<String, RuleSetState>,
    descriptors: IndexMap<String, PropertyDescriptor>,
    editing: Option<String>,
    next_generation: u64,
    next_rank: i32,
    cache: RefCell<HashMap<String, InspectorInfo>>,
}

impl Default for Meta {
    fn default() -> Self {
        Self::new()
    }
}

impl Meta {
    /// An engine with the standard property descriptors registered.
    pub fn new() -> Self {
        let mut meta = Self {
            rules: Vec::new(),
            rule_sets: IndexMap::new(),
            descriptors: IndexMap::new(),
            editing: None,
            next_generation: 1,
            next_rank: 0,
            cache: RefCell::new(HashMap::new()),
        };
        for descriptor in [
            PropertyDescriptor::new(keys::KEY_TRAIT, PropertyKind::List)
                .with_merger(Merger::ListUnion),
            PropertyDescriptor::new(keys::KEY_VISIBLE, PropertyKind::Boolean)
                .with_merger(Merger::And),
            PropertyDescriptor::new(keys::KEY_EDITABLE, PropertyKind::Boolean)
                .with_merger(Merger::And),
            PropertyDescriptor::new(keys::KEY_LABEL, PropertyKind::String),
            PropertyDescriptor::new(KEY_AFTER, PropertyKind::String).with_scopes(&[
                keys::KEY_FIELD,
                keys::KEY_ACTION,
                keys::KEY_LAYOUT,
            ]),
            PropertyDescriptor::new(KEY_ZONES, PropertyKind::List).with_scopes(&[
                keys::KEY_CLASS,
                keys::KEY_LAYOUT,
                keys::KEY_MODULE,
            ]),
        ] {
            meta.register_property(descriptor);
        }
        meta
    }

    pub fn register_property(&mut self, descriptor: PropertyDescriptor) {
        self.descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Load (or reload) a file-backed rule set.
    pub fn load_rule_file(&mut self, source: RuleSource) -> Result<RuleSetVersion> {
        let path = source
            .path
            .clone()
            .ok_or_else(|| OssError::NotFileBacked(source.name.clone()))?;
        let text = fs::read_to_string(&path)?;
        self.load_rule_text(source, &text)
    }

    /// Load (or reload) a rule set from text. Previously loaded rules of the
    /// same source are retired and the set gets a new generation.
    pub fn load_rule_text(&mut self, source: RuleSource, text: &str) -> Result<RuleSetVersion> {
        let parsed = parse_rules(text).map_err(|e| OssError::Parse {
            source_name: source.name.clone(),
            line: e.line,
            message: e.message,
        })?;

        let name = source.name.clone();
        self.retire_rule_set(&name);

        let version = RuleSetVersion {
            generation: self.next_generation,
        };
        self.next_generation += 1;
        self.rule_sets.insert(
            name.clone(),
            RuleSetState {
                source,
                version,
                rules: Vec::new(),
                content_hash: Some(content_hash(text)),
            },
        );

        let count = parsed.len();
        let mut editor_rank = EDITOR_RULE_PRIORITY;
        for p in parsed {
            let rank = if p.generated {
                editor_rank += 1;
                editor_rank - 1
            } else {
                self.next_rank += 1;
                self.next_rank - 1
            };
            self.register(&name, Rule::new(p.selectors, p.properties, rank));
        }
        self.cache.get_mut().clear();

        info!(rule_set = %name, rules = count, generation = version.generation, "loaded rule set");
        Ok(version)
    }

    /// Reload a file-backed rule set only when its content changed since the
    /// last load. Returns the new version if a reload happened.
    pub fn reload_if_changed(&mut self, name: &str) -> Result<Option<RuleSetVersion>> {
        let state = self
            .rule_sets
            .get(name)
            .ok_or_else(|| OssError::UnknownRuleSet(name.to_string()))?;
        let path = state
            .source
            .path
            .clone()
            .ok_or_else(|| OssError::NotFileBacked(name.to_string()))?;
        let text = fs::read_to_string(&path)?;
        if state.content_hash.as_deref() == Some(content_hash(&text).as_str()) {
            debug!(rule_set = %name, "rule file unchanged, skipping reload");
            return Ok(None);
        }
        let source = state.source.clone();
        self.load_rule_text(source, &text).map(Some)
    }

    /// Drop a rule set entirely (its file was deleted).
    pub fn unload_rule_set(&mut self, name: &str) -> bool {
        self.retire_rule_set(name);
        let removed = self.rule_sets.shift_remove(name).is_some();
        if removed {
            self.cache.get_mut().clear();
            info!(rule_set = %name, "unloaded rule set");
        }
        removed
    }

    pub fn source_for_path(&self, path: &Path) -> Option<RuleSource> {
        self.rule_sets
            .values()
            .find(|s| s.source.path.as_deref() == Some(path))
            .map(|s| s.source.clone())
    }

    /// Replacement count of a rule; changes whenever its content is replaced.
    pub fn rule_version(&self, id: RuleId) -> Option<u32> {
        self.rules.get(id.0 as usize).map(|s| s.version)
    }

    /// Ids of all enabled rules, in rank order.
    pub fn active_rules(&self) -> Vec<RuleId> {
        let mut ids: Vec<RuleId> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.rule.disabled)
            .map(|(i, _)| RuleId(i as u32))
            .collect();
        ids.sort_by_key(|id| (self.rules[id.0 as usize].rule.rank, *id));
        ids
    }

    fn stored(&self, id: RuleId) -> Option<&StoredRule> {
        self.rules.get(id.0 as usize)
    }

    fn stored_mut(&mut self, id: RuleId) -> Option<&mut StoredRule> {
        self.rules.get_mut(id.0 as usize)
    }

    fn retire_rule_set(&mut self, name: &str) {
        let ids = match self.rule_sets.get(name) {
            Some(state) => state.rules.clone(),
            None => return,
        };
        for id in ids {
            self.retire(id);
        }
    }

    /// Disable a rule together with its extras.
    fn retire(&mut self, id: RuleId) {
        let extras = match self.stored_mut(id) {
            Some(stored) => {
                stored.rule.disabled = true;
                std::mem::take(&mut stored.extras)
            }
            None => return,
        };
        for extra in extras {
            if let Some(stored) = self.stored_mut(extra) {
                stored.rule.disabled = true;
            }
        }
    }

    fn register(&mut self, rule_set: &str, rule: Rule) -> RuleAdded {
        let mut rule = with_property_scope(rule);
        rule.rule_set = Some(rule_set.to_string());
        rule.disabled = false;

        let id = RuleId(self.rules.len() as u32);
        self.rules.push(StoredRule {
            rule,
            version: 0,
            extras: Vec::new(),
        });
        let extras = self.derive_extras(id);
        if let Some(stored) = self.stored_mut(id) {
            stored.extras = extras.clone();
        }
        if let Some(state) = self.rule_sets.get_mut(rule_set) {
            state.rules.push(id);
        }
        RuleAdded { id, extras }
    }

    /// A rule naming a concrete item (`class=Foo field=bar`) declares that item
    /// under its parent selectors: `class=Foo declare=field { field: bar }`.
    fn derive_extras(&mut self, id: RuleId) -> Vec<RuleId> {
        let Some(stored) = self.stored(id) else {
            return Vec::new();
        };
        let rule = &stored.rule;
        let Some(scope) = rule.scope_selector().cloned() else {
            return Vec::new();
        };
        let mut selectors: Vec<Selector> = rule
            .selectors
            .iter()
            .take_while(|s| !(s.key == scope.key && s.value == scope.value))
            .filter(|s| !s.is_property_scope())
            .cloned()
            .collect();
        selectors.push(Selector::new(KEY_DECLARE, scope.key.as_str()));

        let mut properties = PropertyMap::new();
        properties.insert(scope.key.clone(), scope.value.clone());

        let mut declaration = Rule::new(selectors, properties, rule.rank);
        declaration.rule_set = rule.rule_set.clone();

        let extra = RuleId(self.rules.len() as u32);
        self.rules.push(StoredRule {
            rule: declaration,
            version: 0,
            extras: Vec::new(),
        });
        vec![extra]
    }

    fn resolve(&self, context: &Context) -> InspectorInfo {
        let values = context.match_values();
        let mut properties = PropertyMap::new();
        let mut assignments = Vec::new();

        for id in self.active_rules() {
            let rule = &self.rules[id.0 as usize].rule;
            if !rule.selectors.iter().all(|s| s.matches(&values)) {
                continue;
            }
            for (key, value) in &rule.properties {
                let merged = match properties.get(key) {
                    Some(old) => merge_values(self.merger_for_property(key), old, value),
                    None => value.clone(),
                };
                properties.insert(key.clone(), merged);
                assignments.push(AssignmentRecord {
                    rule: id,
                    rank: rule.rank,
                    property: key.clone(),
                    value: value.clone(),
                });
            }
        }

        for value in properties.values_mut() {
            if value.is_override() {
                *value = value.unwrapped().clone();
            }
        }
        InspectorInfo::new(context.clone(), properties, assignments)
    }
}

impl RuleEngine for Meta {
    fn new_context(&self) -> Context {
        Context::new()
    }

    fn inspect(&self, context: &Context) -> InspectorInfo {
        // Mid-edit state is never cached.
        if self.editing.is_some() {
            return self.resolve(context);
        }
        let key = context.fingerprint();
        if let Some(hit) = self.cache.borrow().get(&key) {
            return hit.clone();
        }
        let info = self.resolve(context);
        self.cache.borrow_mut().insert(key, info.clone());
        info
    }

    fn property_for_key(&self, key: &str) -> Option<PropertyDescriptor> {
        self.descriptors.get(key).cloned()
    }

    fn property_descriptors(&self) -> Vec<PropertyDescriptor> {
        self.descriptors.values().cloned().collect()
    }

    fn item_names(&self, context: &Context, key: &str) -> Vec<String> {
        let mut values = context.values();
        values.insert(KEY_DECLARE.to_string(), Value::from(key));

        let mut names: Vec<String> = Vec::new();
        for id in self.active_rules() {
            let rule = &self.rules[id.0 as usize].rule;
            if rule.selector(KEY_DECLARE).and_then(Value::as_str) != Some(key) {
                continue;
            }
            if !rule.selectors.iter().all(|s| s.matches(&values)) {
                continue;
            }
            if let Some(name) = rule.properties.get(key).and_then(Value::as_str) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    fn zones(&self, context: &Context, default_zone: &str) -> Vec<String> {
        let zones: Vec<String> = self
            .inspect(context)
            .properties
            .get(KEY_ZONES)
            .map(Value::to_list)
            .unwrap_or_default()
            .iter()
            .filter_map(|z| z.as_str().map(str::to_string))
            .collect();
        if zones.is_empty() {
            vec![default_zone.to_string()]
        } else {
            zones
        }
    }

    fn predecessor_map(&self, context: &Context, key: &str, default_zone: &str) -> PredecessorMap {
        let zones = self.zones(context, default_zone);
        let lead = zones.first().cloned().unwrap_or_else(|| default_zone.to_string());

        let mut map = PredecessorMap::new();
        for zone in &zones {
            map.entry(zone.clone()).or_default();
        }
        for name in self.item_names(context, key) {
            let item_context = context.clone().with(key, name.as_str());
            let predecessor = self
                .inspect(&item_context)
                .properties
                .get(KEY_AFTER)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| lead.clone());
            map.entry(predecessor.clone()).or_default().push(ItemInfo { name, predecessor });
        }
        map
    }

    fn loaded_rule_sets(&self) -> Vec<RuleSetInfo> {
        self.rule_sets
            .values()
            .map(|s| RuleSetInfo {
                source: s.source.clone(),
                version: s.version,
            })
            .collect()
    }

    fn rule_set_version(&self, name: &str) -> Option<RuleSetVersion> {
        self.rule_sets.get(name).map(|s| s.version)
    }

    fn rules_in_set(&self, name: &str) -> Vec<RuleId> {
        self.rule_sets
            .get(name)
            .map(|s| s.rules.clone())
            .unwrap_or_default()
    }

    fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.stored(id).map(|s| &s.rule)
    }

    fn extras_of(&self, id: RuleId) -> Vec<RuleId> {
        self.stored(id).map(|s| s.extras.clone()).unwrap_or_default()
    }

    fn resume_editing_rule_set(&mut self, name: &str) -> Result<()> {
        if !self.rule_sets.contains_key(name) {
            return Err(OssError::UnknownRuleSet(name.to_string()));
        }
        self.editing = Some(name.to_string());
        Ok(())
    }

    fn end_rule_set(&mut self) {
        if self.editing.take().is_some() {
            self.cache.get_mut().clear();
        }
    }

    fn add_rule_returning_extras(&mut self, rule: Rule) -> Result<RuleAdded> {
        let name = self.editing.clone().ok_or(OssError::NotEditing)?;
        let added = self.register(&name, rule);
        debug!(rule_set = %name, rule = %added.id, extras = added.extras.len(), "added rule");
        Ok(added)
    }

    fn update_edited_rule(
        &mut self,
        id: RuleId,
        rule: Rule,
        old_extras: &[RuleId],
    ) -> Result<Vec<RuleId>> {
        if self.editing.is_none() {
            return Err(OssError::NotEditing);
        }
        let stored = self.stored_mut(id).ok_or(OssError::UnknownRule(id))?;
        let mut retired = std::mem::take(&mut stored.extras);
        retired.extend_from_slice(old_extras);

        let rule_set = stored.rule.rule_set.clone();
        let mut rule = with_property_scope(rule);
        rule.rule_set = rule_set;
        rule.disabled = false;
        stored.rule = rule;
        stored.version += 1;

        for extra in retired {
            if let Some(s) = self.stored_mut(extra) {
                s.rule.disabled = true;
            }
        }
        let extras = self.derive_extras(id);
        if let Some(stored) = self.stored_mut(id) {
            stored.extras = extras.clone();
        }
        Ok(extras)
    }

    fn disable_rule(&mut self, id: RuleId) {
        if let Some(stored) = self.stored_mut(id) {
            stored.rule.disabled = true;
        }
        self.cache.get_mut().clear();
    }

    fn enable_rule(&mut self, id: RuleId) {
        if let Some(stored) = self.stored_mut(id) {
            stored.rule.disabled = false;
        }
        self.cache.get_mut().clear();
    }

    fn invalidate_rules(&mut self) {
        self.cache.get_mut().clear();
        debug!("rule caches invalidated");
    }

    fn reload_rule_file(&mut self, name: &str) -> Result<RuleSetVersion> {
        let source = self
            .rule_sets
            .get(name)
            .map(|s| s.source.clone())
            .ok_or_else(|| OssError::UnknownRuleSet(name.to_string()))?;
        self.load_rule_file(source)
    }
}

/// Rules whose last selector is a scope key only contribute properties to
/// that scope: `class=Foo field=bar` gets `field_p`.
fn with_property_scope(mut rule: Rule) -> Rule {
    if rule.selectors.iter().any(Selector::is_property_scope) {
        return rule;
    }
    let scope = rule
        .selectors
        .last()
        .filter(|s| keys::is_scope_key(&s.key))
        .map(|s| keys::property_scope_key(&s.key));
    if let Some(key) = scope {
        rule.selectors.push(Selector::new(key, true));
    }
    rule
}

fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
