//! Per-file overlay of editor rules.
//!
//! An [`EditSet`] tracks the editable rules of one file-backed rule set:
//! the rules of the file's generated block plus rules added at runtime.
//! Edits go straight into the engine so they show up immediately; `save`
//! writes them back into the file and reloads it.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use oss_core::keys::{self, KEY_CLASS, KEY_FIELD, KEY_LAYOUT, KEY_MODULE, KEY_OPERATION};
use oss_core::{
    EditingGuard, InspectorInfo, OssError, PropertyMap, Result, Rule, RuleEngine, RuleId,
    RuleSetVersion, RuleSource, Selector, EDITOR_RULE_PRIORITY,
};

use crate::writer;

pub struct EditSet {
    source: RuleSource,
    /// Generation of the rule set the tracked rules belong to.
    version: Option<RuleSetVersion>,
    /// `None` until first pulled from the engine after a (re)load.
    editable: Option<Vec<RuleId>>,
    extras: HashMap<RuleId, Vec<RuleId>>,
    dirty: bool,
}

impl EditSet {
    pub fn new(source: RuleSource) -> Self {
        Self {
            source,
            version: None,
            editable: None,
            extras: HashMap::new(),
            dirty: false,
        }
    }

    pub fn source(&self) -> &RuleSource {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn package(&self) -> &str {
        &self.source.package
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the tracked rules predate the engine's current load of the file.
    pub fn is_stale(&self, engine: &dyn RuleEngine) -> bool {
        self.version.is_some() && engine.rule_set_version(&self.source.name) != self.version
    }

    /// Sync with the engine's current generation of the rule set.
    ///
    /// After an external reload every tracked rule and extra is disabled and
    /// the editable list is pulled again on next use. Unsaved edits are lost.
    pub fn current_rule_set(&mut self, engine: &mut dyn RuleEngine) -> Option<RuleSetVersion> {
        let current = engine.rule_set_version(&self.source.name);
        if current == self.version {
            return current;
        }

        if let Some(stale) = self.editable.take() {
            for id in stale {
                engine.disable_rule(id);
            }
            for extra in self.extras.values().flatten() {
                engine.disable_rule(*extra);
            }
            if self.dirty {
                warn!(
                    rule_set = %self.source.name,
                    "rule set reloaded externally, discarding unsaved edits"
                );
            }
            debug!(rule_set = %self.source.name, ?current, "rebuilding editable rules");
        }
        self.extras.clear();
        self.dirty = false;
        self.version = current;
        current
    }

    /// Editable rules of the file, in the order they were added.
    pub fn editable_rules(&mut self, engine: &mut dyn RuleEngine) -> Vec<RuleId> {
        self.current_rule_set(engine);
        if let Some(ids) = &self.editable {
            return ids.clone();
        }

        let ids: Vec<RuleId> = engine
            .rules_in_set(&self.source.name)
            .into_iter()
            .filter(|id| engine.rule(*id).is_some_and(|r| !r.disabled && r.is_editable()))
            .collect();
        for id in &ids {
            self.extras.insert(*id, engine.extras_of(*id));
        }
        self.editable = Some(ids.clone());
        ids
    }

    /// Ordered selectors of a rule targeting exactly `info`'s item.
    ///
    /// Without an explicit key set, a module uses only `module`, a field
    /// `class` and `field`, anything else `class`, `layout`, `field` and
    /// `operation`. The scope key is always included.
    pub fn selectors_for_context(info: &InspectorInfo, only: Option<&[&str]>) -> Vec<Selector> {
        let scope = info.scope_key().unwrap_or_default();
        let defaults: &[&str] = match scope {
            KEY_MODULE => &[KEY_MODULE],
            KEY_FIELD => &[KEY_CLASS, KEY_FIELD],
            _ => &[KEY_CLASS, KEY_LAYOUT, KEY_FIELD, KEY_OPERATION],
        };
        let mut wanted: Vec<&str> = only.unwrap_or(defaults).to_vec();
        if !scope.is_empty() && !wanted.contains(&scope) {
            wanted.push(scope);
        }
        wanted.sort_by(|a, b| keys::compare_selector_keys(a, b, scope));
        wanted.dedup();

        wanted
            .into_iter()
            .filter_map(|key| info.context.value(key).map(|v| Selector::new(key, v.clone())))
            .collect()
    }

    fn next_rank(&self, engine: &dyn RuleEngine) -> i32 {
        let max_rank = engine
            .rules_in_set(&self.source.name)
            .iter()
            .filter_map(|id| engine.rule(*id))
            .filter(|r| !r.disabled)
            .map(|r| r.rank)
            .max();
        match max_rank {
            Some(rank) => (rank + 1).max(EDITOR_RULE_PRIORITY),
            None => EDITOR_RULE_PRIORITY,
        }
    }

    pub fn add_rule(
        &mut self,
        engine: &mut dyn RuleEngine,
        selectors: Vec<Selector>,
        properties: PropertyMap,
    ) -> Result<RuleId> {
        self.editable_rules(engine);
        let rank = self.next_rank(engine);

        let added = {
            let mut guard = EditingGuard::resume(engine, &self.source.name)?;
            guard.add_rule_returning_extras(Rule::new(selectors, properties, rank))?
        };

        self.editable.get_or_insert_with(Vec::new).push(added.id);
        self.extras.insert(added.id, added.extras);
        self.dirty = true;
        info!(rule_set = %self.source.name, rule = %added.id, rank, "added editor rule");
        Ok(added.id)
    }

    /// Whether `rule` targets `info`'s item: same scope value, every other
    /// selector agreeing with the context, and the context's class named.
    ///
    /// Selectors are checked only against keys the context assigns, so a
    /// rule for a same-named item elsewhere can match a context that carries
    /// no class.
    pub fn rule_matches_context(rule: &Rule, info: &InspectorInfo) -> bool {
        let Some(scope) = info.scope_key() else {
            return false;
        };
        if rule.selector(scope) != info.scope_value() {
            return false;
        }

        let values = info.values();
        let selectors_agree = rule
            .selectors
            .iter()
            .filter(|s| s.key != scope && !s.is_property_scope())
            .all(|s| values.get(&s.key) == Some(&s.value));
        if !selectors_agree {
            return false;
        }

        match values.get(KEY_CLASS) {
            Some(class) => rule.selector(KEY_CLASS) == Some(class),
            None => true,
        }
    }

    /// Most recently added editable rule targeting `info`'s item.
    pub fn existing_editable_rule_matching_context(
        &mut self,
        engine: &mut dyn RuleEngine,
        info: &InspectorInfo,
    ) -> Option<RuleId> {
        self.editable_rules(engine).into_iter().rev().find(|id| {
            engine
                .rule(*id)
                .is_some_and(|rule| Self::rule_matches_context(rule, info))
        })
    }

    /// Find-or-create the editable rule for `info`'s item.
    pub fn editable_rule_for_context(
        &mut self,
        engine: &mut dyn RuleEngine,
        info: &InspectorInfo,
    ) -> Result<RuleId> {
        if let Some(id) = self.existing_editable_rule_matching_context(engine, info) {
            return Ok(id);
        }
        let selectors = Self::selectors_for_context(info, None);
        self.add_rule(engine, selectors, PropertyMap::new())
    }

    /// Find-or-create the editable rule for a sibling of `info`'s item.
    pub fn rule_for_context_alternate(
        &mut self,
        engine: &mut dyn RuleEngine,
        info: &InspectorInfo,
        alternate: &str,
    ) -> Result<RuleId> {
        let sibling = info.with_scope_value(alternate);
        self.editable_rule_for_context(engine, &sibling)
    }

    fn ensure_tracked(&mut self, engine: &mut dyn RuleEngine, id: RuleId) -> Result<()> {
        if self.editable_rules(engine).contains(&id) {
            Ok(())
        } else {
            Err(OssError::StaleRule(id))
        }
    }

    /// Replace the rule's content and re-derive its extras.
    fn replace_rule(&mut self, engine: &mut dyn RuleEngine, id: RuleId, rule: Rule) -> Result<()> {
        let old_extras = self.extras.remove(&id).unwrap_or_default();
        let extras = {
            let mut guard = EditingGuard::resume(engine, &self.source.name)?;
            guard.update_edited_rule(id, rule, &old_extras)?
        };
        self.extras.insert(id, extras);
        self.dirty = true;
        Ok(())
    }

    /// Merge `patch` into the rule's properties; `Null` entries remove keys.
    pub fn update_rule(
        &mut self,
        engine: &mut dyn RuleEngine,
        id: RuleId,
        patch: &PropertyMap,
    ) -> Result<()> {
        self.ensure_tracked(engine, id)?;
        let mut rule = engine.rule(id).cloned().ok_or(OssError::UnknownRule(id))?;
        rule.apply_patch(patch);
        self.replace_rule(engine, id, rule)?;
        debug!(rule_set = %self.source.name, rule = %id, keys = patch.len(), "updated editor rule");
        Ok(())
    }

    /// Re-target a rule at `info`'s item.
    ///
    /// Changing selectors affects matching for other contexts too, so all
    /// resolution caches are dropped.
    pub fn update_rule_selectors(
        &mut self,
        engine: &mut dyn RuleEngine,
        info: &InspectorInfo,
        id: RuleId,
        only: Option<&[&str]>,
    ) -> Result<()> {
        self.ensure_tracked(engine, id)?;
        let mut rule = engine.rule(id).cloned().ok_or(OssError::UnknownRule(id))?;
        rule.selectors = Self::selectors_for_context(info, only);
        self.replace_rule(engine, id, rule)?;
        engine.invalidate_rules();
        Ok(())
    }

    pub fn delete_rule(&mut self, engine: &mut dyn RuleEngine, id: RuleId) -> bool {
        self.editable_rules(engine);
        let Some(editable) = self.editable.as_mut() else {
            return false;
        };
        let Some(pos) = editable.iter().position(|r| *r == id) else {
            return false;
        };
        editable.remove(pos);

        engine.disable_rule(id);
        for extra in self.extras.remove(&id).unwrap_or_default() {
            engine.disable_rule(extra);
        }
        engine.invalidate_rules();
        self.dirty = true;
        info!(rule_set = %self.source.name, rule = %id, "deleted editor rule");
        true
    }

    /// Text of the generated block for the current editable rules.
    pub fn render(&mut self, engine: &mut dyn RuleEngine) -> String {
        let rules: Vec<Rule> = self
            .editable_rules(engine)
            .into_iter()
            .filter_map(|id| engine.rule(id).cloned())
            .collect();
        writer::render_rules(&rules, engine)
    }

    /// Write the editable rules into the file's generated block and reload it.
    ///
    /// Returns `false` when there was nothing to save. When the write or the
    /// reload fails the set stays dirty and its rules stay active.
    pub fn save(&mut self, engine: &mut dyn RuleEngine) -> Result<bool> {
        self.current_rule_set(engine);
        if !self.dirty {
            return Ok(false);
        }
        let path = self
            .source
            .path
            .clone()
            .ok_or_else(|| OssError::NotFileBacked(self.source.name.clone()))?;

        let text = self.render(engine);
        writer::splice_into_file(&path, &text).map_err(|source| OssError::Save {
            path: path.clone(),
            source,
        })?;

        // The file now holds these rules; retire the in-memory copies before
        // the reload registers them again.
        let retired: Vec<RuleId> = self
            .editable
            .iter()
            .flatten()
            .chain(self.extras.values().flatten())
            .copied()
            .collect();
        for &id in &retired {
            engine.disable_rule(id);
        }

        let version = match engine.reload_rule_file(&self.source.name) {
            Ok(version) => version,
            Err(e) => {
                // The set's generation is unchanged, so the retired rules are
                // still its edits; bring them back for the next attempt.
                for &id in &retired {
                    engine.enable_rule(id);
                }
                warn!(
                    rule_set = %self.source.name,
                    error = %e,
                    "reload after save failed, edits kept"
                );
                return Err(e);
            }
        };
        self.editable = None;
        self.extras.clear();
        self.version = Some(version);
        self.dirty = false;
        info!(
            rule_set = %self.source.name,
            path = %path.display(),
            generation = version.generation,
            "saved editor rules"
        );
        Ok(true)
    }
}
