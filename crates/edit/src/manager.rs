//! Session-level coordination of edit sets.
//!
//! The [`EditManager`] owns one [`EditSet`] per editable rule file, routes
//! edits on a context to the file that owns it, and implements the edits
//! that touch several rules at once (list patches, drag and drop).

use tracing::{debug, info, warn};

use oss_core::config::EditorConfig;
use oss_core::keys::{KEY_AFTER, KEY_CLASS};
use oss_core::{InspectorInfo, PredecessorMap, PropertyMap, Result, RuleEngine, RuleId, Value};

use crate::edit_set::EditSet;
use crate::selection::Selection;
use crate::session::Session;

pub struct EditManager {
    enabled: bool,
    default_zone: String,
    edit_sets: Vec<EditSet>,
    selection: Option<Selection>,
}

impl EditManager {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            enabled: config.enabled,
            default_zone: config.default_zone.clone(),
            edit_sets: Vec::new(),
            selection: None,
        }
    }

    /// The session's edit manager, created on first use.
    pub fn current(session: &mut Session) -> &mut EditManager {
        session
            .edit_manager
            .get_or_insert_with(|| EditManager::new(&session.editor))
    }

    /// The session's edit manager, only if one exists and editing is turned on.
    pub fn active(session: &mut Session) -> Option<&mut EditManager> {
        session.edit_manager.as_mut().filter(|m| m.enabled)
    }

    /// Drop the session's edit manager. Unsaved edits stay in the engine
    /// until the next reload of their files.
    pub fn clear(session: &mut Session) -> Option<EditManager> {
        let manager = session.edit_manager.take();
        if manager.as_ref().is_some_and(EditManager::has_changes) {
            warn!(session = %session.id(), "clearing edit manager with unsaved changes");
        }
        manager
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn default_zone(&self) -> &str {
        &self.default_zone
    }

    /// One edit set per loaded file-backed rule set. Built-in rule sets are
    /// never editable.
    pub fn editable_rule_sets(&mut self, engine: &dyn RuleEngine) -> &mut [EditSet] {
        let loaded: Vec<_> = engine
            .loaded_rule_sets()
            .into_iter()
            .map(|info| info.source)
            .filter(|source| source.is_file_backed())
            .collect();

        self.edit_sets.retain(|set| {
            let keep = loaded.iter().any(|s| s.name == set.name());
            if !keep && set.is_dirty() {
                warn!(rule_set = %set.name(), "rule set unloaded, discarding unsaved edits");
            }
            keep
        });
        for source in loaded {
            if !self.edit_sets.iter().any(|s| s.name() == source.name) {
                debug!(
                    rule_set = %source.name,
                    package = %source.package,
                    "tracking editable rule set"
                );
                self.edit_sets.push(EditSet::new(source));
            }
        }
        &mut self.edit_sets
    }

    fn edit_set_index(&mut self, engine: &dyn RuleEngine, info: &InspectorInfo) -> Option<usize> {
        let class = info.context.value(KEY_CLASS)?.as_str()?;
        let package = package_of(class);
        self.editable_rule_sets(engine)
            .iter()
            .position(|set| set.package() == package)
    }

    /// The edit set of the file whose package matches the context's class.
    pub fn edit_set_for_context(
        &mut self,
        engine: &dyn RuleEngine,
        info: &InspectorInfo,
    ) -> Option<&mut EditSet> {
        let idx = self.edit_set_index(engine, info)?;
        self.edit_sets.get_mut(idx)
    }

    pub fn has_changes(&self) -> bool {
        self.edit_sets.iter().any(EditSet::is_dirty)
    }

    /// Save every dirty edit set; returns how many files were written.
    pub fn save_changes(&mut self, engine: &mut dyn RuleEngine) -> Result<usize> {
        let mut saved = 0;
        for set in &mut self.edit_sets {
            if set.save(engine)? {
                saved += 1;
            }
        }
        if saved > 0 {
            info!(files = saved, "saved rule edits");
        }
        Ok(saved)
    }

    /// Patch adding `value` to, or removing it from, the list property `key`.
    ///
    /// `effective` is the value in effect for the context; `local` is what
    /// the editable rule itself assigns. Adding goes through the property's
    /// merger when it has one (the rule then only needs its own items), else
    /// the full effective list is copied. Removing a locally assigned item
    /// edits the local list, collapsing it to a scalar or nothing; removing
    /// an inherited item needs the whole remaining list as an override.
    pub fn updated_list_property(
        engine: &dyn RuleEngine,
        key: &str,
        value: &Value,
        effective: &Value,
        local: Option<&Value>,
        add: bool,
    ) -> PropertyMap {
        let local_override = local.is_some_and(Value::is_override);
        let updated = if add {
            match engine.merger_for_property(key) {
                // The merger keeps a local override marker.
                Some(merger) => {
                    merger.merge(local.unwrap_or(&Value::Null), &Value::List(vec![value.clone()]))
                }
                None => {
                    let mut list = effective.to_list();
                    if !list.contains(value) {
                        list.push(value.clone());
                    }
                    Value::List(list)
                }
            }
        } else {
            let local_list = local.map(Value::to_list).unwrap_or_default();
            if local_list.contains(value) {
                let mut remaining: Vec<Value> =
                    local_list.into_iter().filter(|v| v != value).collect();
                let collapsed = match remaining.len() {
                    0 => Value::Null,
                    1 => remaining.remove(0),
                    _ => Value::List(remaining),
                };
                if local_override && !collapsed.is_null() {
                    Value::overriding(collapsed)
                } else {
                    collapsed
                }
            } else {
                let remaining: Vec<Value> =
                    effective.to_list().into_iter().filter(|v| v != value).collect();
                Value::overriding(Value::List(remaining))
            }
        };

        let mut patch = PropertyMap::new();
        patch.insert(key.to_string(), updated);
        patch
    }

    /// Set `key` on the editable rule for `info`'s item.
    ///
    /// Returns `None` when no editable file owns the context.
    pub fn update_property(
        &mut self,
        engine: &mut dyn RuleEngine,
        info: &InspectorInfo,
        key: &str,
        value: Value,
    ) -> Result<Option<RuleId>> {
        let Some(idx) = self.edit_set_index(engine, info) else {
            return Ok(None);
        };
        let set = &mut self.edit_sets[idx];
        let id = set.editable_rule_for_context(engine, info)?;
        set.update_rule(engine, id, &single(key, value))?;
        Ok(Some(id))
    }

    /// Add `value` to, or remove it from, the list property `key` of `info`'s item.
    pub fn update_list_property(
        &mut self,
        engine: &mut dyn RuleEngine,
        info: &InspectorInfo,
        key: &str,
        value: Value,
        add: bool,
    ) -> Result<Option<RuleId>> {
        let Some(idx) = self.edit_set_index(engine, info) else {
            return Ok(None);
        };
        let effective = engine
            .inspect(&info.context)
            .property(key)
            .cloned()
            .unwrap_or_default();

        let set = &mut self.edit_sets[idx];
        let id = set.editable_rule_for_context(engine, info)?;
        let local = engine.rule(id).and_then(|r| r.properties.get(key)).cloned();
        let patch =
            Self::updated_list_property(engine, key, &value, &effective, local.as_ref(), add);
        set.update_rule(engine, id, &patch)?;
        Ok(Some(id))
    }

    /// Delete the editable rule for `info`'s item, if there is one.
    pub fn delete_rule_for_context(
        &mut self,
        engine: &mut dyn RuleEngine,
        info: &InspectorInfo,
    ) -> bool {
        let Some(idx) = self.edit_set_index(engine, info) else {
            return false;
        };
        let set = &mut self.edit_sets[idx];
        match set.existing_editable_rule_matching_context(engine, info) {
            Some(id) => set.delete_rule(engine, id),
            None => false,
        }
    }

    /// Move `dragged` right after `target`, one of its siblings or a zone.
    ///
    /// The followers of the dragged item close the gap it leaves, the
    /// followers of the target move behind the dragged item, and the dragged
    /// item gets `after: target`. Every `after` change is planned from a
    /// single predecessor map before any rule is touched. Returns `false`
    /// when nothing had to change.
    pub fn handle_drop(
        &mut self,
        engine: &mut dyn RuleEngine,
        dragged: &InspectorInfo,
        target: &str,
    ) -> Result<bool> {
        let item = dragged.scope_value().and_then(Value::as_str);
        let (Some(scope), Some(item)) = (dragged.scope_key(), item) else {
            return Ok(false);
        };
        if item == target {
            return Ok(false);
        }
        let Some(idx) = self.edit_set_index(engine, dragged) else {
            return Ok(false);
        };

        let parent = dragged.context_before(scope);
        let map = engine.predecessor_map(&parent, scope, &self.default_zone);
        let old_predecessor = match predecessor_of(&map, item) {
            Some(pred) => pred,
            None => engine
                .zones(&parent, &self.default_zone)
                .into_iter()
                .next()
                .unwrap_or_else(|| self.default_zone.clone()),
        };
        if old_predecessor == target {
            debug!(item, target, "item already follows drop target");
            return Ok(false);
        }

        let plan = plan_drop(&map, item, &old_predecessor, target);
        let set = &mut self.edit_sets[idx];
        for (name, after) in &plan {
            let id = set.rule_for_context_alternate(engine, dragged, name)?;
            set.update_rule(engine, id, &single(KEY_AFTER, after.as_str()))?;
        }

        if let Some(selection) = self.selection.as_mut() {
            if selection.matches(&dragged.context) {
                selection.refresh(&engine.inspect(&dragged.context));
            }
        }
        info!(item, from = %old_predecessor, after = target, rules = plan.len(), "applied drop");
        Ok(true)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn set_selected_record(&mut self, info: &InspectorInfo, property: Option<&str>) {
        self.selection = Some(Selection::new(info, property));
    }

    /// Select the item containing `info`'s item.
    pub fn set_selected_parent_record(
        &mut self,
        engine: &dyn RuleEngine,
        info: &InspectorInfo,
        property: Option<&str>,
    ) -> bool {
        let Some(parent) = info.context.parent() else {
            return false;
        };
        let parent_info = engine.inspect(&parent);
        self.set_selected_record(&parent_info, property);
        true
    }

    /// Whether `info` resolves the selected position; refreshes the selection if so.
    pub fn is_current_field_selected(&mut self, info: &InspectorInfo) -> bool {
        self.selection.as_mut().is_some_and(|s| s.refresh(info))
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Editing state for status displays.
    pub fn summary(&self) -> serde_json::Value {
        let sets: Vec<serde_json::Value> = self
            .edit_sets
            .iter()
            .map(|set| {
                serde_json::json!({
                    "rule_set": set.name(),
                    "package": set.package(),
                    "dirty": set.is_dirty(),
                })
            })
            .collect();
        serde_json::json!({
            "enabled": self.enabled,
            "default_zone": self.default_zone,
            "has_changes": self.has_changes(),
            "rule_sets": sets,
            "selection": self.selection,
        })
    }
}

/// `com.acme.Address` -> `com.acme`.
fn package_of(class: &str) -> &str {
    class.rsplit_once('.').map(|(package, _)| package).unwrap_or("")
}

fn single(key: &str, value: impl Into<Value>) -> PropertyMap {
    let mut patch = PropertyMap::new();
    patch.insert(key.to_string(), value.into());
    patch
}

fn predecessor_of(map: &PredecessorMap, item: &str) -> Option<String> {
    map.values()
        .flatten()
        .find(|i| i.name == item)
        .map(|i| i.predecessor.clone())
}

fn followers(map: &PredecessorMap, predecessor: &str, skip: &str) -> Vec<String> {
    map.get(predecessor)
        .into_iter()
        .flatten()
        .filter(|i| i.name != skip)
        .map(|i| i.name.clone())
        .collect()
}

/// `(item, new predecessor)` pairs moving `dragged` behind `target`.
fn plan_drop(
    map: &PredecessorMap,
    dragged: &str,
    old_predecessor: &str,
    target: &str,
) -> Vec<(String, String)> {
    let mut plan = Vec::new();
    for name in followers(map, dragged, dragged) {
        plan.push((name, old_predecessor.to_string()));
    }
    for name in followers(map, target, dragged) {
        plan.push((name, dragged.to_string()));
    }
    plan.push((dragged.to_string(), target.to_string()));
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use oss_core::{Context, ItemInfo, Merger, PropertyDescriptor, PropertyKind, RuleSource};
    use oss_meta::Meta;

    fn chain(links: &[(&str, &str)]) -> PredecessorMap {
        let mut map = PredecessorMap::new();
        for (name, pred) in links {
            map.entry(pred.to_string()).or_default().push(ItemInfo {
                name: name.to_string(),
                predecessor: pred.to_string(),
            });
        }
        map
    }

    fn list(items: &[i64]) -> Value {
        Value::list(items.iter().copied())
    }

    fn pairs(steps: &[(&str, &str)]) -> Vec<(String, String)> {
        steps.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    /// The patched value of `key` from [`EditManager::updated_list_property`].
    fn patched(
        meta: &Meta,
        key: &str,
        value: &Value,
        effective: &Value,
        local: Option<&Value>,
        add: bool,
    ) -> Value {
        EditManager::updated_list_property(meta, key, value, effective, local, add)[key].clone()
    }

    #[test]
    fn package_comes_from_class_prefix() {
        assert_eq!(package_of("com.acme.Address"), "com.acme");
        assert_eq!(package_of("Address"), "");
    }

    #[test]
    fn drop_plan_closes_gap_and_inserts_after_target() {
        let map = chain(&[("a", "zMain"), ("b", "a"), ("c", "b")]);

        let plan = plan_drop(&map, "c", "b", "a");
        assert_eq!(plan, pairs(&[("b", "c"), ("c", "a")]));

        let plan = plan_drop(&map, "a", "zMain", "c");
        assert_eq!(plan, pairs(&[("b", "zMain"), ("a", "c")]));
    }

    #[test]
    fn removing_inherited_item_needs_override() {
        let meta = Meta::new();
        let patch = patched(&meta, "columns", &Value::Int(2), &list(&[1, 2, 3]), None, false);
        assert_eq!(patch, Value::overriding(list(&[1, 3])));
    }

    #[test]
    fn removing_local_item_collapses() {
        let meta = Meta::new();
        let local = list(&[1, 2]);
        let patch = patched(&meta, "columns", &Value::Int(2), &local, Some(&local), false);
        assert_eq!(patch, Value::Int(1));

        let one = Value::Int(1);
        let patch = patched(&meta, "columns", &one, &one, Some(&one), false);
        assert_eq!(patch, Value::Null);
    }

    #[test]
    fn add_then_remove_restores_list_without_merger() {
        let meta = Meta::new();
        let effective = list(&[1, 2]);

        let after_add = patched(&meta, "columns", &Value::Int(3), &effective, None, true);
        assert_eq!(after_add, list(&[1, 2, 3]));

        let three = Value::Int(3);
        let removed = patched(&meta, "columns", &three, &after_add, Some(&after_add), false);
        assert_eq!(removed, effective);
    }

    #[test]
    fn add_uses_property_merger() {
        let mut meta = Meta::new();
        meta.register_property(
            PropertyDescriptor::new("tags", PropertyKind::List).with_merger(Merger::ListUnion),
        );
        let b = Value::from("b");

        let local = Value::list(["a"]);
        let patch = patched(&meta, "tags", &b, &Value::list(["x", "a"]), Some(&local), true);
        assert_eq!(patch, Value::list(["a", "b"]));

        let hidden = Value::overriding(Value::list(["a"]));
        let patch = patched(&meta, "tags", &b, &hidden, Some(&hidden), true);
        assert_eq!(patch, Value::overriding(Value::list(["a", "b"])));
    }

    #[test]
    fn session_accessors() {
        let mut session = Session::new("s1", EditorConfig::default());
        assert!(EditManager::active(&mut session).is_none());

        EditManager::current(&mut session).set_enabled(true);
        assert!(EditManager::active(&mut session).is_some());

        assert!(EditManager::clear(&mut session).is_some());
        assert!(!session.has_edit_manager());
    }

    #[test]
    fn builtin_rule_sets_are_not_editable() {
        let mut meta = Meta::new();
        meta.load_rule_text(RuleSource::builtin("builtin.oss"), "class=Foo { label: Foo; }")
            .unwrap();
        let mut manager = EditManager::new(&EditorConfig::default());
        assert!(manager.editable_rule_sets(&meta).is_empty());

        let info =
            InspectorInfo::for_context(Context::new().with("class", "Foo").with("field", "a"));
        let updated = manager.update_property(&mut meta, &info, "label", Value::from("A"));
        assert_eq!(updated.unwrap(), None);
        assert!(!manager.handle_drop(&mut meta, &info, "b").unwrap());
    }
}
