//! Derived contexts behind the property editor panel.

use serde::Serialize;

use oss_core::keys;
use oss_core::{
    ordered_items, Context, InspectorInfo, PropertyDescriptor, RuleEngine, RuleId, Value,
};

/// A property row of the editor panel.
#[derive(Debug, Clone, Serialize)]
pub struct EditableProperty {
    pub descriptor: PropertyDescriptor,
    /// Value currently in effect, if any rule assigns one.
    pub value: Option<Value>,
    pub assigned_by: Option<RuleId>,
}

/// Contexts derived from the item being edited. Rebuilt on every render.
#[derive(Debug, Clone, Serialize)]
pub struct EditorProperties {
    original: Context,
    /// The item's own context with its property scope set, which is where
    /// rules about the item's properties match.
    property_context: Context,
    /// Same context minus the item, for enumerating its siblings.
    parent: Option<Context>,
    scope_key: Option<String>,
}

impl EditorProperties {
    pub fn new(info: &InspectorInfo) -> Self {
        let original = info.context.clone();
        let scope_key = original.scope_key().map(str::to_string);
        let property_context = match &scope_key {
            Some(scope) => original.clone().with(keys::property_scope_key(scope), true),
            None => original.clone(),
        };
        let parent = original.parent();
        Self {
            original,
            property_context,
            parent,
            scope_key,
        }
    }

    pub fn original(&self) -> &Context {
        &self.original
    }

    pub fn property_context(&self) -> &Context {
        &self.property_context
    }

    pub fn parent(&self) -> Option<&Context> {
        self.parent.as_ref()
    }

    pub fn scope_key(&self) -> Option<&str> {
        self.scope_key.as_deref()
    }

    /// Properties that apply to the item's scope, with their current values.
    pub fn editable_properties(&self, engine: &dyn RuleEngine) -> Vec<EditableProperty> {
        let info = engine.inspect(&self.property_context);
        engine
            .property_descriptors()
            .into_iter()
            .filter(|d| self.scope_key().map_or(true, |scope| d.applies_to(scope)))
            .map(|descriptor| {
                let value = info.property(&descriptor.name).cloned();
                let assigned_by = info.record_for(&descriptor.name).map(|r| r.rule);
                EditableProperty {
                    descriptor,
                    value,
                    assigned_by,
                }
            })
            .collect()
    }

    /// Items sharing the parent context, in display order.
    pub fn sibling_items(&self, engine: &dyn RuleEngine, default_zone: &str) -> Vec<String> {
        let (Some(parent), Some(scope)) = (&self.parent, self.scope_key()) else {
            return Vec::new();
        };
        let map = engine.predecessor_map(parent, scope, default_zone);
        let zones = engine.zones(parent, default_zone);
        ordered_items(&map, &zones)
    }
}
