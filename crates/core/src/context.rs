//! Resolution contexts and the assignment trace produced by resolving one.

use serde::Serialize;

use crate::keys;
use crate::rule::{RuleId, Selector};
use crate::value::{PropertyMap, Value};

/// Ordered stack of `key = value` assignments describing "where" in the UI
/// properties are being resolved, e.g. `class=Address field=city`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Context {
    assignments: Vec<Selector>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.assignments.push(Selector::new(key, value));
        self
    }

    /// Builder-style `push`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    pub fn pop(&mut self) -> Option<Selector> {
        self.assignments.pop()
    }

    pub fn assignments(&self) -> &[Selector] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Current value of every assigned key; later assignments win.
    pub fn values(&self) -> PropertyMap {
        let mut values = PropertyMap::new();
        for a in &self.assignments {
            values.insert(a.key.clone(), a.value.clone());
        }
        values
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.assignments.iter().rev().find(|a| a.key == key).map(|a| &a.value)
    }

    /// The innermost assigned scope key.
    pub fn scope_key(&self) -> Option<&str> {
        self.assignments
            .iter()
            .rev()
            .find(|a| keys::is_scope_key(&a.key))
            .map(|a| a.key.as_str())
    }

    /// Values used for rule matching: the assignments plus `<scope>_p = true`
    /// so that only rules targeting the current scope contribute properties.
    pub fn match_values(&self) -> PropertyMap {
        let mut values = self.values();
        if let Some(scope) = self.scope_key() {
            values.insert(keys::property_scope_key(scope), Value::Bool(true));
        }
        values
    }

    /// Everything assigned before the first assignment of `key`.
    pub fn before_first(&self, key: &str) -> Context {
        let end = self
            .assignments
            .iter()
            .position(|a| a.key == key)
            .unwrap_or(self.assignments.len());
        Context {
            assignments: self.assignments[..end].to_vec(),
        }
    }

    /// Same assignments without the innermost scope assignment.
    pub fn parent(&self) -> Option<Context> {
        let scope = self.scope_key()?;
        let idx = self.assignments.iter().rposition(|a| a.key == scope)?;
        let mut assignments = self.assignments.clone();
        assignments.remove(idx);
        Some(Context { assignments })
    }

    /// Same assignments with the innermost scope assignment's value replaced.
    pub fn with_scope_value(&self, value: impl Into<Value>) -> Context {
        let mut ctx = self.clone();
        if let Some(scope) = self.scope_key().map(str::to_string) {
            if let Some(a) = ctx.assignments.iter_mut().rev().find(|a| a.key == scope) {
                a.value = value.into();
            }
        }
        ctx
    }

    /// Stable textual key of this context, used for resolution caches.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        for a in &self.assignments {
            out.push_str(&a.key);
            out.push('=');
            out.push_str(&a.value.to_string());
            out.push(';');
        }
        out
    }
}

/// One property assignment considered while resolving a context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentRecord {
    pub rule: RuleId,
    pub rank: i32,
    pub property: String,
    pub value: Value,
}

/// The resolved properties of a context together with the ordered trace of
/// which rule assigned what.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InspectorInfo {
    pub context: Context,
    pub properties: PropertyMap,
    pub assignments: Vec<AssignmentRecord>,
}

impl InspectorInfo {
    pub fn new(
        context: Context,
        properties: PropertyMap,
        assignments: Vec<AssignmentRecord>,
    ) -> Self {
        Self {
            context,
            properties,
            assignments,
        }
    }

    /// A trace-less view of a context, for matching and rule synthesis only.
    pub fn for_context(context: Context) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn scope_key(&self) -> Option<&str> {
        self.context.scope_key()
    }

    pub fn scope_value(&self) -> Option<&Value> {
        self.context.value(self.scope_key()?)
    }

    pub fn values(&self) -> PropertyMap {
        self.context.values()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// The assignment that produced the current value of `property`.
    pub fn record_for(&self, property: &str) -> Option<&AssignmentRecord> {
        self.assignments.iter().rev().find(|r| r.property == property)
    }

    /// Context reproducing everything true up to, not including, `key`.
    pub fn context_before(&self, key: &str) -> Context {
        self.context.before_first(key)
    }

    /// Same context, different item in the innermost scope. The trace is dropped.
    pub fn with_scope_value(&self, value: impl Into<Value>) -> InspectorInfo {
        InspectorInfo::for_context(self.context.with_scope_value(value))
    }
}
