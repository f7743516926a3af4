//! Well-known selector and property keys.

use std::cmp::Ordering;

pub const KEY_MODULE: &str = "module";
pub const KEY_CLASS: &str = "class";
pub const KEY_FIELD: &str = "field";
pub const KEY_LAYOUT: &str = "layout";
pub const KEY_OPERATION: &str = "operation";
pub const KEY_ACTION: &str = "action";
pub const KEY_DECLARE: &str = "declare";

pub const KEY_AFTER: &str = "after";
pub const KEY_ZONES: &str = "zones";
pub const KEY_TRAIT: &str = "trait";
pub const KEY_VISIBLE: &str = "visible";
pub const KEY_EDITABLE: &str = "editable";
pub const KEY_LABEL: &str = "label";

/// Selector value matching any present value.
pub const KEY_ANY: &str = "*";

pub const DEFAULT_ZONE: &str = "zMain";

/// Keys that name the kind of item a context is currently configuring.
pub const SCOPE_KEYS: &[&str] = &[KEY_MODULE, KEY_CLASS, KEY_FIELD, KEY_LAYOUT, KEY_ACTION];

/// Canonical selector order for editor-synthesized rules.
pub const EDITOR_KEY_ORDER: &[&str] = &[
    KEY_MODULE,
    KEY_CLASS,
    KEY_OPERATION,
    KEY_LAYOUT,
    KEY_FIELD,
    KEY_ACTION,
];

const PROPERTY_SCOPE_SUFFIX: &str = "_p";

pub fn is_scope_key(key: &str) -> bool {
    SCOPE_KEYS.contains(&key)
}

/// `field` -> `field_p`.
pub fn property_scope_key(scope_key: &str) -> String {
    format!("{scope_key}{PROPERTY_SCOPE_SUFFIX}")
}

pub fn is_property_scope_key(key: &str) -> bool {
    key.strip_suffix(PROPERTY_SCOPE_SUFFIX)
        .is_some_and(is_scope_key)
}

/// Orders selector keys for a synthesized rule: the scope key last, editor
/// keys first in canonical order, anything else alphabetically in between.
pub fn compare_selector_keys(a: &str, b: &str, scope_key: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    if a == scope_key {
        return Ordering::Greater;
    }
    if b == scope_key {
        return Ordering::Less;
    }
    let ia = EDITOR_KEY_ORDER.iter().position(|k| *k == a);
    let ib = EDITOR_KEY_ORDER.iter().position(|k| *k == b);
    match (ia, ib) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_scope_keys_are_derived_from_scope_keys() {
        assert_eq!(property_scope_key(KEY_FIELD), "field_p");
        assert!(is_property_scope_key("field_p"));
        assert!(is_property_scope_key("class_p"));
        assert!(!is_property_scope_key("operation_p"));
        assert!(!is_property_scope_key("field"));
    }

    #[test]
    fn scope_key_sorts_last_and_unknown_keys_in_between() {
        let mut keys = vec!["zeta", KEY_FIELD, "alpha", KEY_LAYOUT, KEY_CLASS];
        keys.sort_by(|a, b| compare_selector_keys(a, b, KEY_FIELD));
        assert_eq!(keys, vec![KEY_CLASS, KEY_LAYOUT, "alpha", "zeta", KEY_FIELD]);
    }
}
