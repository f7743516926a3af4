//! Editor selection, kept as a re-resolvable position.

use serde::Serialize;

use oss_core::{AssignmentRecord, Context, InspectorInfo};

/// The selected item (and optionally one of its properties).
///
/// Rules are replaced on every edit, so the selection remembers the context
/// that identifies the item rather than the rule that was selected. The
/// record is refreshed whenever the same context is resolved again.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    trace: Context,
    property: Option<String>,
    record: Option<AssignmentRecord>,
}

impl Selection {
    pub fn new(info: &InspectorInfo, property: Option<&str>) -> Self {
        Self {
            trace: info.context.clone(),
            property: property.map(str::to_string),
            record: property.and_then(|p| info.record_for(p).cloned()),
        }
    }

    pub fn trace(&self) -> &Context {
        &self.trace
    }

    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// Assignment of the selected property as of the last refresh.
    pub fn record(&self) -> Option<&AssignmentRecord> {
        self.record.as_ref()
    }

    pub fn matches(&self, context: &Context) -> bool {
        self.trace == *context
    }

    /// Refresh from `info` if it resolves the selected position.
    pub fn refresh(&mut self, info: &InspectorInfo) -> bool {
        if !self.matches(&info.context) {
            return false;
        }
        self.record = self
            .property
            .as_deref()
            .and_then(|p| info.record_for(p).cloned());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oss_core::{PropertyMap, RuleId, Value};

    fn info(rule: u32) -> InspectorInfo {
        InspectorInfo::new(
            Context::new().with("class", "Foo").with("field", "bar"),
            PropertyMap::new(),
            vec![AssignmentRecord {
                rule: RuleId(rule),
                rank: 1,
                property: "label".into(),
                value: Value::from("Bar"),
            }],
        )
    }

    #[test]
    fn refresh_follows_replaced_rules() {
        let mut selection = Selection::new(&info(3), Some("label"));
        assert_eq!(selection.record().map(|r| r.rule), Some(RuleId(3)));

        assert!(selection.refresh(&info(9)));
        assert_eq!(selection.record().map(|r| r.rule), Some(RuleId(9)));
    }

    #[test]
    fn other_positions_do_not_refresh() {
        let mut selection = Selection::new(&info(3), Some("label"));
        let other =
            InspectorInfo::for_context(Context::new().with("class", "Foo").with("field", "baz"));
        assert!(!selection.refresh(&other));
        assert_eq!(selection.record().map(|r| r.rule), Some(RuleId(3)));
    }
}
