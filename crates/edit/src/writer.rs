//! OSS rule text writer.
//!
//! Renders editor rules back into rule-file syntax and splices the result
//! into the generated block of a rule file, leaving the user-authored part
//! above the marker untouched.

use std::fs;
use std::io;
use std::path::Path;

use oss_core::keys;
use oss_core::merger::merge_values;
use oss_core::{Merger, PropertyMap, Rule, RuleEngine, Selector, Value, GENERATED_RULES_MARKER};

const INDENT: &str = "    ";

/// Trailing newlines before the generated-rules marker: the end of the last
/// user line plus three blank lines.
const MARKER_PADDING: usize = 4;

/// Render a string, quoting it unless it reads back as the same token.
///
/// Key paths (`com.acme.Foo`), override identifiers (`bold!`) and text that
/// already starts with an expression, collection or quote sigil stay bare.
pub fn escape_string(s: &str) -> String {
    if s.trim().is_empty() {
        return "\"\"".to_string();
    }
    if s.starts_with(['$', '{', '[', '"', '\'']) || is_key_path(s) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn is_key_path(s: &str) -> bool {
    let body = s.strip_suffix('!').unwrap_or(s);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        // Keep a decimal point so the value reads back as a float.
        Value::Float(x) if x.is_finite() && x.fract() == 0.0 => format!("{x:.1}"),
        Value::Float(x) => x.to_string(),
        Value::String(s) => escape_string(s),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", escape_string(k), render_value(v)))
                .collect();
            format!("{{{}}}", entries.join("; "))
        }
        Value::Override(inner) => format!("{}!", render_value(inner)),
        Value::FieldPath(path) => format!("${path}"),
    }
}

fn render_selector(selector: &Selector) -> String {
    if selector.value.is_any() {
        selector.key.clone()
    } else {
        format!("{}={}", selector.key, render_value(&selector.value))
    }
}

#[derive(Debug, Default)]
struct RuleNode {
    children: Vec<(Selector, RuleNode)>,
    properties: PropertyMap,
}

impl RuleNode {
    fn child(&mut self, selector: &Selector) -> &mut RuleNode {
        let idx = match self.children.iter().position(|(s, _)| s == selector) {
            Some(idx) => idx,
            None => {
                self.children.push((selector.clone(), RuleNode::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[idx].1
    }
}

/// Prefix tree of rules keyed by their selectors.
#[derive(Debug, Default)]
pub struct RuleTree {
    root: RuleNode,
}

impl RuleTree {
    /// Group `rules` by selector path. Property-scope selectors (`field_p`)
    /// do not open a node; rules landing on the same node have their
    /// properties combined with `merger_for`.
    pub fn build<F>(rules: &[Rule], merger_for: F) -> Self
    where
        F: Fn(&str) -> Option<Merger>,
    {
        let mut tree = RuleTree::default();
        for rule in rules.iter().filter(|r| !r.properties.is_empty()) {
            let mut node = &mut tree.root;
            for selector in &rule.selectors {
                if keys::is_property_scope_key(&selector.key) {
                    continue;
                }
                node = node.child(selector);
            }
            for (key, value) in &rule.properties {
                let merged = match node.properties.get(key) {
                    Some(old) => merge_values(merger_for(key), old, value),
                    None => value.clone(),
                };
                node.properties.insert(key.clone(), merged);
            }
        }
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty() && self.root.properties.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        write_node(&self.root, &mut out, 0);
        out
    }
}

/// Serialize rules with the engine's merge policies.
pub fn render_rules(rules: &[Rule], engine: &dyn RuleEngine) -> String {
    RuleTree::build(rules, |key| engine.merger_for_property(key)).render()
}

fn write_node(node: &RuleNode, out: &mut String, level: usize) {
    for (selector, child) in &node.children {
        push_indent(out, level);
        out.push_str(&render_selector(selector));

        // Structural nodes with a single child share one selector line.
        let mut child = child;
        while child.properties.is_empty() && child.children.len() == 1 {
            let (next_selector, next) = &child.children[0];
            out.push(' ');
            out.push_str(&render_selector(next_selector));
            child = next;
        }

        out.push_str(" {\n");
        write_node(child, out, level + 1);
        push_indent(out, level);
        out.push_str("}\n");
    }
    for (key, value) in &node.properties {
        push_indent(out, level);
        out.push_str(&escape_string(key));
        out.push_str(": ");
        out.push_str(&render_value(value));
        out.push_str(";\n");
    }
}

fn push_indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

/// Replace the generated block of `existing` with `generated`.
///
/// Text before the marker is kept as-is, padded to [`MARKER_PADDING`]
/// trailing newlines when it holds any rules. Without a marker the whole
/// text counts as user rules.
pub fn splice(existing: &str, generated: &str) -> String {
    let user = match existing.find(GENERATED_RULES_MARKER) {
        Some(idx) => &existing[..idx],
        None => existing,
    };

    let mut out =
        String::with_capacity(user.len() + GENERATED_RULES_MARKER.len() + generated.len() + 8);
    out.push_str(user);
    if !user.trim().is_empty() {
        let trailing = user.len() - user.trim_end_matches('\n').len();
        for _ in trailing..MARKER_PADDING {
            out.push('\n');
        }
    }
    out.push_str(GENERATED_RULES_MARKER);
    out.push('\n');
    out.push_str(generated);
    out
}

/// Splice `generated` into the rule file at `path`.
///
/// Writes to a `.tmp` sibling first, then renames over the original, so a
/// crash never leaves a half-written rule file.
pub fn splice_into_file(path: &Path, generated: &str) -> io::Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let text = splice(&existing, generated);

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("rules");
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, text)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oss_core::EDITOR_RULE_PRIORITY;

    fn rule(selectors: &[(&str, Value)], props: &[(&str, Value)]) -> Rule {
        Rule::new(
            selectors.iter().map(|(k, v)| Selector::new(*k, v.clone())).collect(),
            props.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            EDITOR_RULE_PRIORITY,
        )
    }

    #[test]
    fn quoting_law() {
        assert_eq!(escape_string(""), "\"\"");
        assert_eq!(escape_string("   "), "\"\"");
        assert_eq!(escape_string("com.acme.Address"), "com.acme.Address");
        assert_eq!(escape_string("_private"), "_private");
        assert_eq!(escape_string("bold!"), "bold!");
        assert_eq!(escape_string("${object.name}"), "${object.name}");
        assert_eq!(escape_string("[a, b]"), "[a, b]");
        assert_eq!(escape_string("'quoted'"), "'quoted'");
        assert_eq!(escape_string("First Name"), "\"First Name\"");
        assert_eq!(escape_string("42"), "\"42\"");
        assert_eq!(escape_string("a.b!c"), "\"a.b!c\"");
        assert_eq!(escape_string("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn values_render_by_kind() {
        assert_eq!(render_value(&Value::Null), "null");
        assert_eq!(render_value(&Value::Bool(false)), "false");
        assert_eq!(render_value(&Value::Int(-3)), "-3");
        assert_eq!(render_value(&Value::Float(2.0)), "2.0");
        assert_eq!(render_value(&Value::Float(2.5)), "2.5");
        assert_eq!(render_value(&Value::list(["a", "b c"])), "[a, \"b c\"]");
        assert_eq!(render_value(&Value::overriding(Value::list([1, 3]))), "[1, 3]!");
        assert_eq!(render_value(&Value::FieldPath("object.name".into())), "$object.name");

        let mut map = PropertyMap::new();
        map.insert("wrap".into(), Value::Bool(true));
        map.insert("label".into(), Value::from("Full Name"));
        assert_eq!(render_value(&Value::Map(map)), "{wrap:true; label:\"Full Name\"}");
    }

    #[test]
    fn single_rule_flattens_onto_one_line() {
        let rules = vec![rule(
            &[("class", "Foo".into()), ("field", "bar".into()), ("field_p", true.into())],
            &[("visible", false.into())],
        )];
        let text = RuleTree::build(&rules, |_| None).render();
        assert_eq!(text, "class=Foo field=bar {\n    visible: false;\n}\n");
    }

    #[test]
    fn shared_prefixes_nest_and_bare_keys_print_without_value() {
        let rules = vec![
            rule(&[("class", "Foo".into()), ("field", "a".into())], &[("after", "zMain".into())]),
            rule(&[("class", "Foo".into()), ("field", "b".into())], &[("after", "a".into())]),
            rule(&[("class", "Foo".into()), ("field", true.into())], &[("trait", "bold".into())]),
        ];
        let text = RuleTree::build(&rules, |_| None).render();
        let expected = "\
class=Foo {
    field=a {
        after: zMain;
    }
    field=b {
        after: a;
    }
    field {
        trait: bold;
    }
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn rules_on_the_same_path_merge_properties() {
        let rules = vec![
            rule(
                &[("class", "Foo".into()), ("field", "a".into())],
                &[("trait", Value::list(["bold"]))],
            ),
            rule(
                &[("class", "Foo".into()), ("field", "a".into()), ("field_p", true.into())],
                &[("trait", Value::list(["required"])), ("label", "A".into())],
            ),
        ];
        let tree = RuleTree::build(&rules, |key| (key == "trait").then_some(Merger::ListUnion));
        assert_eq!(
            tree.render(),
            "class=Foo field=a {\n    trait: [bold, required];\n    label: A;\n}\n"
        );
    }

    #[test]
    fn merged_override_is_written_with_its_marker() {
        let rules = vec![
            rule(
                &[("class", "Foo".into()), ("field", "a".into())],
                &[("columns", Value::overriding(Value::list([1, 3])))],
            ),
            rule(
                &[("class", "Foo".into()), ("field", "a".into())],
                &[("columns", Value::list([4]))],
            ),
        ];
        let tree = RuleTree::build(&rules, |key| (key == "columns").then_some(Merger::ListUnion));
        assert_eq!(tree.render(), "class=Foo field=a {\n    columns: [1, 3, 4]!;\n}\n");
    }

    #[test]
    fn rules_without_properties_are_not_written() {
        let rules = vec![rule(&[("class", "Foo".into())], &[])];
        assert!(RuleTree::build(&rules, |_| None).is_empty());
    }

    #[test]
    fn splice_preserves_user_rules_and_pads_marker() {
        let user = "class=Foo { label: Foo; }\n";
        let text = splice(user, "class=Foo field=x {\n    visible: false;\n}\n");
        assert!(text.starts_with("class=Foo { label: Foo; }\n\n\n\n/*"));
        assert!(text.contains(&format!("\n\n\n\n{GENERATED_RULES_MARKER}\nclass=Foo field=x")));

        // A second splice replaces the generated block and leaves the rest alone.
        let bar = "class=Bar {\n    label: Bar;\n}\n";
        let again = splice(&text, bar);
        assert_eq!(again, format!("{user}\n\n\n{GENERATED_RULES_MARKER}\n{bar}"));
    }

    #[test]
    fn splice_into_marker_only_file() {
        let generated = "class=Foo {\n    label: Foo;\n}\n";
        let text = splice(&format!("{GENERATED_RULES_MARKER}\n"), generated);
        assert_eq!(text, format!("{GENERATED_RULES_MARKER}\nclass=Foo {{\n    label: Foo;\n}}\n"));
    }

    #[test]
    fn splice_into_file_writes_atomically() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.oss");
        fs::write(&path, "// header\n").unwrap();

        splice_into_file(&path, "class=Foo {\n    label: Foo;\n}\n").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("// header\n\n\n\n/*"));
        assert!(!dir.path().join(".app.oss.tmp").exists());
    }
}
