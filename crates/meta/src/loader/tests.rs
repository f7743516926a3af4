//! Tests for the rule loader module.

use std::fs;
use std::sync::{Arc, Mutex};

use notify::event::{DataChange, ModifyKind};
use notify::{Event, EventKind};
use oss_core::{Context, RuleEngine, Value};
use tempfile::TempDir;

use super::watcher::handle_fs_event;
use super::*;
use crate::engine::Meta;

const ADDRESS_RULES: &str = r#"
class=com.acme.Address {
    field=street { label: Street; }
    field=city { after: street; }
}
"#;

fn temp_loader() -> (TempDir, RuleLoader) {
    let dir = TempDir::new().expect("create tempdir");
    let loader = RuleLoader::new(dir.path().to_path_buf(), "oss");
    (dir, loader)
}

#[test]
fn load_all_skips_dotfiles_and_other_extensions() {
    let (_dir, loader) = temp_loader();
    let root = loader.rules_dir().to_path_buf();
    fs::write(root.join("app.oss"), ADDRESS_RULES).unwrap();
    fs::write(root.join(".hidden.oss"), ADDRESS_RULES).unwrap();
    fs::write(root.join("readme.txt"), "not rules").unwrap();

    let mut meta = Meta::new();
    let results = loader.load_all(&mut meta).unwrap();

    let loaded = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
        .count();
    let skipped = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
        .count();
    assert_eq!(loaded, 1);
    assert_eq!(skipped, 2);
    assert!(meta.rule_set_version("app.oss").is_some());
}

#[test]
fn nested_files_get_dotted_packages() {
    let (_dir, loader) = temp_loader();
    let sub = loader.rules_dir().join("com").join("acme");
    fs::create_dir_all(&sub).unwrap();
    fs::write(sub.join("rules.oss"), ADDRESS_RULES).unwrap();

    let mut meta = Meta::new();
    loader.load_all(&mut meta).unwrap();

    let sets = meta.loaded_rule_sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].source.name, "com/acme/rules.oss");
    assert_eq!(sets[0].source.package, "com.acme");
    assert!(sets[0].source.is_file_backed());

    let ctx = Context::new().with("class", "com.acme.Address").with("field", "street");
    assert_eq!(meta.inspect(&ctx).property("label"), Some(&Value::from("Street")));
}

#[test]
fn parse_errors_are_reported_per_file() {
    let (_dir, loader) = temp_loader();
    let root = loader.rules_dir().to_path_buf();
    fs::write(root.join("bad.oss"), "class=Foo { label Foo; }").unwrap();
    fs::write(root.join("good.oss"), ADDRESS_RULES).unwrap();

    let mut meta = Meta::new();
    let results = loader.load_all(&mut meta).unwrap();
    assert!(matches!(results[0].status, LoadStatus::Failed { .. }));
    assert!(matches!(results[1].status, LoadStatus::Loaded { .. }));
}

#[test]
fn apply_pending_reloads_only_changed_content() {
    let (_dir, loader) = temp_loader();
    let path = loader.rules_dir().join("app.oss");
    fs::write(&path, ADDRESS_RULES).unwrap();

    let mut meta = Meta::new();
    loader.load_all(&mut meta).unwrap();
    let first = meta.rule_set_version("app.oss").unwrap();

    loader.mark_changed(&path);
    let results = loader.apply_pending(&mut meta);
    assert!(matches!(results[0].status, LoadStatus::Unchanged { .. }));
    assert_eq!(meta.rule_set_version("app.oss"), Some(first));

    fs::write(&path, "class=com.acme.Address { label: Addr; }").unwrap();
    loader.mark_changed(&path);
    let results = loader.apply_pending(&mut meta);
    assert!(matches!(results[0].status, LoadStatus::Loaded { .. }));
    assert!(meta.rule_set_version("app.oss").unwrap() > first);
}

#[test]
fn apply_pending_unloads_deleted_files() {
    let (_dir, loader) = temp_loader();
    let path = loader.rules_dir().join("app.oss");
    fs::write(&path, ADDRESS_RULES).unwrap();

    let mut meta = Meta::new();
    loader.load_all(&mut meta).unwrap();
    fs::remove_file(&path).unwrap();
    loader.mark_changed(&path);

    let results = loader.apply_pending(&mut meta);
    assert!(matches!(results[0].status, LoadStatus::Removed { .. }));
    assert!(meta.rule_set_version("app.oss").is_none());
}

#[test]
fn watcher_events_queue_rule_files_only() {
    let (_dir, loader) = temp_loader();
    let pending = Arc::new(Mutex::new(std::collections::HashSet::new()));
    let rule_file = loader.rules_dir().join("app.oss");
    let tmp_file = loader.rules_dir().join(".app.oss.tmp");
    let other = loader.rules_dir().join("notes.md");

    let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
        .add_path(rule_file.clone())
        .add_path(tmp_file)
        .add_path(other);
    handle_fs_event(&event, &pending, "oss");

    let queued = pending.lock().unwrap();
    assert_eq!(queued.len(), 1);
    assert!(queued.contains(&rule_file));
}
