//! Turns `notify` events into queued rule file paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::debug;

/// Queue rule files touched by a filesystem event for reload.
pub(super) fn handle_fs_event(
    event: &Event,
    pending: &Arc<Mutex<HashSet<PathBuf>>>,
    extension: &str,
) {
    let touches_content = match event.kind {
        EventKind::Create(kind) => matches!(kind, CreateKind::File | CreateKind::Any),
        EventKind::Modify(kind) => {
            matches!(kind, ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
        }
        EventKind::Remove(kind) => matches!(kind, RemoveKind::File | RemoveKind::Any),
        _ => false,
    };
    if !touches_content {
        return;
    }

    let mut queue = pending.lock().expect("pending reload lock poisoned");
    for path in event.paths.iter().filter(|p| is_rule_file(p, extension)) {
        debug!(path = %path.display(), kind = ?event.kind, "rule file change queued");
        queue.insert(path.clone());
    }
}

/// Rule files have the configured extension and are not dotfiles
/// (which also excludes our own `.tmp` files).
pub(super) fn is_rule_file(path: &Path, extension: &str) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.'));
    visible && path.extension().and_then(|e| e.to_str()) == Some(extension)
}
