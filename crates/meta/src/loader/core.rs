//! Directory-backed rule set discovery and deferred reloads.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use oss_core::config::RulesConfig;
use oss_core::RuleSource;

use crate::engine::Meta;

use super::error::{LoadResult, LoadStatus, Result};
use super::watcher::{handle_fs_event, is_rule_file};

/// Maps a directory tree of rule files onto rule sets in a [`Meta`] engine,
/// one set per file. The rule set name is the path
/// relative to the rules directory; the package is its directory with
/// separators replaced by dots.
pub struct RuleLoader {
    rules_dir: PathBuf,
    /// Without the leading dot.
    extension: String,
    /// Paths changed on disk since the last [`apply_pending`](Self::apply_pending).
    pending: Arc<Mutex<HashSet<PathBuf>>>,
    /// Dropping the watcher stops it.
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    /// A missing rules directory is created.
    pub fn new(rules_dir: PathBuf, extension: impl Into<String>) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        // Watcher events carry absolute, resolved paths.
        let rules_dir = fs::canonicalize(&rules_dir).unwrap_or(rules_dir);
        Self {
            rules_dir,
            extension: extension.into(),
            pending: Arc::new(Mutex::new(HashSet::new())),
            _watcher: None,
        }
    }

    pub fn from_config(config: &RulesConfig) -> Self {
        Self::new(config.rules_dir.clone(), config.extension.clone())
    }

    /// Rule set identity for a file under the rules directory.
    pub fn source_for(&self, path: &Path) -> RuleSource {
        let relative = path.strip_prefix(&self.rules_dir).unwrap_or(path);
        let package = relative.parent().map(|dir| join_parts(dir, ".")).unwrap_or_default();
        RuleSource::file(join_parts(relative, "/"), path, package)
    }

    /// Load every rule file below the rules directory, in path order.
    ///
    /// A file that fails to parse is reported as [`LoadStatus::Failed`] and
    /// the walk carries on.
    pub fn load_all(&self, meta: &mut Meta) -> Result<Vec<LoadResult>> {
        let mut files = Vec::new();
        collect_files(&self.rules_dir, &mut files)?;

        let results = files
            .into_iter()
            .map(|path| {
                let status = match self.skip_reason(&path) {
                    Some(reason) => LoadStatus::Skipped { reason },
                    None => self.load_new(&path, meta),
                };
                LoadResult { path, status }
            })
            .collect();
        Ok(results)
    }

    fn skip_reason(&self, path: &Path) -> Option<String> {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            Some("dotfile".to_string())
        } else if !is_rule_file(path, &self.extension) {
            Some(format!("not a .{} file", self.extension))
        } else {
            None
        }
    }

    fn load_new(&self, path: &Path, meta: &mut Meta) -> LoadStatus {
        let source = self.source_for(path);
        let rule_set = source.name.clone();
        match meta.load_rule_file(source) {
            Ok(version) => LoadStatus::Loaded {
                rule_set,
                generation: version.generation,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "rule file rejected");
                LoadStatus::Failed { error: e.to_string() }
            }
        }
    }

    /// Start a filesystem watcher queuing changed rule files.
    ///
    /// Nothing is reloaded until [`apply_pending`](Self::apply_pending) runs,
    /// so reloads happen between edit requests, never during one.
    pub fn watch(&mut self) -> Result<()> {
        let pending = Arc::clone(&self.pending);
        let extension = self.extension.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => handle_fs_event(&event, &pending, &extension),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            })?;

        watcher.watch(&self.rules_dir, RecursiveMode::Recursive)?;

        let config = notify::Config::default().with_poll_interval(Duration::from_millis(500));
        let _ = watcher.configure(config);

        info!(path = %self.rules_dir.display(), "rule file watcher started");
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Queue a path as changed, as the watcher would.
    pub fn mark_changed(&self, path: impl Into<PathBuf>) {
        self.pending
            .lock()
            .expect("pending reload lock poisoned")
            .insert(path.into());
    }

    /// Reload every queued file whose content actually changed.
    ///
    /// Files written by our own saves hash the same as their last load and
    /// are reported as unchanged.
    pub fn apply_pending(&self, meta: &mut Meta) -> Vec<LoadResult> {
        let mut paths: Vec<PathBuf> = self
            .pending
            .lock()
            .expect("pending reload lock poisoned")
            .drain()
            .collect();
        paths.sort();

        let mut results = Vec::new();
        for path in paths {
            let existing = meta.source_for_path(&path);
            let status = match existing {
                Some(source) if !path.exists() => {
                    meta.unload_rule_set(&source.name);
                    LoadStatus::Removed { rule_set: source.name }
                }
                Some(source) => match meta.reload_if_changed(&source.name) {
                    Ok(Some(version)) => LoadStatus::Loaded {
                        rule_set: source.name,
                        generation: version.generation,
                    },
                    Ok(None) => LoadStatus::Unchanged { rule_set: source.name },
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to reload rule file, keeping previous version"
                        );
                        LoadStatus::Failed { error: e.to_string() }
                    }
                },
                None if path.exists() => self.load_new(&path, meta),
                None => LoadStatus::Skipped {
                    reason: "unknown file removed".to_string(),
                },
            };
            results.push(LoadResult { path, status });
        }
        results
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }
}

/// Every file below `dir`, sorted so load order (and so rank order between
/// files) is stable. Hidden directories are not descended into.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = match fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.map(|e| e.path())).collect::<std::io::Result<Vec<_>>>()?,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "rules directory unreadable");
            return Ok(());
        }
    };
    entries.sort();

    for path in entries {
        if path.is_dir() {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if !hidden {
                collect_files(&path, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn join_parts(path: &Path, sep: &str) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(sep)
}
