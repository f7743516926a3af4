//! Loader errors and per-file load outcomes.

use std::path::PathBuf;

/// Failures that abort a scan or a watcher setup. Per-file problems are
/// reported through [`LoadStatus`] instead.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine rejected a rule file.
    #[error("Rule engine error: {0}")]
    Engine(#[from] oss_core::OssError),

    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

/// What happened to one rule file during a scan or a pending-reload pass.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

#[derive(Debug)]
pub enum LoadStatus {
    /// Rule set was (re)loaded.
    Loaded { rule_set: String, generation: u64 },
    /// Content matched the last load; nothing to do.
    Unchanged { rule_set: String },
    /// File is gone; its rule set was unloaded.
    Removed { rule_set: String },
    /// File was skipped (dotfile, other extension, etc.).
    Skipped { reason: String },
    /// Parse or read error occurred.
    Failed { error: String },
}
