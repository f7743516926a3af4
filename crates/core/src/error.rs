use std::path::PathBuf;

use thiserror::Error;

use crate::rule::RuleId;

#[derive(Error, Debug)]
pub enum OssError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {source_name} at line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Writing the generated rules back to disk failed. Nothing was disabled
    /// or reloaded, so the edit set is still dirty and the save can be retried.
    #[error("Failed to save rules to {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No rule set is being edited")]
    NotEditing,

    #[error("Rule set not loaded: {0}")]
    UnknownRuleSet(String),

    #[error("Rule set is not file-backed: {0}")]
    NotFileBacked(String),

    #[error("Rule {0} was retired by a rule set reload")]
    StaleRule(RuleId),

    #[error("Rule not found: {0}")]
    UnknownRule(RuleId),
}

pub type Result<T> = std::result::Result<T, OssError>;
