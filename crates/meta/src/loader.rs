//! Rule files on disk.
//!
//! Every `.oss` file under the rules directory becomes a file-backed rule
//! set. A `notify` watcher only queues paths; reloading waits for an
//! explicit `apply_pending`, which bumps generations so open edit sets
//! notice they are stale.

mod core;
mod error;
mod watcher;

#[cfg(test)]
mod tests;

pub use self::core::RuleLoader;
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
