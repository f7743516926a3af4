//! In-memory OSS rule engine.
//!
//! This crate provides:
//! - An OSS text parser for nested selector-block rule files
//! - `Meta`, a `RuleEngine` resolving contexts against ranked rules
//! - A filesystem loader with change tracking via a `notify` watcher

pub mod engine;
pub mod loader;
pub mod parser;

pub use engine::Meta;
pub use loader::{LoadResult, LoadStatus, RuleLoader};
