//! Shared data model for OSS rule editing.
//!
//! This crate provides:
//! - The rule value model (`Value`, `Selector`, `Rule`) and well-known keys
//! - Resolution contexts and the assignment trace (`Context`, `InspectorInfo`)
//! - The `RuleEngine` contract the edit core drives, plus its editing bracket
//! - Errors, env-driven configuration and tracing setup

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod keys;
pub mod logging;
pub mod merger;
pub mod rule;
pub mod value;

pub use config::Config;
pub use context::*;
pub use engine::*;
pub use error::*;
pub use merger::Merger;
pub use rule::*;
pub use value::*;
