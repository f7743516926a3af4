//! Incremental rule editing.
//!
//! This crate provides:
//! - `EditSet`: the editable overlay of one rule file, with save and reload
//! - `EditManager`: per-session routing of edits, list patches, drag and drop
//! - `writer`: OSS text rendering and generated-block splicing
//! - `Selection` / `EditorProperties`: editor panel state derived from contexts

pub mod edit_set;
pub mod editor_properties;
pub mod manager;
pub mod selection;
pub mod session;
pub mod writer;

pub use edit_set::EditSet;
pub use editor_properties::{EditableProperty, EditorProperties};
pub use manager::EditManager;
pub use selection::Selection;
pub use session::Session;
pub use writer::RuleTree;
