//! Per-session editing state.

use oss_core::config::EditorConfig;

use crate::manager::EditManager;

/// State of one user session. The host creates one per session and hands it
/// to every edit operation; requests of one session must not run concurrently.
#[derive(Default)]
pub struct Session {
    id: String,
    pub(crate) editor: EditorConfig,
    pub(crate) edit_manager: Option<EditManager>,
}

impl Session {
    pub fn new(id: impl Into<String>, editor: EditorConfig) -> Self {
        Self {
            id: id.into(),
            editor,
            edit_manager: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn editor_config(&self) -> &EditorConfig {
        &self.editor
    }

    pub fn has_edit_manager(&self) -> bool {
        self.edit_manager.is_some()
    }
}
