//! Durable client-side storage for the widget.
//!
//! A tiny namespaced key-value store backed by files under the user's config
//! directory, holding exactly three entries: the selected model id, the
//! dark-mode flag, and the chat history. Corrupt history is non-fatal and
//! silently recovered as an empty transcript.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::catalog;
use crate::transcript::Transcript;

pub const KEY_SELECTED_MODEL: &str = "selected-model";
pub const KEY_DARK_MODE: &str = "dark-mode";
pub const KEY_CHAT_HISTORY: &str = "chat-history";

const NAMESPACE: &str = "charla";

/// Preferences loaded once at startup and persisted immediately on change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub selected_model: Option<String>,
    pub dark_mode: bool,
}

pub struct WidgetStore {
    root: PathBuf,
}

impl WidgetStore {
    pub fn open() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(Self { root: config_dir.join(NAMESPACE) })
    }

    /// Store rooted at an explicit directory (used by tests).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.entry_path(key)).ok()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.entry_path(key), value)?;
        Ok(())
    }

    /// Removes the entry entirely. Removing a missing entry is fine.
    pub fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load preferences, dropping any stored model id that no longer exists
    /// in the catalog so the selector is shown again.
    pub fn load_preferences(&self) -> Preferences {
        let selected_model = self
            .get(KEY_SELECTED_MODEL)
            .map(|s| s.trim().to_string())
            .filter(|id| catalog::find(id).is_some());
        let dark_mode = self
            .get(KEY_DARK_MODE)
            .map(|v| v.trim() == "true")
            .unwrap_or(false);
        Preferences { selected_model, dark_mode }
    }

    pub fn save_selected_model(&self, id: &str) -> Result<()> {
        self.set(KEY_SELECTED_MODEL, id)
    }

    pub fn save_dark_mode(&self, dark: bool) -> Result<()> {
        self.set(KEY_DARK_MODE, if dark { "true" } else { "false" })
    }

    /// Malformed stored history is treated as empty; persistence corruption
    /// never reaches the user.
    pub fn load_history(&self) -> Transcript {
        self.get(KEY_CHAT_HISTORY)
            .and_then(|json| Transcript::from_json(&json).ok())
            .unwrap_or_default()
    }

    pub fn save_history(&self, transcript: &Transcript) -> Result<()> {
        self.set(KEY_CHAT_HISTORY, &transcript.to_json()?)
    }

    pub fn clear_history(&self) -> Result<()> {
        self.remove(KEY_CHAT_HISTORY)
    }
}
