//! `.aitxt` document files
//!
//! A document file captures the active tab: its text, history log and
//! conversation, plus the editor settings. Loading validates the whole
//! file before anything in the workspace is touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{LexiError, Result};
use crate::history::HistoryRecord;
use crate::settings::{EditorSettings, EditorSettingsPatch};
use crate::state::Message;
use crate::workspace::Tab;

pub const APP_VERSION: &str = "1.0.0";
pub const FILE_EXTENSION: &str = "aitxt";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFile {
    pub version: String,
    pub active_tab_content: String,
    #[serde(default, alias = "aiHistory", deserialize_with = "known_records")]
    pub active_tab_ai_history: Vec<HistoryRecord>,
    #[serde(default)]
    pub active_tab_assistant_messages: Vec<Message>,
    pub editor_settings: EditorSettingsPatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// History entries of kinds this application never writes are skipped.
fn known_records<'de, D>(deserializer: D) -> std::result::Result<Vec<HistoryRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

impl DocumentFile {
    /// Snapshot of `tab` with the current settings.
    pub fn export(tab: &Tab, settings: &EditorSettings) -> Self {
        Self {
            version: APP_VERSION.to_string(),
            active_tab_content: tab.document.content().to_string(),
            active_tab_ai_history: tab.history().records().to_vec(),
            active_tab_assistant_messages: tab.messages().to_vec(),
            editor_settings: settings.into(),
            notes: None,
        }
    }

    /// Parses file contents; a missing required field rejects the file.
    pub fn from_json(contents: &str) -> Result<Self> {
        let file: DocumentFile =
            serde_json::from_str(contents).map_err(|e| LexiError::InvalidDocumentFile(e.to_string()))?;
        if file.version.trim().is_empty() {
            return Err(LexiError::InvalidDocumentFile("missing version".to_string()));
        }
        Ok(file)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file = Self::from_json(&contents)?;
        debug!(path = %path.display(), version = %file.version, "read document file");
        Ok(file)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// `lexi-doc-<title>-<millis>.aitxt`, whitespace runs in the title
/// replaced by `_`.
pub fn suggested_file_name(title: &str, at: DateTime<Utc>) -> String {
    let title = title.split_whitespace().collect::<Vec<_>>().join("_");
    format!("lexi-doc-{}-{}.{}", title, at.timestamp_millis(), FILE_EXTENSION)
}
