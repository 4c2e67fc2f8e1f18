//! Tabs and the workspace that holds them
//!
//! Each [`Tab`] pairs one document with its own conversation and history
//! log. Exactly one tab is active at a time. The workspace only manages
//! tab data; provider sessions and in-flight replies are coordinated by
//! [`crate::assistant::Assistant`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

use crate::error::{LexiError, Result};
use crate::history::HistoryLog;
use crate::prompts::{new_tab_greeting, CLEARED_GREETING, GET_STARTED_CONTENT, GET_STARTED_GREETING};
use crate::settings::{EditorSettings, EditorSettingsPatch};
use crate::state::{Message, MessageId};
use crate::stream::InFlight;

pub const UNTITLED: &str = "Untitled";
pub const GET_STARTED_TITLE: &str = "Get Started";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque document text. Nothing here parses or validates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    content: String,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    id: TabId,
    pub title: String,
    pub document: Document,
    messages: Vec<Message>,
    #[serde(default)]
    history: HistoryLog,
    #[serde(skip)]
    pub(crate) in_flight: Option<InFlight>,
}

impl Tab {
    pub fn new(title: &str, content: &str) -> Self {
        let title = if title.trim().is_empty() { UNTITLED } else { title.trim() };
        Self {
            id: TabId::new(),
            title: title.to_string(),
            document: Document::new(content),
            messages: vec![Message::assistant("ai-greeting", new_tab_greeting(title))],
            history: HistoryLog::new(),
            in_flight: None,
        }
    }

    fn get_started() -> Self {
        Self {
            id: TabId::new(),
            title: GET_STARTED_TITLE.to_string(),
            document: Document::new(GET_STARTED_CONTENT),
            messages: vec![Message::assistant("ai-welcome", GET_STARTED_GREETING)],
            history: HistoryLog::new(),
            in_flight: None,
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Whether an assistant reply is still streaming into this tab.
    pub fn is_responding(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Most recent message whose edit proposal awaits a decision.
    pub fn latest_pending(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_action_pending())
    }

    pub(crate) fn messages_mut(&mut self) -> &mut Vec<Message> {
        &mut self.messages
    }

    pub(crate) fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id() == id)
    }

    pub(crate) fn history_mut(&mut self) -> &mut HistoryLog {
        &mut self.history
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    tabs: Vec<Tab>,
    active: TabId,
    #[serde(default)]
    pub settings: EditorSettings,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::with_tab(Tab::new(UNTITLED, ""))
    }
}

impl Workspace {
    fn with_tab(tab: Tab) -> Self {
        Self {
            active: tab.id,
            tabs: vec![tab],
            settings: EditorSettings::default(),
        }
    }

    /// Workspace shown on the very first run: a single guide tab.
    pub fn first_launch() -> Self {
        Self::with_tab(Tab::get_started())
    }

    /// Reads a saved workspace. A missing file means first launch; a
    /// corrupt one is discarded.
    pub fn load_state(path: &Path) -> Self {
        if !path.exists() {
            return Self::first_launch();
        }
        let restored = fs::read_to_string(path)
            .map_err(LexiError::from)
            .and_then(|s| serde_json::from_str::<Workspace>(&s).map_err(LexiError::from));
        match restored {
            Ok(mut workspace) => {
                workspace.normalize();
                workspace
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding unreadable workspace state");
                Self::default()
            }
        }
    }

    pub fn save_state(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn normalize(&mut self) {
        if self.tabs.is_empty() {
            *self = Self::default();
            return;
        }
        if !self.tabs.iter().any(|t| t.id == self.active) {
            self.active = self.tabs[0].id;
        }
        let stored = EditorSettingsPatch::from(&self.settings);
        self.settings = EditorSettings::default();
        self.settings.merge(&stored);
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active_id(&self) -> TabId {
        self.active
    }

    pub fn active(&self) -> &Tab {
        // `active` always names an existing tab
        self.tabs
            .iter()
            .find(|t| t.id == self.active)
            .unwrap_or(&self.tabs[0])
    }

    pub(crate) fn active_mut(&mut self) -> &mut Tab {
        let idx = self.index_of(self.active).unwrap_or(0);
        &mut self.tabs[idx]
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub(crate) fn tab_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id == id)
    }

    fn index_of(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == id)
    }

    /// Adds a tab after the others and makes it active.
    pub fn new_tab(&mut self, title: &str, content: &str) -> TabId {
        let tab = Tab::new(title, content);
        let id = tab.id;
        self.tabs.push(tab);
        self.active = id;
        id
    }

    /// Returns the previously active tab.
    pub fn activate_tab(&mut self, id: TabId) -> Result<TabId> {
        if self.index_of(id).is_none() {
            return Err(LexiError::UnknownTab(id));
        }
        let previous = self.active;
        self.active = id;
        Ok(previous)
    }

    /// Removes a tab and returns it. Closing the active tab activates the
    /// one before it; closing the last tab leaves a fresh untitled one.
    pub fn close_tab(&mut self, id: TabId) -> Result<Tab> {
        let idx = self.index_of(id).ok_or(LexiError::UnknownTab(id))?;
        let closed = self.tabs.remove(idx);

        if self.tabs.is_empty() {
            let fresh = Tab::new(UNTITLED, "");
            self.active = fresh.id;
            self.tabs.push(fresh);
        } else if self.active == id {
            self.active = self.tabs[idx.saturating_sub(1)].id;
        }
        Ok(closed)
    }

    pub fn rename_tab(&mut self, id: TabId, title: &str) -> Result<()> {
        let tab = self.tab_mut(id).ok_or(LexiError::UnknownTab(id))?;
        let title = title.trim();
        if !title.is_empty() {
            tab.title = title.to_string();
        }
        Ok(())
    }

    /// A user edit to the active document.
    pub fn set_active_content(&mut self, content: &str) {
        self.active_mut().document.set_content(content);
    }

    /// Empties the active document and greets the user again.
    pub fn clear_document(&mut self) {
        let tab = self.active_mut();
        tab.document.set_content("");
        tab.push_message(Message::assistant("ai-clear", CLEARED_GREETING));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Sender;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn titles(ws: &Workspace) -> Vec<&str> {
        ws.tabs().iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn test_first_launch_has_guide() {
        let ws = Workspace::first_launch();
        assert_eq!(titles(&ws), vec!["Get Started"]);
        assert!(ws.active().document.content().starts_with("# Welcome to Lexi!"));
        assert_eq!(ws.active().messages()[0].text(), GET_STARTED_GREETING);
    }

    #[test]
    fn test_new_tab_becomes_active_with_greeting() {
        let mut ws = Workspace::default();
        let id = ws.new_tab("Essay", "draft");
        assert_eq!(ws.active_id(), id);
        let greeting = &ws.active().messages()[0];
        assert_eq!(greeting.sender(), Sender::Assistant);
        assert!(greeting.text().contains("\"Essay\""));

        let blank = ws.new_tab("  ", "");
        assert_eq!(ws.tab(blank).unwrap().title, "Untitled");
    }

    #[test]
    fn test_close_active_activates_previous() {
        let mut ws = Workspace::default();
        let first = ws.active_id();
        let second = ws.new_tab("B", "");
        let third = ws.new_tab("C", "");

        ws.activate_tab(second).unwrap();
        ws.close_tab(second).unwrap();
        assert_eq!(ws.active_id(), first);

        ws.activate_tab(first).unwrap();
        ws.close_tab(first).unwrap();
        assert_eq!(ws.active_id(), third);
    }

    #[test]
    fn test_close_inactive_keeps_active() {
        let mut ws = Workspace::default();
        let first = ws.active_id();
        let second = ws.new_tab("B", "");
        ws.close_tab(first).unwrap();
        assert_eq!(ws.active_id(), second);
    }

    #[test]
    fn test_closing_last_tab_creates_fresh_one() {
        let mut ws = Workspace::default();
        let only = ws.active_id();
        ws.close_tab(only).unwrap();
        assert_eq!(ws.tabs().len(), 1);
        assert_ne!(ws.active_id(), only);
        assert_eq!(ws.active().title, "Untitled");
    }

    #[test]
    fn test_unknown_tab_is_error() {
        let mut ws = Workspace::default();
        let stray = TabId::new();
        assert!(matches!(ws.activate_tab(stray), Err(LexiError::UnknownTab(_))));
        assert!(ws.close_tab(stray).is_err());
        assert!(ws.rename_tab(stray, "x").is_err());
    }

    #[test]
    fn test_clear_document() {
        let mut ws = Workspace::default();
        ws.set_active_content("some words");
        ws.clear_document();
        assert_eq!(ws.active().document.content(), "");
        assert_eq!(ws.active().messages().last().unwrap().text(), CLEARED_GREETING);
    }

    #[test]
    fn test_state_round_trip_and_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        assert_eq!(titles(&Workspace::load_state(&path)), vec!["Get Started"]);

        let mut ws = Workspace::default();
        ws.new_tab("Poem", "roses");
        ws.save_state(&path).unwrap();
        let restored = Workspace::load_state(&path);
        assert_eq!(titles(&restored), vec!["Untitled", "Poem"]);
        assert_eq!(restored.active().document.content(), "roses");

        fs::write(&path, "{ broken").unwrap();
        assert_eq!(titles(&Workspace::load_state(&path)), vec!["Untitled"]);
    }
}
