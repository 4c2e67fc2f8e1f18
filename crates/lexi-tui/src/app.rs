use std::path::PathBuf;

use chrono::Utc;
use lexi_core::{
    suggested_file_name, ActionOutcome, Assistant, ExchangeStatus, LexiError, Message, MessageId,
    StreamEvent,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Document,
    Chat,
    Input,
}

/// Single-line prompts shown over the main screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    OpenFile,
    RenameTab,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub assistant: Assistant,

    // Chat input
    pub chat_input: String,
    pub chat_cursor: usize,

    // Document editing (cursor is a char index into the active document)
    pub doc_cursor: usize,
    pub doc_scroll: u16,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Popups
    pub popup: Option<Popup>,
    pub popup_input: String,

    /// Transient notice in the footer (saved file name and so on)
    pub status: Option<String>,

    // Animation state
    pub animation_frame: u8,

    pub model_label: String,
    pub save_dir: PathBuf,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        assistant: Assistant,
        model_label: String,
        save_dir: PathBuf,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let doc_cursor = assistant.active_tab().document.content().chars().count();
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Input,
            assistant,
            chat_input: String::new(),
            chat_cursor: 0,
            doc_cursor,
            doc_scroll: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            popup: None,
            popup_input: String::new(),
            status: None,
            animation_frame: 0,
            model_label,
            save_dir,
            events,
        }
    }

    pub fn is_responding(&self) -> bool {
        let active = self.assistant.workspace().active_id();
        self.assistant.is_responding(active)
    }

    /// Sends the chat input; the reply streams in on a background task.
    pub fn send_chat_input(&mut self) {
        let text = std::mem::take(&mut self.chat_input);
        self.chat_cursor = 0;
        match self.assistant.begin_send(&text) {
            Ok(exchange) => {
                tokio::spawn(exchange.run_with(self.events.clone(), AppEvent::Stream));
                self.scroll_chat_to_bottom();
            }
            Err(LexiError::EmptyMessage) => {}
            Err(err) => {
                // Keep what was typed so it can be sent again
                warn!(error = %err, "message not sent");
                self.chat_cursor = text.chars().count();
                self.chat_input = text;
            }
        }
    }

    pub fn on_stream_event(&mut self, event: StreamEvent) {
        let for_active = event.tab_id == self.assistant.workspace().active_id();
        let status = self.assistant.apply_event(event);
        if for_active && status != ExchangeStatus::Ignored {
            self.scroll_chat_to_bottom();
            if status == ExchangeStatus::Completed {
                self.clamp_doc_cursor();
            }
        }
    }

    /// Message whose edit proposal awaits a decision in the active tab.
    pub fn latest_pending(&self) -> Option<MessageId> {
        self.assistant.active_tab().latest_pending().map(|m| m.id().clone())
    }

    pub fn apply_latest(&mut self) {
        let Some(id) = self.latest_pending() else {
            self.status = Some("No pending suggestion".to_string());
            return;
        };
        if let ActionOutcome::Applied(kind) = self.assistant.apply_action(&id) {
            self.status = Some(format!("Applied {} suggestion", kind.as_str()));
            self.doc_cursor = self.assistant.active_tab().document.content().chars().count();
        }
    }

    pub fn reject_latest(&mut self) {
        if let Some(id) = self.latest_pending() {
            if self.assistant.reject_action(&id) == ActionOutcome::Rejected {
                self.status = Some("Suggestion rejected".to_string());
            }
        }
    }

    // ---- tabs -------------------------------------------------------------

    pub fn new_tab(&mut self) {
        self.assistant.new_tab("", "");
        self.on_tab_changed();
    }

    pub fn close_tab(&mut self) {
        let id = self.assistant.workspace().active_id();
        if let Err(err) = self.assistant.close_tab(id) {
            warn!(error = %err, "close tab failed");
        }
        self.on_tab_changed();
    }

    /// Moves to the tab `offset` places away, wrapping around.
    pub fn cycle_tab(&mut self, offset: isize) {
        let tabs = self.assistant.workspace().tabs();
        let len = tabs.len() as isize;
        let current = tabs
            .iter()
            .position(|t| t.id() == self.assistant.workspace().active_id())
            .unwrap_or(0) as isize;
        let target = tabs[(current + offset).rem_euclid(len) as usize].id();
        self.select_tab(target);
    }

    pub fn select_tab_index(&mut self, index: usize) {
        if let Some(tab) = self.assistant.workspace().tabs().get(index) {
            let id = tab.id();
            self.select_tab(id);
        }
    }

    fn select_tab(&mut self, id: lexi_core::TabId) {
        if self.assistant.activate_tab(id).is_ok() {
            self.on_tab_changed();
        }
    }

    fn on_tab_changed(&mut self) {
        self.doc_cursor = self.assistant.active_tab().document.content().chars().count();
        self.doc_scroll = 0;
        self.scroll_chat_to_bottom();
    }

    pub fn clear_document(&mut self) {
        self.assistant.clear_document();
        self.doc_cursor = 0;
        self.doc_scroll = 0;
        self.scroll_chat_to_bottom();
    }

    // ---- files ------------------------------------------------------------

    pub fn save_document(&mut self) {
        let title = self.assistant.active_tab().title.clone();
        let path = self.save_dir.join(suggested_file_name(&title, Utc::now()));
        match self.assistant.export_document().write_to(&path) {
            Ok(()) => {
                info!(path = %path.display(), "saved document");
                self.status = Some(format!("Saved {}", path.display()));
            }
            Err(err) => {
                warn!(error = %err, "save failed");
                self.status = Some(format!("Save failed: {}", err));
            }
        }
    }

    pub fn open_document(&mut self, path: &str) {
        let path = PathBuf::from(path.trim());
        if self.assistant.load_document_from(&path).is_ok() {
            self.status = Some(format!("Loaded {}", path.display()));
            self.on_tab_changed();
        }
    }

    pub fn open_popup(&mut self, popup: Popup) {
        self.popup_input = match popup {
            Popup::OpenFile => String::new(),
            Popup::RenameTab => self.assistant.active_tab().title.clone(),
        };
        self.popup = Some(popup);
    }

    pub fn submit_popup(&mut self) {
        let input = std::mem::take(&mut self.popup_input);
        match self.popup.take() {
            Some(Popup::OpenFile) if !input.trim().is_empty() => self.open_document(&input),
            Some(Popup::RenameTab) => {
                let id = self.assistant.workspace().active_id();
                let _ = self.assistant.rename_tab(id, &input);
            }
            _ => {}
        }
    }

    // ---- document editing -------------------------------------------------

    fn clamp_doc_cursor(&mut self) {
        let len = self.assistant.active_tab().document.content().chars().count();
        self.doc_cursor = self.doc_cursor.min(len);
    }

    pub fn insert_into_document(&mut self, text: &str) {
        self.clamp_doc_cursor();
        let mut content = self.assistant.active_tab().document.content().to_string();
        let byte_pos = char_to_byte_index(&content, self.doc_cursor);
        content.insert_str(byte_pos, text);
        self.doc_cursor += text.chars().count();
        self.assistant.set_active_content(&content);
    }

    pub fn delete_before_doc_cursor(&mut self) {
        self.clamp_doc_cursor();
        if self.doc_cursor == 0 {
            return;
        }
        let mut content = self.assistant.active_tab().document.content().to_string();
        self.doc_cursor -= 1;
        let byte_pos = char_to_byte_index(&content, self.doc_cursor);
        content.remove(byte_pos);
        self.assistant.set_active_content(&content);
    }

    pub fn move_doc_cursor(&mut self, delta: isize) {
        let len = self.assistant.active_tab().document.content().chars().count() as isize;
        self.doc_cursor = (self.doc_cursor as isize + delta).clamp(0, len) as usize;
    }

    // ---- view -------------------------------------------------------------

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_responding() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll chat so the newest message is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };
        let total_lines = chat_line_count(self.assistant.active_tab().messages(), wrap_width);
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_scroll = u16::try_from(total_lines)
            .unwrap_or(u16::MAX)
            .saturating_sub(visible_height);
    }
}

/// Rendered height of the chat pane's messages at `wrap_width` columns.
fn chat_line_count(messages: &[Message], wrap_width: usize) -> usize {
    let wrap_width = wrap_width.max(1);
    messages
        .iter()
        .map(|msg| {
            let body: usize = msg
                .text()
                .lines()
                .map(|line| line.chars().count() / wrap_width + 1)
                .sum();
            let marker = usize::from(msg.metadata_text().is_some() || msg.action_command().is_some());
            // Sender line, body, marker, blank line after
            1 + body + marker + 1
        })
        .sum()
}

/// Convert a character index to a byte index for UTF-8 safe string operations
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexi_core::Workspace;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn app_in(dir: &TempDir) -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let assistant = Assistant::new(Workspace::default(), None);
        App::new(assistant, "test".to_string(), dir.path().to_path_buf(), tx)
    }

    #[test]
    fn test_save_then_open_in_new_tab() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);
        app.insert_into_document("A quiet start.");
        app.save_document();

        let saved = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.extension().is_some_and(|ext| ext == "aitxt"))
            .expect("saved file");

        app.new_tab();
        assert_eq!(app.assistant.active_tab().document.content(), "");
        app.open_document(saved.to_str().unwrap());
        assert_eq!(app.assistant.active_tab().document.content(), "A quiet start.");
        assert_eq!(app.doc_cursor, "A quiet start.".chars().count());
    }

    #[test]
    fn test_document_cursor_edits_by_char() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);
        app.insert_into_document("naïve");
        app.move_doc_cursor(-2);
        app.delete_before_doc_cursor();
        assert_eq!(app.assistant.active_tab().document.content(), "nave");
        app.move_doc_cursor(100);
        assert_eq!(app.doc_cursor, 4);
    }

    #[test]
    fn test_long_chat_scroll_saturates() {
        let messages: Vec<Message> = (0..200)
            .map(|_| Message::user("word ".repeat(2000)))
            .collect();
        assert!(chat_line_count(&messages, 10) > u16::MAX as usize);

        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);
        app.chat_width = 1;
        app.chat_height = 10;
        app.scroll_chat_to_bottom();
        assert!(app.chat_scroll > 0);
    }

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("abc", 10), 3);
    }
}
