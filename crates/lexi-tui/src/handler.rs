use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{char_to_byte_index, App, FocusPane, InputMode, Popup};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => app.scroll_chat_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Stream(event) => app.on_stream_event(event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }
    if key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.save_document();
        return;
    }

    if app.popup.is_some() {
        handle_popup(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => match app.focus {
            FocusPane::Document => handle_document_editing(app, key),
            _ => handle_chat_editing(app, key),
        },
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    app.status = None;
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Start typing in the focused pane
        KeyCode::Char('i') | KeyCode::Enter => {
            if app.focus == FocusPane::Chat {
                app.focus = FocusPane::Input;
            }
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('e') => {
            app.focus = FocusPane::Document;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Document => FocusPane::Chat,
                FocusPane::Chat => FocusPane::Input,
                FocusPane::Input => FocusPane::Document,
            };
        }

        // Suggestions
        KeyCode::Char('a') => app.apply_latest(),
        KeyCode::Char('r') => app.reject_latest(),

        // Tabs
        KeyCode::Char('t') => app.new_tab(),
        KeyCode::Char('w') => app.close_tab(),
        KeyCode::Char(']') | KeyCode::Char('l') => app.cycle_tab(1),
        KeyCode::Char('[') | KeyCode::Char('h') => app.cycle_tab(-1),
        KeyCode::Char(c @ '1'..='9') => app.select_tab_index(c as usize - '1' as usize),
        KeyCode::Char('R') => app.open_popup(Popup::RenameTab),

        // Document
        KeyCode::Char('C') => app.clear_document(),
        KeyCode::Char('s') => app.save_document(),
        KeyCode::Char('o') => app.open_popup(Popup::OpenFile),

        // Settings
        KeyCode::Char('v') => {
            let on = app.assistant.toggle_voice();
            app.status = Some(format!("Voice {}", if on { "on" } else { "off" }));
        }
        KeyCode::Char('p') => {
            app.assistant.toggle_assistant_panel();
        }

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Document => app.doc_scroll = app.doc_scroll.saturating_add(1),
            _ => app.chat_scroll = app.chat_scroll.saturating_add(1),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Document => app.doc_scroll = app.doc_scroll.saturating_sub(1),
            _ => app.chat_scroll = app.chat_scroll.saturating_sub(1),
        },
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        KeyCode::Esc => app.assistant.dismiss_error(),
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            if !app.chat_input.trim().is_empty() {
                app.send_chat_input();
            }
        }
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                app.chat_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.chat_input.chars().count();
            if app.chat_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.chat_cursor = 0;
        }
        KeyCode::End => {
            app.chat_cursor = app.chat_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_pos, c);
            app.chat_cursor += 1;
        }
        _ => {}
    }
}

fn handle_document_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.insert_into_document("\n"),
        KeyCode::Tab => app.insert_into_document("    "),
        KeyCode::Backspace => app.delete_before_doc_cursor(),
        KeyCode::Left => app.move_doc_cursor(-1),
        KeyCode::Right => app.move_doc_cursor(1),
        KeyCode::Home => app.move_doc_cursor(-(app.doc_cursor as isize)),
        KeyCode::End => app.move_doc_cursor(isize::MAX / 2),
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            app.insert_into_document(c.encode_utf8(&mut buf));
        }
        _ => {}
    }
}

fn handle_popup(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.popup = None;
            app.popup_input.clear();
        }
        KeyCode::Enter => app.submit_popup(),
        KeyCode::Backspace => {
            app.popup_input.pop();
        }
        KeyCode::Char(c) => app.popup_input.push(c),
        _ => {}
    }
}

fn handle_paste(app: &mut App, text: &str) {
    if app.popup.is_some() {
        app.popup_input.push_str(text.trim_end_matches(['\r', '\n']));
        return;
    }
    match (app.input_mode, app.focus) {
        (InputMode::Editing, FocusPane::Document) => app.insert_into_document(text),
        (InputMode::Editing, _) => {
            let single_line = text.replace(['\r', '\n'], " ");
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert_str(byte_pos, &single_line);
            app.chat_cursor += single_line.chars().count();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexi_core::{Assistant, Workspace};
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let assistant = Assistant::new(Workspace::default(), None);
        App::new(assistant, "test".to_string(), std::env::temp_dir(), tx)
    }

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    async fn type_keys(app: &mut App, keys: &str) {
        for c in keys.chars() {
            handle_event(app, press(KeyCode::Char(c))).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_chat_editing_handles_multibyte_text() {
        let mut app = app();
        handle_event(&mut app, press(KeyCode::Char('i'))).await.unwrap();
        type_keys(&mut app, "héllo").await;
        handle_event(&mut app, press(KeyCode::Left)).await.unwrap();
        handle_event(&mut app, press(KeyCode::Backspace)).await.unwrap();
        assert_eq!(app.chat_input, "hélo");
        assert_eq!(app.chat_cursor, 3);
    }

    #[tokio::test]
    async fn test_document_editing_writes_to_active_tab() {
        let mut app = app();
        handle_event(&mut app, press(KeyCode::Char('e'))).await.unwrap();
        type_keys(&mut app, "ab").await;
        handle_event(&mut app, press(KeyCode::Enter)).await.unwrap();
        type_keys(&mut app, "c").await;
        assert_eq!(app.assistant.active_tab().document.content(), "ab\nc");

        handle_event(&mut app, press(KeyCode::Esc)).await.unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[tokio::test]
    async fn test_tab_keys_open_and_cycle() {
        let mut app = app();
        let first = app.assistant.workspace().active_id();
        handle_event(&mut app, press(KeyCode::Char('t'))).await.unwrap();
        assert_eq!(app.assistant.workspace().tabs().len(), 2);
        assert_ne!(app.assistant.workspace().active_id(), first);

        handle_event(&mut app, press(KeyCode::Char(']'))).await.unwrap();
        assert_eq!(app.assistant.workspace().active_id(), first);
        handle_event(&mut app, press(KeyCode::Char('2'))).await.unwrap();
        assert_ne!(app.assistant.workspace().active_id(), first);
    }

    #[tokio::test]
    async fn test_rename_popup_updates_title() {
        let mut app = app();
        handle_event(&mut app, press(KeyCode::Char('R'))).await.unwrap();
        assert_eq!(app.popup, Some(Popup::RenameTab));
        for _ in 0..app.popup_input.chars().count() {
            handle_event(&mut app, press(KeyCode::Backspace)).await.unwrap();
        }
        type_keys(&mut app, "Draft").await;
        handle_event(&mut app, press(KeyCode::Enter)).await.unwrap();
        assert_eq!(app.popup, None);
        assert_eq!(app.assistant.active_tab().title, "Draft");
    }

    #[tokio::test]
    async fn test_send_without_provider_keeps_input() {
        let mut app = app();
        handle_event(&mut app, press(KeyCode::Char('i'))).await.unwrap();
        type_keys(&mut app, "hi").await;
        handle_event(&mut app, press(KeyCode::Enter)).await.unwrap();
        assert_eq!(app.chat_input, "hi");
        assert!(app.assistant.error_banner().is_some());
    }
}
