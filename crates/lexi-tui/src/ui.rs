use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use lexi_core::{ActionState, Message, Sender};

use crate::app::{App, FocusPane, InputMode, Popup};

/// Accent color for the editor theme name stored in the settings.
fn theme_accent(theme: &str) -> Color {
    match theme {
        "light" | "monochrome-light" | "pastel-dream" => Color::Blue,
        "amoled-black" | "monochrome-dark" | "volcanic-ash" => Color::White,
        "slate-blue" | "arctic-blue" | "ocean-breeze" | "deep-indigo" => Color::LightBlue,
        "forest-green" | "minty-fresh" => Color::Green,
        "sunset-orange" | "golden-hour" | "coffee-house" => Color::Yellow,
        "crimson-night" | "rose-quartz" => Color::LightRed,
        "royal-purple" | "cyberpunk-glow" => Color::Magenta,
        _ => Color::Cyan,
    }
}

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Row and column of a char index inside `text`, counting `\n` as a line break.
fn cursor_row_col(text: &str, char_idx: usize) -> (usize, usize) {
    let mut row = 0;
    let mut col = 0;
    for c in text.chars().take(char_idx) {
        if c == '\n' {
            row += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (row, col)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.assistant.settings().is_assistant_panel_visible {
        let [doc_area, assistant_area] = Layout::horizontal([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .areas(body_area);
        render_document(app, frame, doc_area);
        render_assistant_panel(app, frame, assistant_area);
    } else {
        render_document(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);

    if let Some(popup) = app.popup {
        render_popup(app, popup, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let accent = theme_accent(&app.assistant.settings().theme);
    let workspace = app.assistant.workspace();
    let active = workspace.active_id();

    let mut spans = vec![Span::styled(" Lexi ", Style::default().fg(accent).bold())];
    for (i, tab) in workspace.tabs().iter().enumerate() {
        let busy = if app.assistant.is_responding(tab.id()) { "*" } else { "" };
        let label = format!(" {}:{}{} ", i + 1, tab.title, busy);
        let style = if tab.id() == active {
            Style::default().bg(accent).fg(Color::Black).bold()
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }

    let provider = app.assistant.provider_name().unwrap_or("no provider");
    spans.push(Span::styled(
        format!(" {}: {} ", provider, app.model_label),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_document(app: &mut App, frame: &mut Frame, area: Rect) {
    let accent = theme_accent(&app.assistant.settings().theme);
    let editing = app.input_mode == InputMode::Editing && app.focus == FocusPane::Document;
    let border_color = if editing {
        Color::Yellow
    } else if app.focus == FocusPane::Document {
        accent
    } else {
        Color::DarkGray
    };

    let tab = app.assistant.active_tab();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", tab.title));

    let content = tab.document.content();
    let inner_height = area.height.saturating_sub(2);
    let (row, col) = cursor_row_col(content, app.doc_cursor);

    // Keep the cursor row on screen while typing
    if editing && inner_height > 0 {
        let row = row as u16;
        if row < app.doc_scroll {
            app.doc_scroll = row;
        } else if row >= app.doc_scroll + inner_height {
            app.doc_scroll = row - inner_height + 1;
        }
    }

    let text = if content.is_empty() && !editing {
        Text::from(Span::styled(
            "Start writing, or press e to edit...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(content.lines().map(|l| Line::from(l.to_string())).collect::<Vec<_>>())
    };

    let paragraph = Paragraph::new(text).block(block).scroll((app.doc_scroll, 0));
    frame.render_widget(paragraph, area);

    if editing {
        let max_x = area.width.saturating_sub(2);
        let x = (col as u16).min(max_x.saturating_sub(1));
        let y = (row as u16).saturating_sub(app.doc_scroll);
        frame.set_cursor_position((area.x + 1 + x, area.y + 1 + y));
    }
}

fn message_lines(msg: &Message, lines: &mut Vec<Line<'static>>) {
    match msg.sender() {
        Sender::User => {
            lines.push(Line::from(Span::styled(
                "You:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            for line in msg.text().lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Sender::Assistant => {
            lines.push(Line::from(Span::styled(
                "Lexi:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            for line in msg.text().lines() {
                lines.push(parse_markdown_line(line));
            }
            if let Some(note) = msg.metadata_text() {
                lines.push(Line::from(Span::styled(
                    format!("note: {}", note),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            }
            if let Some(command) = msg.action_command() {
                let (label, style) = match msg.action_state() {
                    ActionState::Pending => (
                        format!("[{} suggested: a apply, r reject]", command.kind.as_str()),
                        Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
                    ),
                    ActionState::Applied => (
                        format!("[{} applied]", command.kind.as_str()),
                        Style::default().fg(Color::Green),
                    ),
                    ActionState::Rejected => (
                        format!("[{} rejected]", command.kind.as_str()),
                        Style::default().fg(Color::Red),
                    ),
                    ActionState::None => (String::new(), Style::default()),
                };
                if !label.is_empty() {
                    lines.push(Line::from(Span::styled(label, style)));
                }
            }
        }
    }
    lines.push(Line::default());
}

fn render_assistant_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Inner size minus borders, used for scroll calculations
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let accent = theme_accent(&app.assistant.settings().theme);
    let chat_border = if app.focus == FocusPane::Chat { accent } else { Color::DarkGray };
    let voice = if app.assistant.settings().assistant_voice_enabled { " voice on " } else { "" };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(chat_border))
        .title(" Lexi ")
        .title_bottom(Line::from(voice).right_aligned());

    let tab = app.assistant.active_tab();
    let responding = tab.is_responding();
    let mut lines: Vec<Line<'static>> = Vec::new();
    for msg in tab.messages() {
        if responding && msg.sender() == Sender::Assistant && msg.text().is_empty() {
            continue;
        }
        message_lines(msg, &mut lines);
    }

    if responding {
        let streaming_empty = tab
            .messages()
            .last()
            .map(|m| m.sender() == Sender::Assistant && m.text().is_empty())
            .unwrap_or(false);
        if streaming_empty {
            lines.push(Line::from(Span::styled(
                "Lexi:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
        }
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Lexi is typing{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    // Chat input at the bottom
    let input_editing = app.input_mode == InputMode::Editing && app.focus == FocusPane::Input;
    let input_border = if input_editing {
        Color::Yellow
    } else if app.focus == FocusPane::Input {
        accent
    } else {
        Color::DarkGray
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border))
        .title(" Ask Lexi ");

    // Horizontal scrolling keeps the cursor visible
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.chat_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .chat_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, input_area);

    if input_editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match (app.input_mode, app.focus) {
        (InputMode::Normal, _) => " NORMAL ",
        (InputMode::Editing, FocusPane::Document) => " WRITE ",
        (InputMode::Editing, _) => " ASK ",
    };

    // Error banner takes the whole footer
    if let Some(error) = app.assistant.error_banner() {
        let line = Line::from(vec![
            Span::styled(mode_text, mode_style),
            Span::styled(format!(" {} ", error), Style::default().bg(Color::Red).fg(Color::White)),
            Span::styled(" Esc dismiss ", Style::default().fg(Color::Gray)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    if let Some(status) = &app.status {
        spans.push(Span::styled(format!(" {} ", status), Style::default().fg(Color::Green)));
    }

    let hints: Vec<(&str, &str)> = match app.input_mode {
        InputMode::Editing => vec![("Esc", "done"), ("Enter", if app.focus == FocusPane::Document { "newline" } else { "send" })],
        InputMode::Normal => {
            let mut hints = vec![("i", "ask"), ("e", "write")];
            if app.latest_pending().is_some() {
                hints.extend([("a", "apply"), ("r", "reject")]);
            }
            hints.extend([
                ("t", "new tab"),
                ("[/]", "tabs"),
                ("s", "save"),
                ("o", "open"),
                ("C", "clear"),
                ("v", "voice"),
                ("p", "panel"),
                ("q", "quit"),
            ]);
            hints
        }
    };
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_popup(app: &App, popup: Popup, frame: &mut Frame, area: Rect) {
    let title = match popup {
        Popup::OpenFile => " Open .aitxt file (Enter to open, Esc to cancel) ",
        Popup::RenameTab => " Rename tab (Enter to save, Esc to cancel) ",
    };

    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 3;
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    let inner_width = popup_width.saturating_sub(2) as usize;
    let len = app.popup_input.chars().count();
    let skip = len.saturating_sub(inner_width.saturating_sub(1));
    let visible: String = app.popup_input.chars().skip(skip).collect();

    frame.render_widget(Paragraph::new(visible.clone()).block(block), popup_area);
    frame.set_cursor_position((
        popup_area.x + 1 + visible.chars().count() as u16,
        popup_area.y + 1,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_row_col_counts_newlines() {
        assert_eq!(cursor_row_col("ab\ncd", 0), (0, 0));
        assert_eq!(cursor_row_col("ab\ncd", 2), (0, 2));
        assert_eq!(cursor_row_col("ab\ncd", 3), (1, 0));
        assert_eq!(cursor_row_col("ab\ncd", 5), (1, 2));
    }

    #[test]
    fn test_markdown_bold_spans() {
        let line = parse_markdown_line("a **bold** move");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "bold");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("oops **never closed");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "oops **never closed");
    }
}
