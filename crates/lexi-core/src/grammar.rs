//! Response grammar
//!
//! Assistant replies may carry in-band directives:
//!
//! - `{regenerate:<text>}` replace the whole document with `<text>`
//! - `{append:<text>}` append `<text>` to the document
//! - `{metadata:<note>}` an explanatory note shown next to the reply
//!
//! [`parse_response`] splits a fully accumulated reply into the text to
//! display, the first edit command (if any) and the metadata note. It is
//! total: malformed input simply yields no match.

use regex::Regex;
use std::sync::OnceLock;

use crate::state::{ActionCommand, ActionKind};

/// How directive payloads are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// A payload ends at the first `}` after the colon. A payload that
    /// itself contains `}` is truncated there and the rest leaks into
    /// the display text.
    #[default]
    ShortestMatch,
    /// Braces are counted, so a payload may contain balanced `{...}` pairs.
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub display_text: String,
    pub action_command: Option<ActionCommand>,
    pub metadata_text: Option<String>,
}

/// A located directive: the whole `{...}` block, its keyword and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block<'a> {
    matched: &'a str,
    keyword: &'a str,
    payload: &'a str,
}

const COMMAND_KEYWORDS: &[&str] = &["regenerate", "append"];
const METADATA_KEYWORDS: &[&str] = &["metadata"];

fn command_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{(regenerate|append):(.*?)\}").expect("valid command regex"))
}

fn metadata_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{(metadata):(.*?)\}").expect("valid metadata regex"))
}

pub fn parse_response(raw: &str) -> ParsedResponse {
    parse_response_with(raw, ParseMode::default())
}

pub fn parse_response_with(raw: &str, mode: ParseMode) -> ParsedResponse {
    let mut display_text = raw.to_string();
    let mut action_command = None;
    let mut metadata_text: Option<String> = None;

    if let Some(block) = find_block(raw, mode, COMMAND_KEYWORDS) {
        if let Some(kind) = ActionKind::from_keyword(block.keyword) {
            display_text = remove_first(&display_text, block.matched);
            action_command = Some(ActionCommand {
                kind,
                payload: block.payload.to_string(),
                original_command_string: block.matched.to_string(),
            });
        }
    }

    if let Some(block) = find_block(&display_text, mode, METADATA_KEYWORDS) {
        let note = block.payload.trim().to_string();
        let matched = block.matched.to_string();
        metadata_text = Some(note);
        display_text = remove_first(&display_text, &matched);
    }

    // Second chance against the untouched reply. An empty note counts as
    // missing here.
    if metadata_text.as_deref().map_or(true, str::is_empty) {
        if let Some(block) = find_block(raw, mode, METADATA_KEYWORDS) {
            let swallowed = action_command
                .as_ref()
                .is_some_and(|c: &ActionCommand| c.original_command_string.contains(block.matched));
            if !swallowed {
                metadata_text = Some(block.payload.trim().to_string());
                if display_text.contains(block.matched) {
                    display_text = remove_first(&display_text, block.matched);
                }
            }
        }
    }

    ParsedResponse {
        display_text: display_text.trim().to_string(),
        action_command,
        metadata_text,
    }
}

/// Removes the first occurrence of `needle` and trims the result.
fn remove_first(haystack: &str, needle: &str) -> String {
    haystack.replacen(needle, "", 1).trim().to_string()
}

fn find_block<'a>(text: &'a str, mode: ParseMode, keywords: &[&str]) -> Option<Block<'a>> {
    match mode {
        ParseMode::ShortestMatch => {
            let re = if keywords == METADATA_KEYWORDS {
                metadata_regex()
            } else {
                command_regex()
            };
            let caps = re.captures(text)?;
            Some(Block {
                matched: caps.get(0)?.as_str(),
                keyword: caps.get(1)?.as_str(),
                payload: caps.get(2)?.as_str(),
            })
        }
        ParseMode::Balanced => find_balanced_block(text, keywords),
    }
}

/// Scans for `{keyword:` and the `}` that balances it. An opener that is
/// never closed is skipped and scanning resumes after it.
fn find_balanced_block<'a>(text: &'a str, keywords: &[&str]) -> Option<Block<'a>> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let open = search_from + offset;
        let after_brace = &text[open + 1..];
        search_from = open + 1;

        let Some(keyword) = keywords
            .iter()
            .find(|k| after_brace.starts_with(*k) && after_brace[k.len()..].starts_with(':'))
        else {
            continue;
        };

        let payload_start = open + 1 + keyword.len() + 1;
        let mut depth = 1usize;
        for (i, c) in text[payload_start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let close = payload_start + i;
                        return Some(Block {
                            matched: &text[open..=close],
                            keyword: &text[open + 1..open + 1 + keyword.len()],
                            payload: &text[payload_start..close],
                        });
                    }
                }
                _ => {}
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cmd(kind: ActionKind, payload: &str, original: &str) -> Option<ActionCommand> {
        Some(ActionCommand {
            kind,
            payload: payload.to_string(),
            original_command_string: original.to_string(),
        })
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        let parsed = parse_response("  Just a friendly reply.\n");
        assert_eq!(parsed.display_text, "Just a friendly reply.");
        assert_eq!(parsed.action_command, None);
        assert_eq!(parsed.metadata_text, None);
    }

    #[test]
    fn test_regenerate_with_metadata() {
        let parsed =
            parse_response("Sure! {regenerate:New content here} {metadata:Rewrote for clarity}");
        assert_eq!(
            parsed,
            ParsedResponse {
                display_text: "Sure!".to_string(),
                action_command: cmd(
                    ActionKind::Regenerate,
                    "New content here",
                    "{regenerate:New content here}"
                ),
                metadata_text: Some("Rewrote for clarity".to_string()),
            }
        );
    }

    #[test]
    fn test_append_keeps_payload_newlines() {
        let parsed = parse_response("Added a line. {append:\nThe end.}");
        assert_eq!(parsed.display_text, "Added a line.");
        assert_eq!(
            parsed.action_command,
            cmd(ActionKind::Append, "\nThe end.", "{append:\nThe end.}")
        );
    }

    #[test]
    fn test_command_only_leaves_empty_display() {
        let parsed = parse_response("  {append: more}  ");
        assert_eq!(parsed.display_text, "");
        assert_eq!(parsed.action_command.unwrap().payload, " more");
    }

    #[test]
    fn test_reparse_of_display_text_is_idempotent() {
        let first = parse_response("Done! {append:x} {metadata:note}");
        let second = parse_response(&first.display_text);
        assert_eq!(second.display_text, first.display_text);
        assert_eq!(second.action_command, None);
        assert_eq!(second.metadata_text, None);
    }

    #[test]
    fn test_unicode_payload_survives() {
        let parsed = parse_response("Voilà {regenerate:  Ünïcödé ✨\nzweite Zeile  } fin");
        assert_eq!(parsed.display_text, "Voilà  fin");
        assert_eq!(parsed.action_command.unwrap().payload, "  Ünïcödé ✨\nzweite Zeile  ");
    }

    #[test]
    fn test_only_first_command_is_honored() {
        let parsed = parse_response("A {append:one} B {regenerate:two}");
        assert_eq!(parsed.action_command.unwrap().kind, ActionKind::Append);
        assert_eq!(parsed.display_text, "A  B {regenerate:two}");
    }

    #[test]
    fn test_shortest_match_truncates_at_first_brace() {
        let parsed = parse_response("Here {regenerate:fn main() {}} done");
        let command = parsed.action_command.unwrap();
        assert_eq!(command.payload, "fn main() {");
        assert_eq!(parsed.display_text, "Here } done");
    }

    #[test]
    fn test_balanced_mode_keeps_nested_braces() {
        let parsed = parse_response_with("Here {regenerate:fn main() {}} done", ParseMode::Balanced);
        assert_eq!(parsed.action_command.unwrap().payload, "fn main() {}");
        assert_eq!(parsed.display_text, "Here  done");
    }

    #[test]
    fn test_balanced_mode_skips_unclosed_opener() {
        let parsed = parse_response_with("{append:never closed", ParseMode::Balanced);
        assert_eq!(parsed.action_command, None);
        assert_eq!(parsed.display_text, "{append:never closed");
    }

    #[test]
    fn test_metadata_inside_command_payload_is_not_adopted() {
        // The command swallows the metadata opener and ends at its brace.
        let parsed = parse_response("Ok {append:text {metadata:inner} tail");
        let command = parsed.action_command.unwrap();
        assert_eq!(command.original_command_string, "{append:text {metadata:inner}");
        assert_eq!(parsed.metadata_text, None);
        assert_eq!(parsed.display_text, "Ok  tail");
    }

    #[test]
    fn test_empty_metadata_falls_back_to_original() {
        let parsed = parse_response("Hi {metadata:   }");
        assert_eq!(parsed.display_text, "Hi");
        assert_eq!(parsed.metadata_text, Some(String::new()));
    }

    #[test]
    fn test_unknown_directive_is_prose() {
        let parsed = parse_response("Use {delete:all} carefully");
        assert_eq!(parsed.action_command, None);
        assert_eq!(parsed.display_text, "Use {delete:all} carefully");
    }
}
