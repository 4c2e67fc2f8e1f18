//! UI-agnostic conversation types
//!
//! Messages, the edit proposals parsed out of assistant replies, and the
//! per-message action state. These are shared between the core and any
//! front end (the TUI today) and carry no UI framework dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable message identifier, unique across every tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

/// The two document mutations an assistant reply can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Regenerate,
    Append,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Regenerate => "regenerate",
            ActionKind::Append => "append",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "regenerate" => Some(ActionKind::Regenerate),
            "append" => Some(ActionKind::Append),
            _ => None,
        }
    }

    /// Result of applying this action with `payload` to `current`
    pub fn apply_to(&self, current: &str, payload: &str) -> String {
        match self {
            ActionKind::Regenerate => payload.to_string(),
            ActionKind::Append => format!("{}{}", current, payload),
        }
    }
}

/// A structured edit proposal extracted from assistant text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCommand {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub payload: String,
    /// The exact block the command was cut out of, braces included.
    pub original_command_string: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    None,
    Pending,
    Applied,
    Rejected,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionState::Applied | ActionState::Rejected)
    }
}

/// One turn in a conversation.
///
/// Text is mutable only while the message is being streamed or finalized;
/// once the action state is terminal the message is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MessageRecord", into = "MessageRecord")]
pub struct Message {
    id: MessageId,
    sender: Sender,
    text: String,
    timestamp: DateTime<Utc>,
    action_command: Option<ActionCommand>,
    metadata_text: Option<String>,
    action_state: ActionState,
}

impl Message {
    fn new(id: MessageId, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id,
            sender,
            text: text.into(),
            timestamp: Utc::now(),
            action_command: None,
            metadata_text: None,
            action_state: ActionState::None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageId::new("user"), Sender::User, text)
    }

    /// A plain assistant message (greetings, notices)
    pub fn assistant(prefix: &str, text: impl Into<String>) -> Self {
        Self::new(MessageId::new(prefix), Sender::Assistant, text)
    }

    /// Empty assistant message filled in as a reply streams in
    pub fn placeholder() -> Self {
        Self::new(MessageId::new("ai"), Sender::Assistant, String::new())
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn action_command(&self) -> Option<&ActionCommand> {
        self.action_command.as_ref()
    }

    pub fn metadata_text(&self) -> Option<&str> {
        self.metadata_text.as_deref()
    }

    pub fn action_state(&self) -> ActionState {
        self.action_state
    }

    pub fn is_action_pending(&self) -> bool {
        self.action_state == ActionState::Pending
    }

    pub(crate) fn set_live_text(&mut self, text: &str) {
        if !self.action_state.is_terminal() {
            self.text.clear();
            self.text.push_str(text);
        }
    }

    pub(crate) fn finalize(
        &mut self,
        text: String,
        command: Option<ActionCommand>,
        metadata: Option<String>,
    ) {
        if self.action_state.is_terminal() {
            return;
        }
        self.action_state = if command.is_some() {
            ActionState::Pending
        } else {
            ActionState::None
        };
        self.text = text;
        self.action_command = command;
        self.metadata_text = metadata;
    }

    pub(crate) fn fail(&mut self, text: String) {
        if self.action_state.is_terminal() {
            return;
        }
        self.text = text;
        self.action_command = None;
        self.action_state = ActionState::None;
    }

    /// Moves `Pending` to `to`; anything else is left untouched.
    pub(crate) fn resolve(&mut self, to: ActionState) -> bool {
        if self.action_state != ActionState::Pending || !to.is_terminal() {
            return false;
        }
        self.action_state = to;
        true
    }
}

/// On-disk message shape, compatible with `.aitxt` exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_command: Option<ActionCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_action_pending: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_action_applied: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_action_rejected: bool,
}

impl From<Message> for MessageRecord {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            sender: m.sender,
            text: m.text,
            timestamp: m.timestamp,
            action_command: m.action_command,
            metadata_text: m.metadata_text,
            is_action_pending: m.action_state == ActionState::Pending,
            is_action_applied: m.action_state == ActionState::Applied,
            is_action_rejected: m.action_state == ActionState::Rejected,
        }
    }
}

impl From<MessageRecord> for Message {
    fn from(r: MessageRecord) -> Self {
        // A state flag without a command is meaningless; drop it
        let action_state = match (&r.action_command, r.is_action_applied, r.is_action_rejected) {
            (None, _, _) => ActionState::None,
            (Some(_), true, _) => ActionState::Applied,
            (Some(_), false, true) => ActionState::Rejected,
            (Some(_), false, false) if r.is_action_pending => ActionState::Pending,
            (Some(_), false, false) => ActionState::None,
        };
        Self {
            id: r.id,
            sender: r.sender,
            text: r.text,
            timestamp: r.timestamp,
            action_command: r.action_command,
            metadata_text: r.metadata_text,
            action_state,
        }
    }
}
