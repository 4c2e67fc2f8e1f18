//! The conversation controller
//!
//! [`Assistant`] owns the workspace and coordinates everything that
//! touches it: sending messages, folding stream events into placeholder
//! messages, resolving edit proposals and the tab lifecycle. Any change of
//! context (new, activated, closed or cleared tab, or a loaded file) resets
//! the provider sessions of the tabs involved.
//!
//! Mutations happen one event at a time through `&mut self`. A reply runs
//! as an [`Exchange`] elsewhere and reports back via [`StreamEvent`]s,
//! which are applied with [`Assistant::apply_event`].

use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ai::ChatProvider;
use crate::error::{LexiError, Result};
use crate::grammar::ParseMode;
use crate::history::HistoryRecord;
use crate::lifecycle::{self, ActionOutcome};
use crate::persistence::DocumentFile;
use crate::prompts::{
    compose_prompt, error_reply, ASSISTANT_SYSTEM_INSTRUCTION, EMPTY_RESPONSE_FALLBACK,
    FILE_LOADED_GREETING, INTERRUPTED_FALLBACK, PENDING_EDIT_FALLBACK,
};
use crate::session::SessionRegistry;
use crate::settings::{EditorSettings, EditorSettingsPatch};
use crate::state::{Message, MessageId};
use crate::stream::{Exchange, InFlight, StreamEvent, StreamEventKind};
use crate::voice::{SilentVoice, VoiceOutput};
use crate::workspace::{Tab, TabId, Workspace};

/// What applying a stream event did to its exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeStatus {
    Streaming,
    Completed,
    Failed(String),
    Cancelled,
    /// The event belongs to an exchange that is no longer tracked.
    Ignored,
}

pub struct Assistant {
    workspace: Workspace,
    sessions: SessionRegistry,
    provider: Option<Arc<dyn ChatProvider>>,
    parse_mode: ParseMode,
    voice: Box<dyn VoiceOutput>,
    error_banner: Option<String>,
    cancel_on_switch: bool,
}

impl Assistant {
    pub fn new(workspace: Workspace, provider: Option<Arc<dyn ChatProvider>>) -> Self {
        Self {
            workspace,
            sessions: SessionRegistry::new(),
            provider,
            parse_mode: ParseMode::default(),
            voice: Box::new(SilentVoice),
            error_banner: None,
            cancel_on_switch: false,
        }
    }

    pub fn with_voice(mut self, voice: Box<dyn VoiceOutput>) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = mode;
        self
    }

    /// Also cancel the outgoing tab's reply on a plain tab switch.
    pub fn with_cancel_on_switch(mut self, cancel: bool) -> Self {
        self.cancel_on_switch = cancel;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn active_tab(&self) -> &Tab {
        self.workspace.active()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.workspace.settings
    }

    pub fn parse_mode(&self) -> ParseMode {
        self.parse_mode
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    /// Swaps the provider. Every existing session belonged to the old one.
    pub fn set_provider(&mut self, provider: Option<Arc<dyn ChatProvider>>) {
        self.provider = provider;
        self.sessions.clear();
    }

    pub fn error_banner(&self) -> Option<&str> {
        self.error_banner.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error_banner = None;
    }

    pub fn is_responding(&self, tab: TabId) -> bool {
        self.workspace.tab(tab).is_some_and(Tab::is_responding)
    }

    // ---- sending ------------------------------------------------------

    /// Records the user's message and an empty placeholder in the active
    /// tab and returns the exchange to run. Refused without a provider,
    /// for blank text, or while the tab is still waiting on a reply.
    pub fn begin_send(&mut self, text: &str) -> Result<Exchange> {
        self.check_send(text).inspect_err(|err| {
            self.error_banner = Some(err.to_string());
        })?;
        let provider = self.provider.clone().ok_or(LexiError::ProviderUnavailable)?;

        let tab_id = self.workspace.active_id();
        let tab = self.workspace.active_mut();
        let snapshot = tab.document.content().to_string();
        tab.push_message(Message::user(text));
        let placeholder = Message::placeholder();
        let message_id = placeholder.id().clone();
        tab.push_message(placeholder);

        let in_flight = InFlight::new(message_id.clone(), text, &snapshot);
        let token = in_flight.token.clone();
        tab.in_flight = Some(in_flight);
        self.error_banner = None;

        let session = self
            .sessions
            .get_or_start(tab_id, provider.as_ref(), ASSISTANT_SYSTEM_INSTRUCTION);
        info!(tab = %tab_id, message = %message_id, turns = session.turn_count(), "sending message");

        Ok(Exchange::new(
            tab_id,
            message_id,
            session,
            compose_prompt(&snapshot, text),
            token,
        ))
    }

    fn check_send(&self, text: &str) -> Result<()> {
        if self.provider.is_none() {
            return Err(LexiError::ProviderUnavailable);
        }
        if text.trim().is_empty() {
            return Err(LexiError::EmptyMessage);
        }
        let active = self.workspace.active();
        if active.is_responding() {
            return Err(LexiError::SendInProgress(active.id()));
        }
        Ok(())
    }

    /// Sends a message and drives the reply to completion in place.
    /// Returns the id of the assistant message; a failed stream is
    /// returned as `LexiError::Stream` after the message is updated.
    pub async fn send_message(&mut self, text: &str) -> Result<MessageId> {
        let exchange = self.begin_send(text)?;
        let message_id = exchange.message_id().clone();
        let mut events = exchange.into_events();
        while let Some(event) = events.next().await {
            match self.apply_event(event) {
                ExchangeStatus::Failed(error) => return Err(LexiError::Stream(error)),
                ExchangeStatus::Completed | ExchangeStatus::Cancelled => break,
                ExchangeStatus::Streaming | ExchangeStatus::Ignored => {}
            }
        }
        Ok(message_id)
    }

    /// Folds one stream event into the owning tab, which need not be the
    /// active one.
    pub fn apply_event(&mut self, event: StreamEvent) -> ExchangeStatus {
        let Some(tab) = self.workspace.tab_mut(event.tab_id) else {
            debug!(tab = %event.tab_id, "event for closed tab dropped");
            return ExchangeStatus::Ignored;
        };
        let tracked = tab
            .in_flight
            .as_ref()
            .is_some_and(|f| f.message_id == event.message_id && !f.token.is_cancelled());
        if !tracked {
            return ExchangeStatus::Ignored;
        }

        match event.kind {
            StreamEventKind::Delta(delta) => {
                let live = match tab.in_flight.as_mut() {
                    Some(flight) => flight.accumulator.push(&delta).to_string(),
                    None => return ExchangeStatus::Ignored,
                };
                debug!(tab = %event.tab_id, len = delta.len(), total = live.len(), "reply chunk");
                match tab.message_mut(&event.message_id) {
                    Some(message) => message.set_live_text(&live),
                    None => warn!(tab = %event.tab_id, message = %event.message_id, "chunk for missing message"),
                }
                ExchangeStatus::Streaming
            }
            StreamEventKind::Completed => {
                let Some(flight) = tab.in_flight.take() else {
                    return ExchangeStatus::Ignored;
                };
                let parsed = flight.accumulator.finish(self.parse_mode);
                debug!(
                    tab = %event.tab_id,
                    display_len = parsed.display_text.len(),
                    command = parsed.action_command.is_some(),
                    metadata = parsed.metadata_text.is_some(),
                    "parsed reply"
                );
                let shown = if !parsed.display_text.is_empty() {
                    parsed.display_text.clone()
                } else if parsed.action_command.is_some() {
                    PENDING_EDIT_FALLBACK.to_string()
                } else {
                    EMPTY_RESPONSE_FALLBACK.to_string()
                };
                let kind = parsed.action_command.as_ref().map(|c| c.kind);

                if let Some(message) = tab.message_mut(&flight.message_id) {
                    message.finalize(shown, parsed.action_command, parsed.metadata_text);
                }
                tab.history_mut().append(HistoryRecord::new(
                    flight.user_message,
                    flight.snapshot,
                    flight.accumulator.text(),
                    kind,
                ));
                info!(
                    tab = %event.tab_id,
                    chunks = flight.accumulator.chunks(),
                    action = kind.map_or("none", |k| k.as_str()),
                    "reply complete"
                );

                if self.workspace.settings.assistant_voice_enabled && !parsed.display_text.trim().is_empty() {
                    self.voice.speak(&parsed.display_text);
                }
                ExchangeStatus::Completed
            }
            StreamEventKind::Failed(error) => {
                tab.in_flight = None;
                let text = error_reply(&error);
                if let Some(message) = tab.message_mut(&event.message_id) {
                    message.fail(text.clone());
                }
                warn!(tab = %event.tab_id, %error, "reply failed");
                self.error_banner = Some(text);
                ExchangeStatus::Failed(error)
            }
            StreamEventKind::Cancelled => {
                interrupt(tab);
                ExchangeStatus::Cancelled
            }
        }
    }

    // ---- edit proposals -----------------------------------------------

    /// Applies a pending proposal from the active tab.
    pub fn apply_action(&mut self, message_id: &MessageId) -> ActionOutcome {
        lifecycle::apply_action(self.workspace.active_mut(), message_id)
    }

    /// Rejects a pending proposal from the active tab.
    pub fn reject_action(&mut self, message_id: &MessageId) -> ActionOutcome {
        lifecycle::reject_action(self.workspace.active_mut(), message_id)
    }

    // ---- context changes ----------------------------------------------

    fn reset_sessions(&mut self, previous: TabId) {
        self.sessions.reset(previous);
        self.sessions.reset(self.workspace.active_id());
    }

    pub fn new_tab(&mut self, title: &str, content: &str) -> TabId {
        let previous = self.workspace.active_id();
        if self.cancel_on_switch {
            self.cancel_exchange(previous);
        }
        let id = self.workspace.new_tab(title, content);
        self.reset_sessions(previous);
        info!(tab = %id, "opened tab");
        id
    }

    pub fn activate_tab(&mut self, id: TabId) -> Result<()> {
        if id == self.workspace.active_id() {
            return Ok(());
        }
        let previous = self.workspace.activate_tab(id)?;
        if self.cancel_on_switch {
            self.cancel_exchange(previous);
        }
        self.reset_sessions(previous);
        Ok(())
    }

    pub fn close_tab(&mut self, id: TabId) -> Result<()> {
        let previous = self.workspace.active_id();
        let closed = self.workspace.close_tab(id)?;
        if let Some(flight) = closed.in_flight {
            flight.token.cancel();
        }
        self.sessions.reset(id);
        self.reset_sessions(previous);
        info!(tab = %id, "closed tab");
        Ok(())
    }

    pub fn rename_tab(&mut self, id: TabId, title: &str) -> Result<()> {
        self.workspace.rename_tab(id, title)
    }

    /// A user edit to the active document. Not a context change.
    pub fn set_active_content(&mut self, content: &str) {
        self.workspace.set_active_content(content);
    }

    pub fn clear_document(&mut self) {
        let id = self.workspace.active_id();
        self.cancel_exchange(id);
        self.workspace.clear_document();
        self.sessions.reset(id);
    }

    /// Stops the reply streaming into `tab`, keeping whatever arrived.
    pub fn cancel_exchange(&mut self, tab: TabId) -> bool {
        match self.workspace.tab_mut(tab) {
            Some(tab) if tab.is_responding() => {
                interrupt(tab);
                true
            }
            _ => false,
        }
    }

    // ---- files and settings -------------------------------------------

    pub fn export_document(&self) -> DocumentFile {
        DocumentFile::export(self.workspace.active(), &self.workspace.settings)
    }

    /// Replaces the active tab's document, conversation and history with
    /// the file's and merges its settings.
    pub fn load_document(&mut self, file: DocumentFile) {
        let id = self.workspace.active_id();
        self.cancel_exchange(id);

        let tab = self.workspace.active_mut();
        tab.document.set_content(file.active_tab_content);
        *tab.history_mut() = file.active_tab_ai_history.into();
        let messages = if file.active_tab_assistant_messages.is_empty() {
            vec![Message::assistant("lexi-intro-load", FILE_LOADED_GREETING)]
        } else {
            file.active_tab_assistant_messages
        };
        *tab.messages_mut() = messages;

        let current = EditorSettingsPatch::from(&self.workspace.settings);
        let mut settings = EditorSettings::default();
        settings.merge(&current);
        settings.merge(&file.editor_settings);
        self.workspace.settings = settings;

        self.sessions.reset(id);
        self.error_banner = None;
        info!(tab = %id, version = %file.version, "loaded document file");
    }

    /// Reads and loads a file. A malformed file leaves everything as it
    /// was and raises the error banner.
    pub fn load_document_from(&mut self, path: &std::path::Path) -> Result<()> {
        match DocumentFile::read_from(path) {
            Ok(file) => {
                self.load_document(file);
                Ok(())
            }
            Err(err) => {
                self.error_banner = Some(match &err {
                    LexiError::InvalidDocumentFile(_) => "Invalid .aitxt file format.".to_string(),
                    other => format!("Failed to load file: {}", other),
                });
                Err(err)
            }
        }
    }

    pub fn toggle_voice(&mut self) -> bool {
        let enabled = self.workspace.settings.toggle_voice();
        if !enabled {
            self.voice.cancel();
        }
        enabled
    }

    pub fn toggle_music(&mut self) -> bool {
        self.workspace.settings.toggle_music()
    }

    pub fn toggle_assistant_panel(&mut self) -> bool {
        self.workspace.settings.toggle_assistant_panel()
    }

    pub fn update_settings(&mut self, patch: &EditorSettingsPatch) {
        self.workspace.settings.merge(patch);
    }
}

/// Ends a tab's exchange early. The placeholder keeps the text received
/// so far and no history is written.
fn interrupt(tab: &mut Tab) {
    let Some(flight) = tab.in_flight.take() else {
        return;
    };
    flight.token.cancel();
    let partial = flight.accumulator.text();
    let text = if partial.is_empty() {
        INTERRUPTED_FALLBACK.to_string()
    } else {
        partial.to_string()
    };
    if let Some(message) = tab.message_mut(&flight.message_id) {
        message.finalize(text, None, None);
    }
    debug!(tab = %tab.id(), chunks = flight.accumulator.chunks(), "reply interrupted");
}
