//! Accepting or rejecting an edit proposal
//!
//! A message with a command starts `Pending`. Applying it mutates the
//! tab's document (`regenerate` replaces, `append` concatenates) and
//! moves it to `Applied`; rejecting moves it to `Rejected`. Both are
//! terminal, so repeated calls do nothing.

use tracing::{info, warn};

use crate::state::{ActionKind, ActionState, MessageId};
use crate::workspace::Tab;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied(ActionKind),
    Rejected,
    /// Unknown message, no command, or already resolved.
    Ignored,
}

pub fn apply_action(tab: &mut Tab, message_id: &MessageId) -> ActionOutcome {
    let tab_id = tab.id();
    let Some(message) = tab.message_mut(message_id) else {
        warn!(tab = %tab_id, message = %message_id, "apply ignored: unknown message");
        return ActionOutcome::Ignored;
    };
    let Some(command) = message.action_command().cloned() else {
        warn!(tab = %tab_id, message = %message_id, "apply ignored: no edit proposal");
        return ActionOutcome::Ignored;
    };
    if !message.resolve(ActionState::Applied) {
        warn!(tab = %tab_id, message = %message_id, "apply ignored: already resolved");
        return ActionOutcome::Ignored;
    }

    let updated = command.kind.apply_to(tab.document.content(), &command.payload);
    tab.document.set_content(updated);
    info!(tab = %tab.id(), kind = command.kind.as_str(), "applied edit");
    ActionOutcome::Applied(command.kind)
}

pub fn reject_action(tab: &mut Tab, message_id: &MessageId) -> ActionOutcome {
    let tab_id = tab.id();
    let rejected = tab
        .message_mut(message_id)
        .is_some_and(|message| message.resolve(ActionState::Rejected));
    if rejected {
        info!(tab = %tab_id, message = %message_id, "rejected edit");
        ActionOutcome::Rejected
    } else {
        warn!(tab = %tab_id, message = %message_id, "reject ignored");
        ActionOutcome::Ignored
    }
}
