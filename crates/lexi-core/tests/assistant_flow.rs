use std::sync::Arc;

use lexi_core::ai::ScriptStep;
use lexi_core::prompts::INTERRUPTED_FALLBACK;
use lexi_core::{
    ActionKind, ActionOutcome, ActionState, Assistant, ExchangeStatus, ParseMode, ScriptedProvider,
    StreamEventKind, Workspace,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

fn setup() -> (Assistant, ScriptedProvider) {
    let provider = ScriptedProvider::new();
    let assistant = Assistant::new(Workspace::default(), Some(Arc::new(provider.clone())));
    (assistant, provider)
}

#[tokio::test]
async fn test_live_text_grows_with_each_chunk() {
    use futures_util::StreamExt;

    let (mut assistant, provider) = setup();
    provider.push_reply(["Hel", "lo wor", "ld"]);

    let exchange = assistant.begin_send("greet me").unwrap();
    let id = exchange.message_id().clone();
    let mut events = exchange.into_events();

    let mut progression = Vec::new();
    while let Some(event) = events.next().await {
        let is_delta = matches!(event.kind, StreamEventKind::Delta(_));
        let status = assistant.apply_event(event);
        if is_delta {
            assert_eq!(status, ExchangeStatus::Streaming);
            progression.push(assistant.active_tab().message(&id).unwrap().text().to_string());
        } else {
            assert_eq!(status, ExchangeStatus::Completed);
        }
    }

    assert_eq!(progression, vec!["Hel", "Hello wor", "Hello world"]);
    let message = assistant.active_tab().message(&id).unwrap();
    assert_eq!(message.text(), "Hello world");
    assert_eq!(message.action_state(), ActionState::None);
    assert_eq!(assistant.active_tab().history().len(), 1);
}

#[tokio::test]
async fn test_reply_lands_in_original_tab_after_switch() {
    let (mut assistant, provider) = setup();
    provider.push_reply(["Sure! ", "{regenerate:Brand new}"]);
    assistant.set_active_content("first document");
    let original = assistant.workspace().active_id();

    let exchange = assistant.begin_send("rewrite it").unwrap();
    let id = exchange.message_id().clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(exchange.run(tx));

    let other = assistant.new_tab("Other", "second document");
    task.await.unwrap();
    while let Ok(event) = rx.try_recv() {
        assistant.apply_event(event);
    }

    let tab = assistant.workspace().tab(original).unwrap();
    let message = tab.message(&id).unwrap();
    assert_eq!(message.text(), "Sure!");
    assert_eq!(message.action_state(), ActionState::Pending);
    assert_eq!(tab.history().len(), 1);
    assert_eq!(tab.history().last().unwrap().editor_snapshot, "first document");
    assert!(!tab.is_responding());

    assert_eq!(assistant.workspace().active_id(), other);
    assert_eq!(assistant.active_tab().document.content(), "second document");
    assert!(assistant.active_tab().history().is_empty());

    // Proposals resolve against the active tab only.
    assert_eq!(assistant.apply_action(&id), ActionOutcome::Ignored);
    assistant.activate_tab(original).unwrap();
    assert_eq!(assistant.apply_action(&id), ActionOutcome::Applied(ActionKind::Regenerate));
    assert_eq!(assistant.active_tab().document.content(), "Brand new");
}

#[tokio::test]
async fn test_cancel_on_switch_keeps_partial_text() {
    let (assistant, provider) = setup();
    let mut assistant = assistant.with_cancel_on_switch(true);
    provider.push_reply(["never shown"]);
    let original = assistant.workspace().active_id();

    let exchange = assistant.begin_send("hi").unwrap();
    let id = exchange.message_id().clone();
    assistant.new_tab("Other", "");

    let (tx, mut rx) = mpsc::unbounded_channel();
    exchange.run(tx).await;
    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, StreamEventKind::Cancelled);
    assert_eq!(assistant.apply_event(event), ExchangeStatus::Ignored);

    let tab = assistant.workspace().tab(original).unwrap();
    assert_eq!(tab.message(&id).unwrap().text(), INTERRUPTED_FALLBACK);
    assert!(tab.history().is_empty());
    assert!(provider.prompts().is_empty());
}

#[tokio::test]
async fn test_clear_mid_stream_interrupts_reply() {
    use futures_util::StreamExt;

    let (mut assistant, provider) = setup();
    provider.push_reply(["Hel", "lo"]);
    assistant.set_active_content("draft");

    let exchange = assistant.begin_send("hi").unwrap();
    let id = exchange.message_id().clone();
    let mut events = exchange.into_events();
    let first = events.next().await.unwrap();
    assistant.apply_event(first);

    assistant.clear_document();
    let rest: Vec<_> = events.collect().await;
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].kind, StreamEventKind::Cancelled);

    let tab = assistant.active_tab();
    assert_eq!(tab.message(&id).unwrap().text(), "Hel");
    assert_eq!(tab.document.content(), "");
    assert!(tab.history().is_empty());
    assert!(!tab.is_responding());
}

#[tokio::test]
async fn test_events_for_closed_tab_are_dropped() {
    let (mut assistant, provider) = setup();
    provider.push_reply(["late"]);
    let doomed = assistant.workspace().active_id();
    let exchange = assistant.begin_send("hi").unwrap();
    let keeper = assistant.new_tab("Keeper", "keep me");

    assistant.close_tab(doomed).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    exchange.run(tx).await;
    while let Ok(event) = rx.try_recv() {
        assert_eq!(assistant.apply_event(event), ExchangeStatus::Ignored);
    }

    assert_eq!(assistant.workspace().tabs().len(), 1);
    assert_eq!(assistant.workspace().active_id(), keeper);
    assert_eq!(assistant.active_tab().document.content(), "keep me");
}

#[tokio::test]
async fn test_mid_stream_failure_writes_no_history() {
    let (mut assistant, provider) = setup();
    provider.push_steps(vec![
        ScriptStep::Chunk("Partial {append:".into()),
        ScriptStep::Fail("connection reset".into()),
    ]);

    let result = assistant.send_message("hi").await;
    assert!(result.is_err());

    let tab = assistant.active_tab();
    let last = tab.messages().last().unwrap();
    assert_eq!(last.text(), "Lexi had trouble responding: connection reset");
    assert_eq!(last.action_state(), ActionState::None);
    assert!(last.action_command().is_none());
    assert!(tab.history().is_empty());
    assert!(!tab.is_responding());

    // The session never recorded the failed turn.
    provider.push_reply(["again"]);
    assistant.send_message("retry").await.unwrap();
    assert_eq!(assistant.active_tab().history().len(), 1);
}

#[tokio::test]
async fn test_session_reused_within_tab() {
    let (mut assistant, provider) = setup();
    provider.push_reply(["one"]);
    provider.push_reply(["two"]);
    assistant.send_message("first").await.unwrap();
    assistant.send_message("second").await.unwrap();
    assert_eq!(provider.sessions_started(), 1);

    assistant.set_active_content("edited by hand");
    provider.push_reply(["three"]);
    assistant.send_message("third").await.unwrap();
    assert_eq!(provider.sessions_started(), 1);
}

#[tokio::test]
async fn test_balanced_mode_keeps_code_payload() {
    let (assistant, provider) = setup();
    let mut assistant = assistant.with_parse_mode(ParseMode::Balanced);
    provider.push_reply(["Try this. {regenerate:fn main() { println!(\"hi\"); }}"]);
    let id = assistant.send_message("code please").await.unwrap();

    assert_eq!(assistant.apply_action(&id), ActionOutcome::Applied(ActionKind::Regenerate));
    assert_eq!(
        assistant.active_tab().document.content(),
        "fn main() { println!(\"hi\"); }"
    );
}
