//! Streaming a reply into its placeholder message
//!
//! An [`Exchange`] is one assistant turn in flight. It runs away from the
//! workspace (usually on a spawned task) and reports back through
//! [`StreamEvent`]s addressed to the owning tab and placeholder message, so
//! a reply keeps landing in the right tab no matter which tab is active
//! when it arrives. The owning tab keeps an [`InFlight`] record holding
//! the running buffer and the exchange's cancellation token.

use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ai::{ChatSession, DeltaStream};
use crate::grammar::{parse_response_with, ParseMode, ParsedResponse};
use crate::state::MessageId;
use crate::workspace::TabId;

/// Running buffer of one reply. Chunks are appended strictly in arrival
/// order; the buffer only grows until it is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamAccumulator {
    buffer: String,
    chunks: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delta and returns the live text to display.
    pub fn push(&mut self, delta: &str) -> &str {
        self.buffer.push_str(delta);
        self.chunks += 1;
        &self.buffer
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn finish(&self, mode: ParseMode) -> ParsedResponse {
        parse_response_with(&self.buffer, mode)
    }
}

/// Bookkeeping for the reply currently streaming into a tab.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub message_id: MessageId,
    pub user_message: String,
    /// Document content at send time, written to the history log.
    pub snapshot: String,
    pub accumulator: StreamAccumulator,
    pub token: CancellationToken,
}

impl InFlight {
    pub fn new(message_id: MessageId, user_message: &str, snapshot: &str) -> Self {
        Self {
            message_id,
            user_message: user_message.to_string(),
            snapshot: snapshot.to_string(),
            accumulator: StreamAccumulator::new(),
            token: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    Delta(String),
    Completed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub tab_id: TabId,
    pub message_id: MessageId,
    pub kind: StreamEventKind,
}

/// One assistant turn ready to be sent.
pub struct Exchange {
    tab_id: TabId,
    message_id: MessageId,
    session: Arc<dyn ChatSession>,
    prompt: String,
    token: CancellationToken,
}

enum Phase {
    Open(Exchange),
    Streaming(Exchange, DeltaStream),
    Done,
}

impl Exchange {
    pub(crate) fn new(
        tab_id: TabId,
        message_id: MessageId,
        session: Arc<dyn ChatSession>,
        prompt: String,
        token: CancellationToken,
    ) -> Self {
        Self {
            tab_id,
            message_id,
            session,
            prompt,
            token,
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    fn event(&self, kind: StreamEventKind) -> StreamEvent {
        StreamEvent {
            tab_id: self.tab_id,
            message_id: self.message_id.clone(),
            kind,
        }
    }

    /// Opens the provider stream and yields one event per delta, then a
    /// single terminal event. The token is checked before every delta.
    pub fn into_events(self) -> BoxStream<'static, StreamEvent> {
        stream::unfold(Phase::Open(self), |phase| async move {
            match phase {
                Phase::Done => None,
                Phase::Open(exchange) => {
                    if exchange.token.is_cancelled() {
                        let event = exchange.event(StreamEventKind::Cancelled);
                        return Some((event, Phase::Done));
                    }
                    let opened = tokio::select! {
                        biased;
                        _ = exchange.token.cancelled() => None,
                        opened = exchange.session.send_stream(&exchange.prompt) => Some(opened),
                    };
                    match opened {
                        None => Some((exchange.event(StreamEventKind::Cancelled), Phase::Done)),
                        Some(Ok(deltas)) => next_event(exchange, deltas).await,
                        Some(Err(err)) => {
                            warn!(tab = %exchange.tab_id, error = %err, "failed to open reply stream");
                            let event = exchange.event(StreamEventKind::Failed(err.to_string()));
                            Some((event, Phase::Done))
                        }
                    }
                }
                Phase::Streaming(exchange, deltas) => next_event(exchange, deltas).await,
            }
        })
        .boxed()
    }

    /// Forwards every event to `tx` until the stream ends or the receiver
    /// goes away.
    pub async fn run(self, tx: mpsc::UnboundedSender<StreamEvent>) {
        self.run_with(tx, std::convert::identity).await
    }

    /// Like [`Exchange::run`], wrapping each event into the receiver's own
    /// event type first.
    pub async fn run_with<E, F>(self, tx: mpsc::UnboundedSender<E>, wrap: F)
    where
        F: Fn(StreamEvent) -> E,
    {
        let mut events = self.into_events();
        while let Some(event) = events.next().await {
            if tx.send(wrap(event)).is_err() {
                debug!("event receiver dropped, abandoning reply");
                break;
            }
        }
    }
}

async fn next_event(exchange: Exchange, mut deltas: DeltaStream) -> Option<(StreamEvent, Phase)> {
    loop {
        let next = tokio::select! {
            biased;
            _ = exchange.token.cancelled() => {
                return Some((exchange.event(StreamEventKind::Cancelled), Phase::Done));
            }
            next = deltas.next() => next,
        };
        match next {
            Some(Ok(delta)) if delta.is_empty() => continue,
            Some(Ok(delta)) => {
                let event = exchange.event(StreamEventKind::Delta(delta));
                return Some((event, Phase::Streaming(exchange, deltas)));
            }
            Some(Err(err)) => {
                warn!(tab = %exchange.tab_id, error = %err, "reply stream failed");
                let event = exchange.event(StreamEventKind::Failed(err.to_string()));
                return Some((event, Phase::Done));
            }
            None => return Some((exchange.event(StreamEventKind::Completed), Phase::Done)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ChatProvider, ScriptStep, ScriptedProvider};
    use pretty_assertions::assert_eq;

    fn exchange(provider: &ScriptedProvider, token: CancellationToken) -> Exchange {
        Exchange::new(
            TabId::new(),
            MessageId::new("ai"),
            provider.start_session("sys"),
            "prompt".to_string(),
            token,
        )
    }

    fn kinds(events: Vec<StreamEvent>) -> Vec<StreamEventKind> {
        events.into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_accumulator_grows_in_order() {
        let mut acc = StreamAccumulator::new();
        let live: Vec<String> = ["Hel", "lo wor", "ld"]
            .iter()
            .map(|c| acc.push(c).to_string())
            .collect();
        assert_eq!(live, vec!["Hel", "Hello wor", "Hello world"]);
        assert_eq!(acc.chunks(), 3);
        assert_eq!(acc.finish(ParseMode::default()).display_text, "Hello world");
    }

    #[tokio::test]
    async fn test_events_follow_delivery_order() {
        let provider = ScriptedProvider::new();
        provider.push_reply(["a", "", "b"]);
        let events: Vec<_> = exchange(&provider, CancellationToken::new())
            .into_events()
            .collect()
            .await;
        assert_eq!(
            kinds(events),
            vec![
                StreamEventKind::Delta("a".into()),
                StreamEventKind::Delta("b".into()),
                StreamEventKind::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let provider = ScriptedProvider::new();
        provider.push_steps(vec![
            ScriptStep::Chunk("x".into()),
            ScriptStep::Fail("network down".into()),
            ScriptStep::Chunk("never".into()),
        ]);
        let events: Vec<_> = exchange(&provider, CancellationToken::new())
            .into_events()
            .collect()
            .await;
        assert_eq!(
            kinds(events),
            vec![
                StreamEventKind::Delta("x".into()),
                StreamEventKind::Failed("network down".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_open() {
        let provider = ScriptedProvider::new();
        provider.push_reply(["a"]);
        let token = CancellationToken::new();
        token.cancel();
        let events: Vec<_> = exchange(&provider, token).into_events().collect().await;
        assert_eq!(kinds(events), vec![StreamEventKind::Cancelled]);
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_stops_deltas() {
        let provider = ScriptedProvider::new();
        provider.push_reply(["a", "b", "c"]);
        let token = CancellationToken::new();
        let mut events = exchange(&provider, token.clone()).into_events();

        let first = events.next().await.unwrap();
        assert_eq!(first.kind, StreamEventKind::Delta("a".into()));
        token.cancel();
        assert_eq!(events.next().await.unwrap().kind, StreamEventKind::Cancelled);
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_run_forwards_to_channel() {
        let provider = ScriptedProvider::new();
        provider.push_reply(["hi"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        exchange(&provider, CancellationToken::new()).run(tx).await;
        assert_eq!(rx.recv().await.unwrap().kind, StreamEventKind::Delta("hi".into()));
        assert_eq!(rx.recv().await.unwrap().kind, StreamEventKind::Completed);
    }

    #[derive(Debug, PartialEq)]
    enum UiEvent {
        Reply(StreamEventKind),
    }

    #[tokio::test]
    async fn test_run_with_wraps_events() {
        let provider = ScriptedProvider::new();
        provider.push_reply(["x", "y"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        exchange(&provider, CancellationToken::new())
            .run_with(tx, |event| UiEvent::Reply(event.kind))
            .await;
        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                UiEvent::Reply(StreamEventKind::Delta("x".into())),
                UiEvent::Reply(StreamEventKind::Delta("y".into())),
                UiEvent::Reply(StreamEventKind::Completed),
            ]
        );
    }
}
