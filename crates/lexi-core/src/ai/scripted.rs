//! In-process provider that replays canned replies. Used for offline mode
//! and throughout the tests.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{record_on_completion, ChatProvider, ChatSession, DeltaStream, SessionHistory};
use crate::error::{LexiError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Chunk(String),
    /// Ends the reply with a stream error.
    Fail(String),
}

#[derive(Debug, Clone)]
enum Script {
    Steps(Vec<ScriptStep>),
    /// The send itself fails before any chunk.
    Refuse(String),
}

#[derive(Default)]
struct Shared {
    queue: Mutex<VecDeque<Script>>,
    fallback: Vec<String>,
    sessions_started: Mutex<usize>,
    prompts: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct ScriptedProvider {
    shared: Arc<Shared>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply used once the queue runs dry.
    pub fn with_fallback<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shared: Arc::new(Shared {
                fallback: chunks.into_iter().map(Into::into).collect(),
                ..Shared::default()
            }),
        }
    }

    /// Queues a reply streamed as the given chunks.
    pub fn push_reply<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = chunks
            .into_iter()
            .map(|c| ScriptStep::Chunk(c.into()))
            .collect();
        self.push_steps(steps);
    }

    pub fn push_steps(&self, steps: Vec<ScriptStep>) {
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.push_back(Script::Steps(steps));
        }
    }

    /// Queues a send that fails before streaming anything.
    pub fn push_refusal(&self, message: &str) {
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.push_back(Script::Refuse(message.to_string()));
        }
    }

    pub fn sessions_started(&self) -> usize {
        self.shared.sessions_started.lock().map(|n| *n).unwrap_or_default()
    }

    /// Every prompt sent through any session, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.shared.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_script(&self) -> Script {
        let queued = self.shared.queue.lock().ok().and_then(|mut q| q.pop_front());
        queued.unwrap_or_else(|| {
            Script::Steps(
                self.shared
                    .fallback
                    .iter()
                    .cloned()
                    .map(ScriptStep::Chunk)
                    .collect(),
            )
        })
    }
}

impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Offline"
    }

    fn start_session(&self, _system_instruction: &str) -> Arc<dyn ChatSession> {
        if let Ok(mut n) = self.shared.sessions_started.lock() {
            *n += 1;
        }
        Arc::new(ScriptedSession {
            provider: self.clone(),
            history: SessionHistory::default(),
        })
    }
}

struct ScriptedSession {
    provider: ScriptedProvider,
    history: SessionHistory,
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn send_stream(&self, prompt: &str) -> Result<DeltaStream> {
        if let Ok(mut prompts) = self.provider.shared.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let steps = match self.provider.next_script() {
            Script::Refuse(message) => return Err(LexiError::Stream(message)),
            Script::Steps(steps) => steps,
        };

        let deltas = stream::iter(steps.into_iter().map(|step| match step {
            ScriptStep::Chunk(text) => Ok(text),
            ScriptStep::Fail(message) => Err(LexiError::Stream(message)),
        }));

        Ok(record_on_completion(deltas, self.history.clone(), prompt.to_string()).boxed())
    }

    fn turn_count(&self) -> usize {
        self.history.len()
    }
}
