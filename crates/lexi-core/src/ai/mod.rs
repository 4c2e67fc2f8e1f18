//! AI provider sessions
//!
//! A [`ChatProvider`] hands out [`ChatSession`]s. A session carries the
//! fixed system instruction and its own turn history; every send returns a
//! stream of text deltas. Discarding the session handle is how the
//! conversation is reset.

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod scripted;

mod lines;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use scripted::{ScriptStep, ScriptedProvider};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::{LexiError, Result};
use crate::provider::Provider;

/// Ordered text deltas of one reply.
pub type DeltaStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Sends one user turn and streams the reply.
    async fn send_stream(&self, prompt: &str) -> Result<DeltaStream>;

    /// Completed turns recorded so far (user and model turns both count).
    fn turn_count(&self) -> usize;
}

pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    fn start_session(&self, system_instruction: &str) -> Arc<dyn ChatSession>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

/// Turn history shared between a session and the streams it hands out.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl SessionHistory {
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.turns.lock().map(|t| t.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a finished exchange. Failed exchanges are never recorded.
    pub fn record(&self, user: &str, reply: &str) {
        if let Ok(mut turns) = self.turns.lock() {
            turns.push(Turn {
                role: TurnRole::User,
                text: user.to_string(),
            });
            turns.push(Turn {
                role: TurnRole::Model,
                text: reply.to_string(),
            });
        }
    }
}

/// Wraps a delta stream so the exchange is recorded in `history` once the
/// stream ends cleanly. The stream stops after the first error.
pub(crate) fn record_on_completion<S>(deltas: S, history: SessionHistory, prompt: String) -> DeltaStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    struct State<S> {
        deltas: S,
        reply: String,
        history: SessionHistory,
        prompt: String,
        done: bool,
    }

    let state = State {
        deltas: Box::pin(deltas),
        reply: String::new(),
        history,
        prompt,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        match state.deltas.next().await {
            Some(Ok(delta)) => {
                state.reply.push_str(&delta);
                Some((Ok(delta), state))
            }
            Some(Err(err)) => {
                state.done = true;
                Some((Err(err), state))
            }
            None => {
                state.history.record(&state.prompt, &state.reply);
                None
            }
        }
    })
    .boxed()
}

/// Builds the provider named in `provider`, or `ProviderUnavailable` when
/// its API key is missing.
pub fn build_provider(provider: Provider, config: &Config, model: &str) -> Result<Arc<dyn ChatProvider>> {
    match provider {
        Provider::Gemini => {
            let key = config.gemini_key().ok_or(LexiError::ProviderUnavailable)?;
            Ok(Arc::new(GeminiClient::new(&key, model)))
        }
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(config.ollama_url(), model))),
        Provider::OpenAi => {
            let key = config.openai_key().ok_or(LexiError::ProviderUnavailable)?;
            Ok(Arc::new(OpenAiClient::new(&key, model)))
        }
    }
}

/// Decodes a provider error body of the shape `{"error": {"message": ...}}`
/// and falls back to the raw body.
pub(crate) fn http_error_message(provider: &str, status: reqwest::StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorWrapper {
        error: ErrorBody,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorBody {
        Detailed {
            message: Option<String>,
            status: Option<String>,
        },
        Plain(String),
    }

    let detail = match serde_json::from_str::<ErrorWrapper>(body) {
        Ok(ErrorWrapper {
            error: ErrorBody::Detailed { message, status },
        }) => {
            let msg = message.unwrap_or_else(|| body.to_string());
            match status {
                Some(s) if !s.is_empty() => format!("{}: {}", s, msg),
                _ => msg,
            }
        }
        Ok(ErrorWrapper {
            error: ErrorBody::Plain(msg),
        }) => msg,
        Err(_) => body.to_string(),
    };
    format!("{} API error {}: {}", provider, status, detail)
}
