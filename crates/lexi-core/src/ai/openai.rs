use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::lines::{body_lines, sse_data};
use super::{http_error_message, record_on_completion, ChatProvider, ChatSession, DeltaStream, SessionHistory, TurnRole};
use crate::error::{LexiError, Result};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

impl ChatProvider for OpenAiClient {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn start_session(&self, system_instruction: &str) -> Arc<dyn ChatSession> {
        Arc::new(OpenAiSession {
            client: self.clone(),
            system_instruction: system_instruction.to_string(),
            history: SessionHistory::default(),
        })
    }
}

struct OpenAiSession {
    client: OpenAiClient,
    system_instruction: String,
    history: SessionHistory,
}

impl OpenAiSession {
    fn build_request(&self, prompt: &str) -> OpenAIRequest {
        let mut messages = vec![OpenAIMessage {
            role: "system".to_string(),
            content: self.system_instruction.clone(),
        }];
        messages.extend(self.history.snapshot().into_iter().map(|turn| OpenAIMessage {
            role: match turn.role {
                TurnRole::User => "user",
                TurnRole::Model => "assistant",
            }
            .to_string(),
            content: turn.text,
        }));
        messages.push(OpenAIMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        OpenAIRequest {
            model: self.client.model.clone(),
            messages,
            stream: true,
        }
    }
}

#[async_trait]
impl ChatSession for OpenAiSession {
    async fn send_stream(&self, prompt: &str) -> Result<DeltaStream> {
        let request = self.build_request(prompt);

        let response = self
            .client
            .client
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.client.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LexiError::Stream(http_error_message("OpenAI", status, &text)));
        }

        // `[DONE]` ends the reply; anything after it is ignored.
        let deltas = body_lines(response)
            .take_while(|line| {
                let finished = matches!(line, Ok(l) if sse_data(l) == Some("[DONE]"));
                async move { !finished }
            })
            .filter_map(|line| async move {
                match line {
                    Ok(line) => parse_sse_line(&line).transpose(),
                    Err(err) => Some(Err(err)),
                }
            });

        Ok(record_on_completion(deltas, self.history.clone(), prompt.to_string()))
    }

    fn turn_count(&self) -> usize {
        self.history.len()
    }
}

fn parse_sse_line(line: &str) -> Result<Option<String>> {
    let Some(data) = sse_data(line) else {
        return Ok(None);
    };
    if data.is_empty() {
        return Ok(None);
    }
    let chunk: OpenAIChunk = serde_json::from_str(data)?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"id":"x","choices":[{"index":0,"delta":{"content":"Hey"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), Some("Hey".to_string()));

        let role_only = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only).unwrap(), None);
    }

    #[test]
    fn test_request_is_streaming() {
        let session = OpenAiSession {
            client: OpenAiClient::new("sk-test", DEFAULT_OPENAI_MODEL),
            system_instruction: "sys".into(),
            history: SessionHistory::default(),
        };
        let json = serde_json::to_value(session.build_request("hi")).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }
}
