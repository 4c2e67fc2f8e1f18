use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::lines::body_lines;
use super::{http_error_message, record_on_completion, ChatProvider, ChatSession, DeltaStream, SessionHistory, TurnRole};
use crate::error::{LexiError, Result};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "gemma3:latest";

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatChunk {
    message: Option<OllamaMessage>,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
    error: Option<String>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

impl ChatProvider for OllamaClient {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn start_session(&self, system_instruction: &str) -> Arc<dyn ChatSession> {
        Arc::new(OllamaSession {
            client: self.clone(),
            system_instruction: system_instruction.to_string(),
            history: SessionHistory::default(),
        })
    }
}

struct OllamaSession {
    client: OllamaClient,
    system_instruction: String,
    history: SessionHistory,
}

impl OllamaSession {
    fn build_request(&self, prompt: &str) -> OllamaChatRequest {
        let mut messages = vec![OllamaMessage {
            role: "system".to_string(),
            content: self.system_instruction.clone(),
        }];
        messages.extend(self.history.snapshot().into_iter().map(|turn| OllamaMessage {
            role: match turn.role {
                TurnRole::User => "user",
                TurnRole::Model => "assistant",
            }
            .to_string(),
            content: turn.text,
        }));
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        OllamaChatRequest {
            model: self.client.model.clone(),
            messages,
            stream: true,
        }
    }
}

#[async_trait]
impl ChatSession for OllamaSession {
    async fn send_stream(&self, prompt: &str) -> Result<DeltaStream> {
        let url = format!("{}/api/chat", self.client.base_url);
        let request = self.build_request(prompt);

        let response = self.client.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LexiError::Stream(format!(
                "{}. Make sure Ollama is running with: ollama serve",
                http_error_message("Ollama", status, &text)
            )));
        }

        let deltas = body_lines(response).filter_map(|line| async move {
            match line {
                Ok(line) => parse_chat_line(&line).transpose(),
                Err(err) => Some(Err(err)),
            }
        });

        Ok(record_on_completion(deltas, self.history.clone(), prompt.to_string()))
    }

    fn turn_count(&self) -> usize {
        self.history.len()
    }
}

fn parse_chat_line(line: &str) -> Result<Option<String>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let chunk: OllamaChatChunk = serde_json::from_str(line)?;
    if let Some(error) = chunk.error {
        return Err(LexiError::Stream(format!("Ollama error: {}", error)));
    }
    Ok(chunk
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_line() {
        let line = r#"{"model":"gemma3","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        assert_eq!(parse_chat_line(line).unwrap(), Some("Hi".to_string()));

        let last = r#"{"model":"gemma3","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_chat_line(last).unwrap(), None);
    }

    #[test]
    fn test_parse_chat_line_error() {
        let err = parse_chat_line(r#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_request_starts_with_system_message() {
        let session = OllamaSession {
            client: OllamaClient::new("http://localhost:11434/", DEFAULT_OLLAMA_MODEL),
            system_instruction: "sys".into(),
            history: SessionHistory::default(),
        };
        let request = session.build_request("hello");
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].content, "hello");
        assert!(request.stream);
        assert_eq!(session.client.base_url, "http://localhost:11434");
    }
}
