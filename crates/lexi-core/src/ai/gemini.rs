//! Gemini REST client using `streamGenerateContent` over SSE.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::lines::{body_lines, sse_data};
use super::{http_error_message, record_on_completion, ChatProvider, ChatSession, DeltaStream, SessionHistory, TurnRole};
use crate::error::{LexiError, Result};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Points the client at another endpoint serving the same API.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// The key travels in a header so it never shows up in a URL.
    fn stream_request(&self, body: &GenerateContentRequest) -> reqwest::RequestBuilder {
        let url = format!("{}/{}:streamGenerateContent?alt=sse", self.base_url, self.model);
        self.client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
    }
}

impl ChatProvider for GeminiClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn start_session(&self, system_instruction: &str) -> Arc<dyn ChatSession> {
        Arc::new(GeminiSession {
            client: self.clone(),
            system_instruction: system_instruction.to_string(),
            history: SessionHistory::default(),
        })
    }
}

struct GeminiSession {
    client: GeminiClient,
    system_instruction: String,
    history: SessionHistory,
}

impl GeminiSession {
    fn build_request(&self, prompt: &str) -> GenerateContentRequest {
        let mut contents: Vec<Content> = self
            .history
            .snapshot()
            .into_iter()
            .map(|turn| Content {
                role: Some(
                    match turn.role {
                        TurnRole::User => "user",
                        TurnRole::Model => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part { text: turn.text }],
            })
            .collect();
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        });

        GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: self.system_instruction.clone(),
                }],
            }),
        }
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send_stream(&self, prompt: &str) -> Result<DeltaStream> {
        let request = self.build_request(prompt);
        let response = self.client.stream_request(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LexiError::Stream(http_error_message("Gemini", status, &text)));
        }

        let deltas = body_lines(response).filter_map(|line| async move {
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

/// Text carried by one SSE line; `None` for keep-alives and empty chunks.
fn parse_sse_line(line: &str) -> Result<Option<String>> {
    let Some(data) = sse_data(line) else {
        return Ok(None);
    };
    if data.is_empty() {
        return Ok(None);
    }
    let chunk: GenerateContentResponse = serde_json::from_str(data)?;
    let text: String = chunk
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();
    debug!(len = text.len(), "gemini delta");
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line_extracts_text() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), Some("Hello".to_string()));
    }

    #[test]
    fn test_parse_sse_line_ignores_other_lines() {
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        assert_eq!(
            parse_sse_line(r#"data: {"candidates":[{"finishReason":"STOP"}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_sse_line_rejects_garbage() {
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn test_request_includes_history_and_instruction() {
        let client = GeminiClient::new("key", DEFAULT_GEMINI_MODEL);
        let session = GeminiSession {
            client,
            system_instruction: "be nice".into(),
            history: SessionHistory::default(),
        };
        session.history.record("first", "reply");
        let json = serde_json::to_value(session.build_request("second")).unwrap();
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be nice");
        assert!(json["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_api_key_sent_as_header_not_query() {
        let client = GeminiClient::new("SECRET-KEY-123", DEFAULT_GEMINI_MODEL);
        let session = GeminiSession {
            client: client.clone(),
            system_instruction: "sys".into(),
            history: SessionHistory::default(),
        };
        let request = client
            .stream_request(&session.build_request("hi"))
            .build()
            .unwrap();
        assert!(!request.url().as_str().contains("SECRET-KEY-123"));
        assert_eq!(request.url().query(), Some("alt=sse"));
        assert_eq!(request.headers()[API_KEY_HEADER], "SECRET-KEY-123");
    }

    #[tokio::test]
    async fn test_transport_error_does_not_reveal_key() {
        // Nothing listens on port 1, so the connection is refused.
        let client = GeminiClient::new("SECRET-KEY-123", "no-such-model")
            .with_base_url("http://127.0.0.1:1/v1beta/models");
        let session = client.start_session("sys");
        let err = match session.send_stream("hi").await {
            Ok(_) => panic!("expected a connection error"),
            Err(err) => err,
        };
        assert!(matches!(err, LexiError::Http(_)));
        let shown = crate::prompts::error_reply(&err.to_string());
        assert!(!shown.contains("SECRET-KEY-123"), "{shown}");
        assert!(!shown.contains("127.0.0.1:1"), "{shown}");
    }
}
