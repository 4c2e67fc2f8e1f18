use crate::ai::gemini::DEFAULT_GEMINI_MODEL;
use crate::ai::ollama::DEFAULT_OLLAMA_MODEL;
use crate::ai::openai::DEFAULT_OPENAI_MODEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Gemini,
    Ollama,
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Some(Provider::Gemini),
            "ollama" => Some(Provider::Ollama),
            "openai" | "chatgpt" => Some(Provider::OpenAi),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => DEFAULT_GEMINI_MODEL,
            Provider::Ollama => DEFAULT_OLLAMA_MODEL,
            Provider::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }
}
