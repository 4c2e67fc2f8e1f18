use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ai::ollama::DEFAULT_OLLAMA_URL;
use crate::error::{LexiError, Result};
use crate::provider::Provider;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_url: Option<String>,
    /// External speech program, e.g. `espeak`. Voice output is silent without one.
    pub voice_command: Option<String>,
    #[serde(default)]
    pub cancel_streams_on_switch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            default_model: None,
            gemini_api_key: None,
            openai_api_key: None,
            ollama_url: None,
            voice_command: None,
            cancel_streams_on_switch: false,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| LexiError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Unknown provider names fall back to Gemini.
    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or_default()
    }

    pub fn model(&self) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| self.provider().default_model().to_string())
    }

    pub fn gemini_key(&self) -> Option<String> {
        env_key("GEMINI_API_KEY")
            .or_else(|| env_key("API_KEY"))
            .or_else(|| non_empty(self.gemini_api_key.as_deref()))
    }

    pub fn openai_key(&self) -> Option<String> {
        env_key("OPENAI_API_KEY").or_else(|| non_empty(self.openai_api_key.as_deref()))
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LexiError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("lexi").join("config.json"))
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| non_empty(Some(&v)))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
