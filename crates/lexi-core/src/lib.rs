pub mod ai;
pub mod assistant;
pub mod config;
pub mod error;
pub mod grammar;
pub mod history;
pub mod lifecycle;
pub mod persistence;
pub mod prompts;
pub mod provider;
pub mod session;
pub mod settings;
pub mod state;
pub mod stream;
pub mod voice;
pub mod workspace;

// Re-export main types for convenience
pub use ai::{build_provider, ChatProvider, ChatSession, GeminiClient, OllamaClient, OpenAiClient, ScriptedProvider};
pub use assistant::{Assistant, ExchangeStatus};
pub use config::Config;
pub use error::{LexiError, Result};
pub use grammar::{parse_response, parse_response_with, ParseMode, ParsedResponse};
pub use history::{HistoryLog, HistoryRecord};
pub use lifecycle::ActionOutcome;
pub use persistence::{suggested_file_name, DocumentFile};
pub use provider::Provider;
pub use settings::{EditorSettings, EditorSettingsPatch};
pub use state::{ActionCommand, ActionKind, ActionState, Message, MessageId, Sender};
pub use stream::{Exchange, StreamAccumulator, StreamEvent, StreamEventKind};
pub use voice::{voice_from_command, CommandVoice, SilentVoice, VoiceOutput};
pub use workspace::{Document, Tab, TabId, Workspace};
