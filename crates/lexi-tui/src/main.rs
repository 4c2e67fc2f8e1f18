use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use lexi_core::{
    build_provider, voice_from_command, Assistant, ChatProvider, Config, Provider, ScriptedProvider,
    Workspace,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const OFFLINE_REPLY: &str =
    "I'm running offline right now, so I can't read your draft. Connect a provider to get real suggestions.";

#[derive(Parser)]
#[command(name = "lexi")]
#[command(about = "Terminal writing editor with Lexi, an AI assistant that proposes edits")]
#[command(version)]
struct Args {
    /// Provider to use (gemini, ollama, openai); defaults to the configured one
    #[arg(short, long)]
    provider: Option<String>,

    /// Model name for the provider
    #[arg(short, long)]
    model: Option<String>,

    /// Answer with a canned local reply instead of calling a provider
    #[arg(long)]
    offline: bool,

    /// .aitxt file to load into the first tab
    #[arg(short, long)]
    load: Option<PathBuf>,

    /// Workspace state file (defaults to the data directory)
    #[arg(long)]
    state: Option<PathBuf>,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lexi")
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).context("creating data directory")?;
    let log_file = File::create(dir.join("lexi.log")).context("creating log file")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lexi=info,lexi_core=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .try_init();
    Ok(())
}

fn select_provider(args: &Args, config: &Config) -> (Option<Arc<dyn ChatProvider>>, String) {
    if args.offline {
        let provider: Arc<dyn ChatProvider> = Arc::new(ScriptedProvider::with_fallback([OFFLINE_REPLY]));
        return (Some(provider), "offline".to_string());
    }

    let provider = match args.provider.as_deref() {
        Some(name) => Provider::from_str(name).unwrap_or_else(|| {
            warn!(provider = name, "unknown provider, using the configured one");
            config.provider()
        }),
        None => config.provider(),
    };
    let model = match &args.model {
        Some(model) => model.clone(),
        None if provider == config.provider() => config.model(),
        None => provider.default_model().to_string(),
    };

    match build_provider(provider, config, &model) {
        Ok(client) => (Some(client), model),
        Err(err) => {
            warn!(provider = provider.as_str(), error = %err, "provider unavailable");
            (None, model)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let data_dir = data_dir();
    init_logging(&data_dir)?;

    let config = Config::load()?;
    let (provider, model_label) = select_provider(&args, &config);
    info!(model = %model_label, "starting lexi");

    let state_path = args.state.clone().unwrap_or_else(|| data_dir.join("state.json"));
    let workspace = Workspace::load_state(&state_path);

    let mut assistant = Assistant::new(workspace, provider)
        .with_voice(voice_from_command(config.voice_command.as_deref()))
        .with_cancel_on_switch(config.cancel_streams_on_switch);
    if let Some(path) = &args.load {
        if let Err(err) = assistant.load_document_from(path) {
            warn!(path = %path.display(), error = %err, "could not load file");
        }
    }

    let save_dir = std::env::current_dir().unwrap_or_else(|_| data_dir.clone());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(assistant, model_label, save_dir, events.sender());
    app.scroll_chat_to_bottom();

    let result = run(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;

    if let Err(err) = app.assistant.workspace().save_state(&state_path) {
        warn!(error = %err, "could not save workspace state");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;
        if let Some(event) = events.next().await {
            handler::handle_event(app, event).await?;
        }
    }
    Ok(())
}
