//! Spoken replies

use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Speaks finalized assistant replies.
pub trait VoiceOutput: Send {
    fn speak(&mut self, text: &str);

    /// Stops whatever is currently being spoken.
    fn cancel(&mut self);
}

#[derive(Debug, Default)]
pub struct SilentVoice;

impl VoiceOutput for SilentVoice {
    fn speak(&mut self, _text: &str) {}

    fn cancel(&mut self) {}
}

/// Runs an external speech program (e.g. `espeak`) with the text as its
/// last argument. Starting a new utterance stops the previous one.
///
/// Spawning needs a tokio runtime. Nothing here waits on the child: a
/// stopped process is killed and left for tokio to reap.
#[derive(Debug)]
pub struct CommandVoice {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandVoice {
    /// `command` is split on whitespace: the first word is the program.
    pub fn new(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
            child: None,
        })
    }
}

impl VoiceOutput for CommandVoice {
    fn speak(&mut self, text: &str) {
        self.cancel();
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => self.child = Some(child),
            Err(err) => warn!(program = %self.program, error = %err, "voice output failed"),
        }
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                debug!("stopping voice output");
                let _ = child.start_kill();
            }
        }
    }
}

impl Drop for CommandVoice {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The configured speech program, or silence when none is set.
pub fn voice_from_command(command: Option<&str>) -> Box<dyn VoiceOutput> {
    match command.and_then(CommandVoice::new) {
        Some(voice) => Box::new(voice),
        None => Box::new(SilentVoice),
    }
}
