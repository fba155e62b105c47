//! Local speech provider that runs a TTS engine as a subprocess.
//!
//! Each call writes the segment text to a scratch file, expands the
//! configured argument template and expects the engine to leave a WAV file
//! at `{output}`.  The scratch directory lives only for the duration of the
//! call.  [`SpeechProvider::release`] runs the optional release command so a
//! resident engine can drop accelerator memory between segments.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::audio::{wav, AudioChunk};
use crate::config::LocalConfig;
use crate::synthesis::provider::{ProviderError, ProviderKind, SpeechProvider, SynthesisRequest};

/// Longest stderr excerpt carried into an error message.
const STDERR_TAIL_CHARS: usize = 400;

pub struct CommandSpeechProvider {
    config: LocalConfig,
}

impl CommandSpeechProvider {
    pub fn from_config(config: &LocalConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn expand_args(&self, request: &SynthesisRequest, text_file: &Path, output: &Path) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{text_file}", &text_file.to_string_lossy())
                    .replace("{voice}", &request.reference.to_string_lossy())
                    .replace("{speed}", &format!("{:.2}", request.speed))
                    .replace("{tone}", request.tone.as_str())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<(), ProviderError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::Unavailable(format!("{program} not found")))
            }
            Ok(Err(e)) => return Err(ProviderError::Unavailable(format!("{program}: {e}"))),
            Err(_) => {
                return Err(ProviderError::Timeout {
                    secs: self.config.timeout_secs,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail: String = stderr
                .chars()
                .skip(stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS))
                .collect();
            return Err(ProviderError::Unavailable(format!(
                "{program} exited with {}: {tail}",
                output.status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechProvider for CommandSpeechProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioChunk, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::Unavailable("local provider disabled".into()));
        }

        let scratch = tempfile::Builder::new()
            .prefix("narrator-local-")
            .tempdir()
            .map_err(|e| ProviderError::Unavailable(format!("scratch dir: {e}")))?;
        let text_file = scratch.path().join("segment.txt");
        let output = scratch.path().join("segment.wav");
        tokio::fs::write(&text_file, &request.text)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("scratch write: {e}")))?;

        let args = self.expand_args(request, &text_file, &output);
        log::debug!(
            "synthesis: local {} for segment {} (voice={})",
            self.config.command,
            request.index,
            request.voice
        );
        self.run(&self.config.command, &args).await?;

        wav::read_chunk(&output, request.index)
            .map_err(|e| ProviderError::InvalidAudio(e.to_string()))
    }

    async fn release(&self) -> Result<(), ProviderError> {
        match self.config.release_command.as_deref() {
            Some([program, args @ ..]) => self.run(program, args).await,
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
