//! Plays audio payloads by handing a temporary file to an external player.

use super::{AudioPlayer, PlaybackError};
use crate::audio_utils;
use async_trait::async_trait;
use std::{io::Write, path::Path, process::Stdio};
use tokio::process::Command;
use tracing::debug;

const FILE_PLACEHOLDER: &str = "{file}";
const VOLUME_PLACEHOLDER: &str = "{volume}";

/// An [`AudioPlayer`] backed by a command line such as
/// `ffplay -nodisp -autoexit -volume {volume} {file}`.
///
/// `{volume}` is replaced by the 0–100 volume and `{file}` by the path of a
/// temporary file holding the decoded audio. If no argument mentions
/// `{file}`, the path is appended as the last argument.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Returns `None` for an empty command line.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn render_args(&self, file: &Path, volume: f32) -> Vec<String> {
        let file = file.to_string_lossy();
        let volume = audio_utils::volume_percent(volume).to_string();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace(FILE_PLACEHOLDER, &file)
                    .replace(VOLUME_PLACEHOLDER, &volume)
            })
            .collect();
        if !self.args.iter().any(|arg| arg.contains(FILE_PLACEHOLDER)) {
            args.push(file.into_owned());
        }
        args
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, payload: &str, volume: f32) -> Result<(), PlaybackError> {
        let bytes = audio_utils::decode_payload(payload)?;
        let format = audio_utils::sniff_format(&bytes)?;

        // Removed when dropped, on every return path below.
        let mut file = tempfile::Builder::new()
            .prefix("xiaoyue-")
            .suffix(format.extension())
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;

        let args = self.render_args(file.path(), volume);
        debug!(program = %self.program, ?format, bytes = bytes.len(), "Starting audio playback");

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(PlaybackError::Rejected(format!(
                "{} exited with {}",
                self.program, status
            )))
        }
    }
}
