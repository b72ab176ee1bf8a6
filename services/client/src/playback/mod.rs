//! Audio playback for agent voice lines.
//!
//! - `command`: the [`AudioPlayer`] that renders a payload through an external program.
//! - `scheduler`: drains the session's audio queue one payload at a time.

pub mod command;
pub mod scheduler;

use async_trait::async_trait;

pub use command::CommandPlayer;
pub use scheduler::{PlaybackFinished, PlaybackJob, PlaybackScheduler};

/// Failure of a single playback attempt. Never surfaced to the transcript.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio payload is empty")]
    Empty,
    #[error("audio payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("audio payload is not a recognised container")]
    UnsupportedFormat,
    #[error("audio I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("playback rejected: {0}")]
    Rejected(String),
}

/// Decodes one encoded payload and plays it to completion.
///
/// One call renders one payload. Callers must not overlap calls; the
/// [`PlaybackScheduler`] guarantees this for the session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Resolves once playback has finished. `volume` is in `[0, 1]`.
    async fn play(&self, payload: &str, volume: f32) -> Result<(), PlaybackError>;
}
