//! Single-flight playback of the session's audio queue.

use super::{AudioPlayer, PlaybackError};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};
use xiaoyue_core::SessionStore;

/// One playback attempt: the queue head and the volume read when it started.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackJob {
    pub payload: String,
    pub volume: f32,
}

/// Completion report for the job currently in flight.
#[derive(Debug)]
pub struct PlaybackFinished {
    pub result: Result<(), PlaybackError>,
}

/// Drains the audio queue into an [`AudioPlayer`], one payload at a time.
///
/// A payload is started only when the queue is non-empty, audio has been
/// unlocked, and no other payload is in flight. The head stays in the queue
/// until its attempt completes, so it is never played twice and never skipped.
///
/// The in-flight attempt is aborted by [`PlaybackScheduler::stop`] or when the
/// scheduler is dropped.
pub struct PlaybackScheduler {
    player: Arc<dyn AudioPlayer>,
    in_flight: bool,
    task: Option<JoinHandle<()>>,
    finished_tx: mpsc::UnboundedSender<PlaybackFinished>,
}

impl PlaybackScheduler {
    pub fn new(player: Arc<dyn AudioPlayer>) -> (Self, mpsc::UnboundedReceiver<PlaybackFinished>) {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            player,
            in_flight: false,
            task: None,
            finished_tx,
        };
        (scheduler, finished_rx)
    }

    pub fn is_playing(&self) -> bool {
        self.in_flight
    }

    /// Claims the queue head if every start condition holds, raising the guard.
    pub fn next_job(&mut self, store: &SessionStore) -> Option<PlaybackJob> {
        if self.in_flight || !store.audio_unlocked() {
            return None;
        }
        let payload = store.audio_head()?.to_string();
        self.in_flight = true;
        Some(PlaybackJob {
            payload,
            volume: store.audio_volume(),
        })
    }

    /// Starts the next job on a background task. Returns whether one was started.
    ///
    /// The outcome is delivered on the receiver returned by [`PlaybackScheduler::new`]
    /// and must be handed back through [`PlaybackScheduler::complete`].
    pub fn poll(&mut self, store: &SessionStore) -> bool {
        let Some(job) = self.next_job(store) else {
            return false;
        };
        debug!(queued = store.audio_queue().len(), volume = job.volume, "Starting queued audio");
        let player = self.player.clone();
        let finished_tx = self.finished_tx.clone();
        self.task = Some(tokio::spawn(async move {
            let result = player.play(&job.payload, job.volume).await;
            let _ = finished_tx.send(PlaybackFinished { result });
        }));
        true
    }

    /// Aborts the attempt in flight, if any. The payload stays queued.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!("Aborting audio playback");
            }
            task.abort();
        }
        self.in_flight = false;
    }

    /// Retires the in-flight job: removes it from the queue and lowers the guard.
    ///
    /// This does not start the next job; the caller re-polls afterwards.
    pub fn complete(&mut self, store: &mut SessionStore, finished: PlaybackFinished) {
        if !self.in_flight {
            warn!("Ignoring playback completion with no job in flight");
            return;
        }
        if let Err(e) = finished.result {
            warn!(error = %e, "Audio playback failed; advancing queue");
        }
        store.dequeue_audio();
        self.in_flight = false;
        self.task = None;
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
