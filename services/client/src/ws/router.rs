//! Classifies inbound frames and applies them to the session store.

use serde_json::Value;
use tracing::{debug, warn};
use xiaoyue_core::{
    Message, SessionStore,
    protocol::{FrameKind, InboundFrame, SuccessData},
};

const VOLUME_ACK_ACTION: &str = "volume_updated";
const ERROR_PREFIX: &str = "Lỗi";

/// What routing one frame did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Same dedup key as the previous frame; nothing changed.
    Duplicate,
    Typing,
    /// The server greeting. Informational only.
    Handshake,
    /// A success frame carrying no transcript entry: `volume_updated`, or no `data`.
    Acknowledged,
    AgentTurn { audio_enqueued: bool },
    ApplicationError,
    Ignored,
}

impl RouteOutcome {
    /// Whether the store may have changed and readers should be notified.
    pub fn mutated(&self) -> bool {
        !matches!(
            self,
            RouteOutcome::Duplicate | RouteOutcome::Handshake | RouteOutcome::Ignored
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DedupKey {
    Wire(Value),
    /// Stand-in for frames without a timestamp; never equal to another key.
    Local(u64),
}

/// Applies frames in arrival order, dropping immediate repeats.
///
/// Only the last key is remembered, so a repeat separated by any other frame
/// is processed again.
#[derive(Debug, Default)]
pub struct FrameRouter {
    last_key: Option<DedupKey>,
    local_seq: u64,
}

impl FrameRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, frame: &InboundFrame, store: &mut SessionStore) -> RouteOutcome {
        let key = self.dedup_key(frame);
        if self.last_key.as_ref() == Some(&key) {
            debug!(status = %frame.status, "Dropping duplicate frame");
            return RouteOutcome::Duplicate;
        }
        self.last_key = Some(key);

        match frame.kind() {
            FrameKind::Typing => {
                store.set_typing(true);
                RouteOutcome::Typing
            }
            FrameKind::Connected => {
                debug!(message = ?frame.message, "Server handshake");
                RouteOutcome::Handshake
            }
            FrameKind::Success => {
                store.set_typing(false);
                match &frame.data {
                    Some(data) => apply_success(data, store),
                    None => RouteOutcome::Acknowledged,
                }
            }
            FrameKind::Error => {
                store.set_typing(false);
                let detail = frame.message.as_deref().unwrap_or_default();
                warn!(message = detail, "Server reported an error");
                store.add_message(Message::system(format!("{ERROR_PREFIX}: {detail}")));
                RouteOutcome::ApplicationError
            }
            FrameKind::Unknown(status) => {
                debug!(status, "Ignoring frame with unknown status");
                RouteOutcome::Ignored
            }
        }
    }

    fn dedup_key(&mut self, frame: &InboundFrame) -> DedupKey {
        let wire = frame
            .data
            .as_ref()
            .and_then(|data| data.timestamp.as_ref())
            .or(frame.timestamp.as_ref())
            .filter(|ts| !ts.is_null());
        match wire {
            Some(ts) => DedupKey::Wire(ts.clone()),
            None => {
                self.local_seq += 1;
                DedupKey::Local(self.local_seq)
            }
        }
    }
}

fn apply_success(data: &SuccessData, store: &mut SessionStore) -> RouteOutcome {
    if let Some(emotion) = data.emotion_label() {
        store.set_agent_state(Some(emotion), data.sulking_level);
    }

    if data.action.as_deref() == Some(VOLUME_ACK_ACTION) {
        debug!(volume = ?data.volume, "Server acknowledged volume");
        return RouteOutcome::Acknowledged;
    }

    store.add_message(Message::assistant_from(data));
    let audio_enqueued = match data.audio() {
        Some(audio) if store.audio_unlocked() => {
            store.enqueue_audio(audio);
            true
        }
        _ => false,
    };
    RouteOutcome::AgentTurn { audio_enqueued }
}
