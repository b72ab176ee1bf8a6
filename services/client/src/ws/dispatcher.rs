//! Turns user intents into outbound commands and local store edits.

use super::{
    connection::{ConnectionManager, ConnectionState},
    debounce::Debounce,
};
use std::time::Duration;
use tracing::{debug, info};
use xiaoyue_core::{Message, SessionStore, protocol::OutboundCommand};

/// Where the dispatcher sends commands. Implemented by [`ConnectionManager`].
pub trait CommandSink {
    fn link_state(&self) -> ConnectionState;
    /// Sends, or drops with a log if the link is not open.
    fn send(&self, command: &OutboundCommand);

    fn is_link_open(&self) -> bool {
        self.link_state() == ConnectionState::Open
    }
}

impl CommandSink for ConnectionManager {
    fn link_state(&self) -> ConnectionState {
        self.state()
    }

    fn send(&self, command: &OutboundCommand) {
        ConnectionManager::send(self, command)
    }
}

pub struct OutboundDispatcher {
    volume: Debounce<f32>,
}

impl OutboundDispatcher {
    pub fn new(volume_debounce: Duration) -> Self {
        Self {
            volume: Debounce::new(volume_debounce),
        }
    }

    /// Appends the user's line and sends it as typed. Returns `false` without
    /// touching anything when the text is blank or the link is down.
    pub fn send_chat(&self, link: &impl CommandSink, store: &mut SessionStore, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        if !link.is_link_open() {
            debug!("Not sending chat while disconnected");
            return false;
        }
        store.add_message(Message::user(text));
        link.send(&OutboundCommand::Chat {
            message: text.to_string(),
            user_role: store.user_role().to_string(),
        });
        true
    }

    /// Asks the server to forget the conversation and clears it locally
    /// straight away, connected or not.
    pub fn reset(&self, link: &impl CommandSink, store: &mut SessionStore) {
        link.send(&OutboundCommand::Reset {
            user_role: store.user_role().to_string(),
        });
        store.clear_messages();
        store.reset_agent_state();
        info!("Conversation reset");
    }

    pub fn query_state(&self, link: &impl CommandSink) {
        link.send(&OutboundCommand::GetState);
    }

    /// Passed through unclamped; the server owns the valid range.
    pub fn set_sulking(&self, link: &impl CommandSink, level: u8) {
        link.send(&OutboundCommand::SetSulking { level });
    }

    /// Stores the new volume and restarts the sync timer. Returns the stored,
    /// clamped value.
    pub fn volume_changed(&mut self, store: &mut SessionStore, volume: f32) -> f32 {
        let volume = store.set_audio_volume(volume);
        if self.volume.schedule(volume) {
            debug!(volume, "Superseded pending volume sync");
        }
        volume
    }

    /// Schedules a sync of the current volume, e.g. after the link reopens.
    pub fn resync_volume(&mut self, store: &SessionStore) {
        self.volume.schedule(store.audio_volume());
    }

    /// Drops a sync that has not gone out yet; the next open resyncs anyway.
    pub fn discard_volume(&mut self) {
        if let Some(volume) = self.volume.cancel() {
            debug!(volume, "Discarded pending volume sync; link is down");
        }
    }

    pub fn volume_pending(&self) -> bool {
        self.volume.is_pending()
    }

    /// Resolves with the volume once it has stopped changing. Cancel-safe.
    pub async fn volume_settled(&mut self) -> f32 {
        self.volume.settled().await
    }

    /// Sends a settled volume. Returns whether it went out; a closed link
    /// drops it.
    pub fn flush_volume(&self, link: &impl CommandSink, volume: f32) -> bool {
        if !link.is_link_open() {
            debug!(volume, "Dropping volume sync while disconnected");
            return false;
        }
        link.send(&OutboundCommand::SetVolume { volume });
        true
    }
}
