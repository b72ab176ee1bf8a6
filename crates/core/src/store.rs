//! Session Store
//!
//! The single mutable state container for one conversation session. It has no
//! knowledge of the network: the session runtime owns exactly one store and
//! applies every change through the named setters below, each of which is a
//! complete, synchronous update.

use crate::{
    agent::{AgentState, Emotion, SulkingLevel},
    message::Message,
};
use std::collections::VecDeque;

pub const DEFAULT_USER_ROLE: &str = "Sư huynh";
pub const DEFAULT_AUDIO_VOLUME: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStore {
    user_id: String,
    user_role: String,
    messages: Vec<Message>,
    agent_state: AgentState,
    is_connected: bool,
    is_typing: bool,
    audio_queue: VecDeque<String>,
    audio_unlocked: bool,
    audio_volume: f32,
    selected_character: Option<String>,
    character_modal_open: bool,
}

impl SessionStore {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_role: DEFAULT_USER_ROLE.to_string(),
            messages: Vec::new(),
            agent_state: AgentState::default(),
            is_connected: false,
            is_typing: false,
            audio_queue: VecDeque::new(),
            audio_unlocked: false,
            audio_volume: DEFAULT_AUDIO_VOLUME,
            selected_character: None,
            character_modal_open: false,
        }
    }

    // --- Identity ---

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn user_role(&self) -> &str {
        &self.user_role
    }

    pub fn set_user_role(&mut self, role: impl Into<String>) {
        self.user_role = role.into();
    }

    // --- Transcript ---

    /// The append-only transcript, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn add_message(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    // --- Agent state ---

    pub fn agent_state(&self) -> AgentState {
        self.agent_state
    }

    pub fn agent_emotion(&self) -> Emotion {
        self.agent_state.emotion
    }

    pub fn sulking_level(&self) -> SulkingLevel {
        self.agent_state.sulking_level
    }

    /// Applies raw wire values, defaulting to `neutral` and 0.
    pub fn set_agent_state(&mut self, emotion: Option<&str>, sulking_level: Option<i64>) {
        self.agent_state = AgentState::from_wire(emotion, sulking_level);
    }

    pub fn reset_agent_state(&mut self) {
        self.agent_state = AgentState::default();
    }

    // --- Connectivity & typing ---

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.is_connected = connected;
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    pub fn set_typing(&mut self, typing: bool) {
        self.is_typing = typing;
    }

    // --- Audio ---

    pub fn audio_queue(&self) -> &VecDeque<String> {
        &self.audio_queue
    }

    pub fn enqueue_audio(&mut self, payload: impl Into<String>) {
        self.audio_queue.push_back(payload.into());
    }

    /// The payload next in line for playback, left in place.
    pub fn audio_head(&self) -> Option<&str> {
        self.audio_queue.front().map(String::as_str)
    }

    pub fn dequeue_audio(&mut self) -> Option<String> {
        self.audio_queue.pop_front()
    }

    pub fn audio_unlocked(&self) -> bool {
        self.audio_unlocked
    }

    pub fn set_audio_unlocked(&mut self, unlocked: bool) {
        self.audio_unlocked = unlocked;
    }

    pub fn audio_volume(&self) -> f32 {
        self.audio_volume
    }

    /// Stores the volume clamped to `[0, 1]`; NaN is treated as silence.
    pub fn set_audio_volume(&mut self, volume: f32) -> f32 {
        self.audio_volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.audio_volume
    }

    // --- Character modal ---

    pub fn selected_character(&self) -> Option<&str> {
        self.selected_character.as_deref()
    }

    pub fn character_modal_open(&self) -> bool {
        self.character_modal_open
    }

    pub fn open_character_modal(&mut self, character: impl Into<String>) {
        self.selected_character = Some(character.into());
        self.character_modal_open = true;
    }

    pub fn close_character_modal(&mut self) {
        self.character_modal_open = false;
        self.selected_character = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageRole;

    #[test]
    fn test_new_store_defaults() {
        let store = SessionStore::new("user_abc123xyz");
        assert_eq!(store.user_id(), "user_abc123xyz");
        assert_eq!(store.user_role(), DEFAULT_USER_ROLE);
        assert!(store.messages().is_empty());
        assert_eq!(store.agent_state(), AgentState::default());
        assert!(!store.is_connected());
        assert!(!store.audio_unlocked());
        assert_eq!(store.audio_volume(), DEFAULT_AUDIO_VOLUME);
        assert!(store.selected_character().is_none());
    }

    #[test]
    fn test_transcript_is_append_ordered() {
        let mut store = SessionStore::new("u");
        store.add_message(Message::user("one"));
        store.add_message(Message::system("two"));
        store.add_message(Message::user("three"));

        let contents: Vec<_> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert_eq!(store.messages()[1].role, MessageRole::System);

        store.clear_messages();
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_agent_state_setters() {
        let mut store = SessionStore::new("u");
        store.set_agent_state(Some("sulking"), Some(3));
        assert_eq!(store.agent_emotion(), Emotion::Sulking);
        assert_eq!(store.sulking_level().value(), 3);

        store.set_agent_state(Some("happy"), None);
        assert_eq!(store.sulking_level().value(), 0);

        store.set_agent_state(Some("sulking"), Some(2));
        store.reset_agent_state();
        assert_eq!(store.agent_state(), AgentState::default());
    }

    #[test]
    fn test_audio_queue_is_fifo() {
        let mut store = SessionStore::new("u");
        store.enqueue_audio("a");
        store.enqueue_audio("b");
        assert_eq!(store.audio_head(), Some("a"));
        assert_eq!(store.dequeue_audio().as_deref(), Some("a"));
        assert_eq!(store.audio_head(), Some("b"));
        assert_eq!(store.dequeue_audio().as_deref(), Some("b"));
        assert_eq!(store.dequeue_audio(), None);
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut store = SessionStore::new("u");
        assert_eq!(store.set_audio_volume(1.5), 1.0);
        assert_eq!(store.set_audio_volume(-0.2), 0.0);
        assert_eq!(store.set_audio_volume(f32::NAN), 0.0);
        assert_eq!(store.set_audio_volume(0.25), 0.25);
    }

    #[test]
    fn test_character_modal() {
        let mut store = SessionStore::new("u");
        store.open_character_modal("好");
        assert_eq!(store.selected_character(), Some("好"));
        assert!(store.character_modal_open());

        store.close_character_modal();
        assert!(store.selected_character().is_none());
        assert!(!store.character_modal_open());
    }
}
