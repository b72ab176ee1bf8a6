//! The session runtime: one task that owns the store and serializes every event.
//!
//! User actions, server frames, connectivity changes, playback completions and
//! the volume timer all funnel into a single `tokio::select!` loop. Each event
//! is applied to the [`SessionStore`] to completion before the next is taken,
//! and readers observe the store through a `watch` channel.

use super::{
    connection::{ConnectionManager, ConnectionState, Connector, ReconnectPolicy},
    dispatcher::OutboundDispatcher,
    router::FrameRouter,
};
use crate::{
    config::Config,
    playback::{AudioPlayer, PlaybackFinished, PlaybackScheduler},
};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info, warn};
use xiaoyue_core::{SessionStore, protocol::InboundFrame};

const SESSION_ID_PREFIX: &str = "user_";
const SESSION_ID_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A fresh client identity: `user_` followed by nine base-36 characters.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SESSION_ID_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{SESSION_ID_PREFIX}{suffix}")
}

/// The chat endpoint for `user_id` under the server's base URL.
pub fn chat_endpoint(base_url: &str, user_id: &str) -> String {
    format!("{}/ws/chat/{}/", base_url.trim_end_matches('/'), user_id)
}

/// Requests from the front end to the session task.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    SendChat(String),
    Reset,
    QueryState,
    SetSulking(u8),
    SetVolume(f32),
    UnlockAudio,
    SetUserRole(String),
    OpenCharacter(String),
    CloseCharacter,
    Reconnect,
    Shutdown,
}

/// Everything the session loop reacts to.
#[derive(Debug)]
enum SessionEvent {
    Action(UserAction),
    Frame(InboundFrame),
    Connectivity(ConnectionState),
    PlaybackFinished(PlaybackFinished),
    VolumeSettled(f32),
}

/// Cheap, clonable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    user_id: Arc<str>,
    actions_tx: mpsc::UnboundedSender<UserAction>,
    store_rx: watch::Receiver<SessionStore>,
    connection_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Latest store snapshot plus change notifications.
    pub fn store(&self) -> watch::Receiver<SessionStore> {
        self.store_rx.clone()
    }

    pub fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection_rx.clone()
    }

    pub fn send_chat(&self, text: impl Into<String>) {
        self.dispatch(UserAction::SendChat(text.into()));
    }

    pub fn reset(&self) {
        self.dispatch(UserAction::Reset);
    }

    pub fn query_state(&self) {
        self.dispatch(UserAction::QueryState);
    }

    pub fn set_sulking(&self, level: u8) {
        self.dispatch(UserAction::SetSulking(level));
    }

    pub fn set_volume(&self, volume: f32) {
        self.dispatch(UserAction::SetVolume(volume));
    }

    /// Marks audio as allowed; queued and future voice lines start playing.
    pub fn unlock_audio(&self) {
        self.dispatch(UserAction::UnlockAudio);
    }

    pub fn set_user_role(&self, role: impl Into<String>) {
        self.dispatch(UserAction::SetUserRole(role.into()));
    }

    pub fn open_character(&self, character: impl Into<String>) {
        self.dispatch(UserAction::OpenCharacter(character.into()));
    }

    pub fn close_character(&self) {
        self.dispatch(UserAction::CloseCharacter);
    }

    /// Restarts the link, e.g. after automatic retries gave up.
    pub fn reconnect(&self) {
        self.dispatch(UserAction::Reconnect);
    }

    /// Stops the session and waits until its task has exited.
    pub async fn shutdown(&self) {
        self.dispatch(UserAction::Shutdown);
        self.closed().await;
    }

    /// Resolves once the session task has exited.
    pub async fn closed(&self) {
        let mut store_rx = self.store_rx.clone();
        while store_rx.changed().await.is_ok() {}
    }

    pub fn is_closed(&self) -> bool {
        self.actions_tx.is_closed()
    }

    fn dispatch(&self, action: UserAction) {
        if let Err(e) = self.actions_tx.send(action) {
            debug!(action = ?e.0, "Session already stopped; dropping action");
        }
    }
}

/// State owned by the session task.
pub struct Session {
    connection: ConnectionManager,
    endpoint: String,
    router: FrameRouter,
    dispatcher: OutboundDispatcher,
    scheduler: PlaybackScheduler,
    store_tx: watch::Sender<SessionStore>,
    actions_rx: mpsc::UnboundedReceiver<UserAction>,
    frames_rx: mpsc::UnboundedReceiver<InboundFrame>,
    transitions_rx: mpsc::UnboundedReceiver<ConnectionState>,
    finished_rx: mpsc::UnboundedReceiver<PlaybackFinished>,
}

impl Session {
    /// Starts a session with a fresh identity and connects it.
    pub fn spawn(
        config: &Config,
        connector: Arc<dyn Connector>,
        player: Arc<dyn AudioPlayer>,
    ) -> SessionHandle {
        let user_id = generate_session_id();
        let mut store = SessionStore::new(user_id.as_str());
        store.set_user_role(config.user_role.as_str());
        store.set_audio_volume(config.initial_volume);

        let policy = ReconnectPolicy {
            interval: config.reconnect_interval,
            max_attempts: config.reconnect_attempts,
        };
        let mut connection = ConnectionManager::new(connector, policy);
        // A fresh manager always still holds both receivers.
        let frames_rx = connection
            .take_frames()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        let transitions_rx = connection
            .take_transitions()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        let connection_rx = connection.watch_state();

        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (store_tx, store_rx) = watch::channel(store);
        let (scheduler, finished_rx) = PlaybackScheduler::new(player);

        let handle = SessionHandle {
            user_id: Arc::from(user_id.as_str()),
            actions_tx,
            store_rx,
            connection_rx,
        };

        let session = Session {
            connection,
            endpoint: chat_endpoint(&config.server_url, &user_id),
            router: FrameRouter::new(),
            dispatcher: OutboundDispatcher::new(config.volume_debounce),
            scheduler,
            store_tx,
            actions_rx,
            frames_rx,
            transitions_rx,
            finished_rx,
        };
        let span = tracing::info_span!("session", %user_id);
        tokio::spawn(session.run().instrument(span));
        handle
    }

    async fn run(mut self) {
        info!(endpoint = %self.endpoint, "Session started");
        self.connection.connect(self.endpoint.clone());

        loop {
            let event = tokio::select! {
                action = self.actions_rx.recv() => match action {
                    Some(UserAction::Shutdown) | None => break,
                    Some(action) => SessionEvent::Action(action),
                },
                Some(frame) = self.frames_rx.recv() => SessionEvent::Frame(frame),
                Some(state) = self.transitions_rx.recv() => SessionEvent::Connectivity(state),
                Some(finished) = self.finished_rx.recv() => SessionEvent::PlaybackFinished(finished),
                volume = self.dispatcher.volume_settled() => SessionEvent::VolumeSettled(volume),
            };

            self.handle(event);
            self.scheduler.poll(&self.store_tx.borrow());
        }

        self.scheduler.stop();
        self.connection.disconnect();
        info!("Session stopped");
    }

    fn handle(&mut self, event: SessionEvent) {
        let Session {
            connection,
            router,
            dispatcher,
            scheduler,
            store_tx,
            ..
        } = self;

        store_tx.send_if_modified(|store| match event {
            SessionEvent::Action(action) => apply_action(action, connection, dispatcher, store),
            SessionEvent::Frame(frame) => router.route(&frame, store).mutated(),
            SessionEvent::Connectivity(state) => {
                let connected = state == ConnectionState::Open;
                if connected {
                    dispatcher.resync_volume(store);
                } else {
                    dispatcher.discard_volume();
                }
                if store.is_connected() == connected {
                    return false;
                }
                store.set_connected(connected);
                true
            }
            SessionEvent::PlaybackFinished(finished) => {
                scheduler.complete(store, finished);
                true
            }
            SessionEvent::VolumeSettled(volume) => {
                dispatcher.flush_volume(&*connection, volume);
                false
            }
        });
    }
}

/// Applies one user action. Returns whether the store changed.
fn apply_action(
    action: UserAction,
    connection: &mut ConnectionManager,
    dispatcher: &mut OutboundDispatcher,
    store: &mut SessionStore,
) -> bool {
    match action {
        UserAction::SendChat(text) => dispatcher.send_chat(&*connection, store, &text),
        UserAction::Reset => {
            dispatcher.reset(&*connection, store);
            true
        }
        UserAction::QueryState => {
            dispatcher.query_state(&*connection);
            false
        }
        UserAction::SetSulking(level) => {
            dispatcher.set_sulking(&*connection, level);
            false
        }
        UserAction::SetVolume(volume) => {
            let before = store.audio_volume();
            dispatcher.volume_changed(store, volume) != before
        }
        UserAction::UnlockAudio => {
            let was_unlocked = store.audio_unlocked();
            store.set_audio_unlocked(true);
            !was_unlocked
        }
        UserAction::SetUserRole(role) => {
            store.set_user_role(role);
            true
        }
        UserAction::OpenCharacter(character) => {
            store.open_character_modal(character);
            true
        }
        UserAction::CloseCharacter => {
            let was_open = store.character_modal_open();
            store.close_character_modal();
            was_open
        }
        UserAction::Reconnect => {
            if !connection.reconnect() {
                warn!("Reconnect requested before any connection was made");
            }
            false
        }
        // Handled by the loop before dispatch.
        UserAction::Shutdown => false,
    }
}
