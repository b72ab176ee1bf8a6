//! Terminal front end for the Xiaoyue tutor.
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging (to stderr, so stdout stays the transcript).
//! 3. Spawning the session with the WebSocket connector and command-line player.
//! 4. Rendering store changes and turning stdin lines into session actions.

use anyhow::Context;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use xiaoyue_client::{
    config::Config,
    playback::CommandPlayer,
    ws::{Session, SessionHandle, WsConnector},
};
use xiaoyue_core::{Message, MessageRole, SessionStore};

const HELP: &str = "\
Commands:
  <text>          chat with Xiaoyue
  /reset          start the conversation over
  /state          ask the server for the stored state
  /sulk N         set the sulking level (0-3)
  /volume X       set the playback volume (0.0-1.0)
  /unlock         allow voice lines to play
  /role NAME      change how Xiaoyue addresses you
  /char NAME      open a character card
  /close          close the character card
  /reconnect      reconnect after the link gave up
  /quit           exit";

/// What a single stdin line asks for.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Chat(&'a str),
    Reset,
    State,
    Sulk(u8),
    Volume(f32),
    Unlock,
    Role(&'a str),
    Character(&'a str),
    Close,
    Reconnect,
    Quit,
    Help,
    Invalid(String),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Chat(line);
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("reset", _) => Input::Reset,
        ("state", _) => Input::State,
        ("unlock", _) => Input::Unlock,
        ("close", _) => Input::Close,
        ("reconnect", _) => Input::Reconnect,
        ("quit" | "exit", _) => Input::Quit,
        ("help", _) => Input::Help,
        ("sulk", arg) => arg
            .parse()
            .map(Input::Sulk)
            .unwrap_or_else(|_| Input::Invalid(format!("not a sulking level: {arg:?}"))),
        ("volume", arg) => arg
            .parse()
            .map(Input::Volume)
            .unwrap_or_else(|_| Input::Invalid(format!("not a volume: {arg:?}"))),
        ("role", "") | ("char", "") => Input::Invalid(format!("/{name} needs an argument")),
        ("role", arg) => Input::Role(arg),
        ("char", arg) => Input::Character(arg),
        (other, _) => Input::Invalid(format!("unknown command /{other}")),
    }
}

/// Applies one line. Returns `false` when the user asked to quit.
fn handle_line(session: &SessionHandle, line: &str) -> bool {
    match parse_input(line) {
        Input::Chat("") => {}
        Input::Chat(text) => session.send_chat(text),
        Input::Reset => session.reset(),
        Input::State => session.query_state(),
        Input::Sulk(level) => session.set_sulking(level),
        Input::Volume(volume) => session.set_volume(volume),
        Input::Unlock => session.unlock_audio(),
        Input::Role(role) => session.set_user_role(role),
        Input::Character(name) => session.open_character(name),
        Input::Close => session.close_character(),
        Input::Reconnect => session.reconnect(),
        Input::Help => println!("{HELP}"),
        Input::Invalid(reason) => println!("! {reason} (try /help)"),
        Input::Quit => return false,
    }
    true
}

fn render_message(message: &Message) {
    match message.role {
        MessageRole::User => println!("[bạn] {}", message.content),
        MessageRole::System => println!("[!] {}", message.content),
        MessageRole::Assistant => {
            let mood = message.emotion.as_deref().unwrap_or("neutral");
            println!("[Tiểu Nguyệt · {mood}] {}", message.content);
            if let Some(chinese) = message.chinese_content.as_deref() {
                match message.pinyin.as_deref() {
                    Some(pinyin) => println!("    {chinese}  ({pinyin})"),
                    None => println!("    {chinese}"),
                }
            }
            if let Some(correction) = &message.correction_detail {
                if correction.is_correct == Some(false) {
                    println!(
                        "    ✗ {} {}",
                        correction.mistake_highlight.as_deref().unwrap_or_default(),
                        correction.explanation.as_deref().unwrap_or_default()
                    );
                }
            }
            for quiz in &message.quiz_list {
                println!("    ? [{}] {}", quiz.kind, quiz.question);
                for option in &quiz.options {
                    println!("      - {option}");
                }
            }
        }
    }
}

/// Prints whatever changed between two snapshots.
fn render_changes(previous: &SessionStore, current: &SessionStore) {
    if current.is_connected() != previous.is_connected() {
        println!(
            "-- {} --",
            if current.is_connected() { "đã kết nối" } else { "mất kết nối" }
        );
    }

    let (old, new) = (previous.messages(), current.messages());
    let restarted = new.len() < old.len()
        || (!old.is_empty() && new.first().map(|m| m.id) != old.first().map(|m| m.id));
    if restarted {
        println!("-- cuộc trò chuyện mới --");
        new.iter().for_each(render_message);
    } else {
        new[old.len()..].iter().for_each(render_message);
    }

    if current.is_typing() && !previous.is_typing() {
        println!("   Tiểu Nguyệt đang gõ...");
    }
    if current.agent_state() != previous.agent_state() {
        let state = current.agent_state();
        println!(
            "   ({}, {})",
            state.emotion.display_name(),
            state.sulking_level.description()
        );
    }
    if current.character_modal_open() && !previous.character_modal_open() {
        println!(
            "-- nhân vật: {} --",
            current.selected_character().unwrap_or_default()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Spawn Session ---
    let player = CommandPlayer::new(&config.player_command)
        .context("XIAOYUE_AUDIO_PLAYER must name a program")?;
    let session = Session::spawn(&config, Arc::new(WsConnector), Arc::new(player));
    info!(
        user_id = session.user_id(),
        server = %config.server_url,
        "Session configured. Type /help for commands."
    );

    // --- 4. Render & Read Input ---
    let mut store_rx = session.store();
    let mut shown = store_rx.borrow_and_update().clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = store_rx.changed() => {
                if changed.is_err() {
                    warn!("Session ended unexpectedly");
                    break;
                }
                let current = store_rx.borrow_and_update().clone();
                render_changes(&shown, &current);
                shown = current;
            }
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => {
                    if !handle_line(&session, &line) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal. Shutting down...");
                break;
            }
        }
    }

    session.shutdown().await;
    info!("Session has shut down.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text_is_chat() {
        assert_eq!(parse_input("  你好  "), Input::Chat("你好"));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_input("/reset"), Input::Reset);
        assert_eq!(parse_input("/sulk 2"), Input::Sulk(2));
        assert_eq!(parse_input("/volume 0.25"), Input::Volume(0.25));
        assert_eq!(parse_input("/role Sư đệ"), Input::Role("Sư đệ"));
        assert_eq!(parse_input("/char xiaoyue"), Input::Character("xiaoyue"));
        assert_eq!(parse_input("/quit"), Input::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(matches!(parse_input("/sulk many"), Input::Invalid(_)));
        assert!(matches!(parse_input("/role"), Input::Invalid(_)));
        assert!(matches!(parse_input("/dance"), Input::Invalid(_)));
    }
}
