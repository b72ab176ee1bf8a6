use std::time::Duration;
use tracing::Level;
use xiaoyue_core::store::{DEFAULT_AUDIO_VOLUME, DEFAULT_USER_ROLE};

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8000";
pub const DEFAULT_PLAYER_COMMAND: &str =
    "ffplay -nodisp -autoexit -loglevel quiet -volume {volume} {file}";
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_VOLUME_DEBOUNCE_MS: u64 = 500;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base WebSocket URL of the tutor server, without a trailing slash.
    pub server_url: String,
    pub user_role: String,
    /// External player invocation, split on whitespace. `{file}` and `{volume}` are substituted.
    pub player_command: Vec<String>,
    pub reconnect_interval: Duration,
    pub reconnect_attempts: u32,
    pub volume_debounce: Duration,
    pub initial_volume: f32,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            user_role: DEFAULT_USER_ROLE.to_string(),
            player_command: split_command(DEFAULT_PLAYER_COMMAND),
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            volume_debounce: Duration::from_millis(DEFAULT_VOLUME_DEBOUNCE_MS),
            initial_volume: DEFAULT_AUDIO_VOLUME,
            log_level: Level::INFO,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let server_url = std::env::var("XIAOYUE_WS_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !(server_url.starts_with("ws://") || server_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(
                "XIAOYUE_WS_URL".to_string(),
                format!("'{}' must start with ws:// or wss://", server_url),
            ));
        }

        let user_role = std::env::var("XIAOYUE_USER_ROLE")
            .ok()
            .map(|role| role.trim().to_string())
            .filter(|role| !role.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ROLE.to_string());

        let player_command = split_command(
            &std::env::var("XIAOYUE_AUDIO_PLAYER")
                .unwrap_or_else(|_| DEFAULT_PLAYER_COMMAND.to_string()),
        );
        if player_command.is_empty() {
            return Err(ConfigError::InvalidValue(
                "XIAOYUE_AUDIO_PLAYER".to_string(),
                "player command must not be empty".to_string(),
            ));
        }

        let reconnect_interval = Duration::from_millis(parse_var(
            "XIAOYUE_RECONNECT_INTERVAL_MS",
            DEFAULT_RECONNECT_INTERVAL_MS,
        )?);
        let reconnect_attempts =
            parse_var("XIAOYUE_RECONNECT_ATTEMPTS", DEFAULT_RECONNECT_ATTEMPTS)?;
        let volume_debounce = Duration::from_millis(parse_var(
            "XIAOYUE_VOLUME_DEBOUNCE_MS",
            DEFAULT_VOLUME_DEBOUNCE_MS,
        )?);

        let initial_volume: f32 = parse_var("XIAOYUE_INITIAL_VOLUME", DEFAULT_AUDIO_VOLUME)?;
        if !(0.0..=1.0).contains(&initial_volume) {
            return Err(ConfigError::InvalidValue(
                "XIAOYUE_INITIAL_VOLUME".to_string(),
                format!("{} is outside 0.0..=1.0", initial_volume),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            server_url,
            user_role,
            player_command,
            reconnect_interval,
            reconnect_attempts,
            volume_debounce,
            initial_volume,
            log_level,
        })
    }
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
