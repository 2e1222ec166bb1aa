//! Startup configuration.
//!
//! Configuration is read once from the environment (optionally seeded from an
//! env file by `dotenvy`) and never reloaded.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use livechat::TwitchCredentials;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::notification::TelegramConfig;
use crate::watcher::SourceKey;

pub const ENV_USER_NICKNAME: &str = "USER_NICKNAME";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_TWITCH_CHANNELS: &str = "TWITCH_CHANNELS";
pub const ENV_YOUTUBE_CHANNELS: &str = "YOUTUBE_CHANNELS";
pub const ENV_TWITCH_OAUTH_TOKEN: &str = "TWITCH_OAUTH_TOKEN";
pub const ENV_TWITCH_LOGIN: &str = "TWITCH_LOGIN";
pub const ENV_RESTART_DELAY_SECS: &str = "RESTART_DELAY_SECS";
pub const ENV_SHUTDOWN_TIMEOUT_SECS: &str = "SHUTDOWN_TIMEOUT_SECS";
pub const ENV_SEND_SPACING_MS: &str = "SEND_SPACING_MS";
pub const ENV_LOG_DIR: &str = "LOG_DIR";

const DEFAULT_RESTART_DELAY_SECS: u64 = 5;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SEND_SPACING_MS: u64 = 100;

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Username whose mentions are forwarded.
    pub watched_username: String,
    /// Recipient and credentials for delivery.
    pub telegram: TelegramConfig,
    /// Watched sources, in configuration order, without duplicates.
    pub sources: Vec<SourceKey>,
    /// Optional static Twitch login; anonymous when `None`.
    pub twitch_credentials: Option<TwitchCredentials>,
    /// Flat delay before a failed monitor is recreated.
    pub restart_delay: Duration,
    /// Upper bound for stopping all monitors.
    pub shutdown_timeout: Duration,
    /// Minimum gap between two delivery attempts.
    pub send_spacing: Duration,
    /// Directory for rotated log files.
    pub log_dir: Option<PathBuf>,
}

/// Load `path` into the process environment.
///
/// Variables already set in the environment win. Returns `false` when the
/// file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Loaded env file");
            Ok(true)
        }
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::config(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

impl Config {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| Error::config(format!("{} is required", key)))
        };

        let watched_username = require(ENV_USER_NICKNAME)?;
        let telegram = TelegramConfig {
            bot_token: require(ENV_TELEGRAM_BOT_TOKEN)?,
            chat_id: require(ENV_TELEGRAM_CHAT_ID)?,
        };

        let mut sources = Vec::new();
        if let Some(raw) = get(ENV_TWITCH_CHANNELS) {
            for entry in split_list(&raw) {
                let channel = livechat::normalize_channel(entry).ok_or_else(|| {
                    Error::config(format!("invalid Twitch channel '{}'", entry))
                })?;
                sources.push(SourceKey::twitch(channel));
            }
        }
        if let Some(raw) = get(ENV_YOUTUBE_CHANNELS) {
            for entry in split_list(&raw) {
                if entry.chars().any(char::is_whitespace) {
                    return Err(Error::config(format!(
                        "invalid YouTube channel '{}'",
                        entry
                    )));
                }
                sources.push(SourceKey::youtube(entry));
            }
        }
        let sources = dedup_sources(sources);
        if sources.is_empty() {
            return Err(Error::config(format!(
                "no sources configured, set {} and/or {}",
                ENV_TWITCH_CHANNELS, ENV_YOUTUBE_CHANNELS
            )));
        }

        let twitch_credentials = match (get(ENV_TWITCH_LOGIN), get(ENV_TWITCH_OAUTH_TOKEN)) {
            (Some(login), Some(oauth_token)) => Some(TwitchCredentials { login, oauth_token }),
            (None, None) => None,
            _ => {
                return Err(Error::config(format!(
                    "{} and {} must be set together",
                    ENV_TWITCH_LOGIN, ENV_TWITCH_OAUTH_TOKEN
                )));
            }
        };

        let restart_delay = Duration::from_secs(parse_number(
            get(ENV_RESTART_DELAY_SECS),
            ENV_RESTART_DELAY_SECS,
            DEFAULT_RESTART_DELAY_SECS,
        )?);
        let shutdown_timeout = Duration::from_secs(parse_number(
            get(ENV_SHUTDOWN_TIMEOUT_SECS),
            ENV_SHUTDOWN_TIMEOUT_SECS,
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        )?);
        let send_spacing = Duration::from_millis(parse_number(
            get(ENV_SEND_SPACING_MS),
            ENV_SEND_SPACING_MS,
            DEFAULT_SEND_SPACING_MS,
        )?);

        Ok(Self {
            watched_username,
            telegram,
            sources,
            twitch_credentials,
            restart_delay,
            shutdown_timeout,
            send_spacing,
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from),
        })
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn dedup_sources(sources: Vec<SourceKey>) -> Vec<SourceKey> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| {
            let fresh = seen.insert(source.clone());
            if !fresh {
                warn!(source = %source, "Ignoring duplicate source");
            }
            fresh
        })
        .collect()
}

fn parse_number(value: Option<String>, key: &str, default: u64) -> Result<u64> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            Error::config(format!(
                "{} must be a non-negative integer, got '{}'",
                key, raw
            ))
        }),
    }
}
