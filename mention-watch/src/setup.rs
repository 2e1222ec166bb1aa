//! Interactive first-run setup.
//!
//! Prompts for the required settings and writes them to the env file that
//! is loaded on every start.

use std::io::IsTerminal;
use std::path::Path;

use inquire::validator::Validation;
use inquire::{InquireError, Password, PasswordDisplayMode, Text};
use tracing::info;

use crate::config::{
    ENV_TELEGRAM_BOT_TOKEN, ENV_TELEGRAM_CHAT_ID, ENV_TWITCH_CHANNELS, ENV_USER_NICKNAME,
    ENV_YOUTUBE_CHANNELS,
};
use crate::{Error, Result};

/// Values collected by the setup prompts.
#[derive(Clone, Default)]
pub struct SetupAnswers {
    pub username: String,
    pub bot_token: String,
    pub chat_id: String,
    pub twitch_channels: String,
    pub youtube_channels: String,
}

/// Whether setup should run before loading configuration.
pub fn should_run(env_file: &Path, no_setup: bool) -> bool {
    !no_setup && !env_file.exists() && std::io::stdin().is_terminal()
}

fn required(input: &str) -> std::result::Result<Validation, inquire::CustomUserError> {
    if input.trim().is_empty() {
        Ok(Validation::Invalid("This value is required".into()))
    } else {
        Ok(Validation::Valid)
    }
}

fn map_prompt_error(e: InquireError) -> Error {
    match e {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => {
            Error::config("setup cancelled")
        }
        other => Error::Other(format!("setup prompt failed: {}", other)),
    }
}

/// Ask for every setting on the terminal.
pub fn prompt_answers() -> Result<SetupAnswers> {
    let username = Text::new("Username to watch for:")
        .with_validator(required)
        .prompt()
        .map_err(map_prompt_error)?;
    let bot_token = Password::new("Telegram bot token:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_validator(required)
        .prompt()
        .map_err(map_prompt_error)?;
    let chat_id = Text::new("Telegram chat id:")
        .with_validator(required)
        .prompt()
        .map_err(map_prompt_error)?;

    loop {
        let twitch_channels = Text::new("Twitch channels (comma separated, optional):")
            .prompt()
            .map_err(map_prompt_error)?;
        let youtube_channels = Text::new("YouTube channels (comma separated, optional):")
            .prompt()
            .map_err(map_prompt_error)?;

        if twitch_channels.trim().is_empty() && youtube_channels.trim().is_empty() {
            eprintln!("At least one Twitch or YouTube channel is required.");
            continue;
        }

        return Ok(SetupAnswers {
            username: username.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
            twitch_channels: twitch_channels.trim().to_string(),
            youtube_channels: youtube_channels.trim().to_string(),
        });
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render answers in env file syntax.
pub fn render_env(answers: &SetupAnswers) -> String {
    let mut out = String::new();
    for (key, value) in [
        (ENV_USER_NICKNAME, &answers.username),
        (ENV_TELEGRAM_BOT_TOKEN, &answers.bot_token),
        (ENV_TELEGRAM_CHAT_ID, &answers.chat_id),
        (ENV_TWITCH_CHANNELS, &answers.twitch_channels),
        (ENV_YOUTUBE_CHANNELS, &answers.youtube_channels),
    ] {
        if !value.is_empty() {
            out.push_str(&format!("{}={}\n", key, quote(value)));
        }
    }
    out
}

pub fn write_env_file(path: &Path, answers: &SetupAnswers) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_env(answers))?;
    info!(path = %path.display(), "Configuration saved");
    Ok(())
}

/// Prompt for the settings and save them to `env_file`.
pub fn run_interactive_setup(env_file: &Path) -> Result<()> {
    println!("No configuration found, let's create {}.", env_file.display());
    let answers = prompt_answers()?;
    write_env_file(env_file, &answers)
}
