use crate::{
    COMMAND_TARGET, CONSOLE_TARGET, ERROR_TARGET, Error, commands::InboundMessage,
    error::BotError,
};
use std::{path::Path, time::Instant};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Command log file name, rotated daily inside the log directory
pub const COMMAND_LOG_FILE: &str = "commands";

/// Initialize the logging system with console and file outputs
///
/// # Errors
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init(log_dir: &Path) -> Result<(), Error> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    let command_file = RollingFileAppender::new(Rotation::DAILY, log_dir, COMMAND_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // JSON lines for the command log
    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file);

    // RUST_LOG wins; otherwise info, with serenity's gateway chatter muted
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let filter = EnvFilter::new("info");
        match "serenity=error".parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

fn guild_label(message: &InboundMessage) -> String {
    message
        .guild_id
        .map_or_else(|| "DM".to_string(), |id| id.to_string())
}

/// Log the start of a command and return the instant it started
pub fn log_command_start(command: &str, message: &InboundMessage, arguments: &str) -> Instant {
    info!(
        target: COMMAND_TARGET,
        command = %command,
        guild_id = %guild_label(message),
        channel_id = message.channel_id,
        user_id = message.author_id,
        arguments = %arguments,
        event = "start",
        "Command execution started"
    );
    Instant::now()
}

/// Log the successful end of a command
pub fn log_command_end(command: &str, message: &InboundMessage, started: Instant) {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or_default();
    info!(
        target: COMMAND_TARGET,
        command = %command,
        guild_id = %guild_label(message),
        user_id = message.author_id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log a command failure
///
/// Mistakes in user input are logged as warnings, everything else as errors.
pub fn log_command_error(command: &str, message: &InboundMessage, error: &BotError) {
    if error.is_user_error() {
        warn!(
            target: ERROR_TARGET,
            command = %command,
            guild_id = %guild_label(message),
            user_id = message.author_id,
            error = %error,
            "Command rejected"
        );
    } else {
        error!(
            target: ERROR_TARGET,
            command = %command,
            guild_id = %guild_label(message),
            user_id = message.author_id,
            error = %error,
            "Command error"
        );
    }
}

pub fn log_console(message: impl AsRef<str>) {
    info!(
        target: CONSOLE_TARGET,
        message = %message.as_ref(),
        event = "console",
    );
}
