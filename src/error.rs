//! Error types for the bot
//!
//! Every command handler and background job reports failures through
//! [`BotError`]. User-facing variants render exactly the text that is echoed
//! back into the channel.

use thiserror::Error;

/// Errors that can occur while handling commands or running jobs
#[derive(Debug, Error)]
pub enum BotError {
    /// Malformed duration, number or argument count
    #[error("{0}")]
    Parse(String),

    /// Rule index or move target out of range
    #[error("{0}")]
    NotFound(String),

    /// Discord API error
    #[error("Discord API error: {0}")]
    Discord(#[from] Box<serenity::Error>),

    /// Any other platform capability failure
    #[error("platform error: {0}")]
    Capability(String),

    /// No role in the guild matches one of the mute role names
    #[error("missing role for muting")]
    MissingMuteRole,

    /// The channel could not be mapped to a guild
    #[error("missing guild for channel {0}")]
    MissingGuild(u64),

    /// `sync` was called on a store without a backing file
    #[error("missing path to state file")]
    MissingStatePath,

    /// A required environment variable is not set
    #[error("missing environment variable {0}")]
    MissingEnv(String),

    /// An environment variable could not be parsed
    #[error("invalid value {value:?} for environment variable {name}")]
    InvalidEnv { name: String, value: String },

    /// The job scheduler was started twice
    #[error("jobs already running")]
    AlreadyRunning,

    /// The state file exists but could not be read or parsed
    #[error("unreadable state file {path}: {reason}")]
    UnreadableState { path: String, reason: String },

    /// Writing the state file failed
    #[error("failed to persist state: {0}")]
    Persist(String),
}

impl BotError {
    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Whether this error came from user input rather than the environment
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::NotFound(_))
    }
}

impl From<serenity::Error> for BotError {
    fn from(error: serenity::Error) -> Self {
        Self::Discord(Box::new(error))
    }
}

impl From<std::io::Error> for BotError {
    fn from(error: std::io::Error) -> Self {
        Self::Persist(error.to_string())
    }
}

impl From<serde_yaml::Error> for BotError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Persist(error.to_string())
    }
}

/// Result type for bot operations
pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BotError::parse("expecting no arguments");
        assert_eq!(error.to_string(), "expecting no arguments");

        let error = BotError::not_found("rule #5 not found");
        assert_eq!(error.to_string(), "rule #5 not found");

        assert_eq!(
            BotError::MissingMuteRole.to_string(),
            "missing role for muting"
        );
        assert_eq!(
            BotError::MissingGuild(42).to_string(),
            "missing guild for channel 42"
        );
        assert_eq!(BotError::AlreadyRunning.to_string(), "jobs already running");
        assert_eq!(
            BotError::UnreadableState {
                path: "state.yaml".to_string(),
                reason: "bad indent".to_string(),
            }
            .to_string(),
            "unreadable state file state.yaml: bad indent"
        );
    }

    #[test]
    fn test_user_errors() {
        assert!(BotError::parse("bad").is_user_error());
        assert!(BotError::not_found("gone").is_user_error());
        assert!(!BotError::MissingMuteRole.is_user_error());
        assert!(!BotError::Capability("boom".to_string()).is_user_error());
    }

    #[test]
    fn test_io_error_maps_to_persist() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = BotError::from(io);
        assert!(matches!(error, BotError::Persist(_)));
        assert!(error.to_string().contains("denied"));
    }
}
