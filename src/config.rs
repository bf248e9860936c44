use crate::{
    error::{BotError, BotResult},
    mute::DEFAULT_MUTE_ROLE_NAMES,
    scheduler::DEFAULT_TICK,
};
use std::{fmt, path::PathBuf, time::Duration};

pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
pub const PREFIX_VAR: &str = "WIREBOT_PREFIX";
pub const STATE_FILE_VAR: &str = "WIREBOT_STATE_FILE";
pub const LOG_DIR_VAR: &str = "WIREBOT_LOG_DIR";
pub const TICK_VAR: &str = "WIREBOT_TICK_SECS";
pub const MUTE_ROLES_VAR: &str = "WIREBOT_MUTE_ROLES";

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_STATE_FILE: &str = "data/state.yaml";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Runtime settings read from the environment
#[derive(Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub token: String,
    /// Commands must start with this; empty disables commands
    pub prefix: String,
    pub state_file: PathBuf,
    pub log_dir: PathBuf,
    pub tick: Duration,
    pub mute_roles: Vec<String>,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("prefix", &self.prefix)
            .field("state_file", &self.state_file)
            .field("log_dir", &self.log_dir)
            .field("tick", &self.tick)
            .field("mute_roles", &self.mute_roles)
            .finish()
    }
}

impl BotConfig {
    /// Read the configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    ///
    /// # Errors
    /// Fails if the token is missing or a variable has an invalid value.
    pub fn from_env() -> BotResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through a variable lookup function.
    ///
    /// # Errors
    /// Fails if the token is missing or a variable has an invalid value.
    pub fn from_lookup<F>(lookup: F) -> BotResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(TOKEN_VAR)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| BotError::MissingEnv(TOKEN_VAR.to_string()))?;

        let prefix = lookup(PREFIX_VAR)
            .map_or_else(|| DEFAULT_PREFIX.to_string(), |prefix| prefix.trim().to_string());

        let state_file = lookup(STATE_FILE_VAR)
            .filter(|path| !path.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_FILE), PathBuf::from);

        let log_dir = lookup(LOG_DIR_VAR)
            .filter(|path| !path.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_LOG_DIR), PathBuf::from);

        let tick = match lookup(TICK_VAR) {
            None => DEFAULT_TICK,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(BotError::InvalidEnv {
                        name: TICK_VAR.to_string(),
                        value: raw,
                    });
                }
            },
        };

        let mute_roles = match lookup(MUTE_ROLES_VAR) {
            None => DEFAULT_MUTE_ROLE_NAMES.iter().map(ToString::to_string).collect(),
            Some(raw) => {
                let names: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(ToString::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(BotError::InvalidEnv {
                        name: MUTE_ROLES_VAR.to_string(),
                        value: raw,
                    });
                }
                names
            }
        };

        Ok(Self {
            token,
            prefix,
            state_file,
            log_dir,
            tick,
            mute_roles,
        })
    }
}
