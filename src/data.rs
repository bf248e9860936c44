use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    error::{BotError, BotResult},
    guilds::GuildDirectory,
    mute::{ExpireMutesJob, MuteRoleResolver, SWEEP_INTERVAL},
    platform::Platform,
    scheduler::JobScheduler,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

/// A user whose mute role is removed once `muted_until` has passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutedUser {
    pub user_id: u64,
    pub muted_until: DateTime<Utc>,
}

impl MutedUser {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.muted_until
    }
}

/// How often a user was warned for a given rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWarning {
    pub user_id: u64,
    pub rule_number: u32,
    pub count: u32,
}

/// Kudos given to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKudos {
    pub user_id: u64,
    pub kudos: i64,
}

/// Named capabilities that can be granted to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Mute,
    EditRules,
    Warn,
    Kudos,
}

/// Everything the bot persists, keyed by guild ID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    // Numbered rule text, index 0 is rule #1
    pub guild_rules: HashMap<u64, Vec<String>>,
    // At most one entry per user
    pub muted_users: HashMap<u64, Vec<MutedUser>>,
    pub user_warnings: HashMap<u64, Vec<UserWarning>>,
    pub user_kudos: HashMap<u64, Vec<UserKudos>>,
    pub user_permissions: HashMap<u64, HashMap<u64, HashMap<Permission, bool>>>,
    pub banned_words: HashMap<u64, Vec<String>>,
    pub guild_tags: HashMap<u64, HashMap<String, String>>,
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rules: usize = self.guild_rules.values().map(Vec::len).sum();
        let mutes: usize = self.muted_users.values().map(Vec::len).sum();
        write!(
            f,
            "{} rule(s) and {} active mute(s) across {} guild(s)",
            rules,
            mutes,
            self.guild_rules
                .keys()
                .chain(self.muted_users.keys())
                .collect::<std::collections::HashSet<_>>()
                .len()
        )
    }
}

impl State {
    /// Rules of a guild, created empty on first access
    pub fn rules_mut(&mut self, guild_id: u64) -> &mut Vec<String> {
        self.guild_rules.entry(guild_id).or_default()
    }

    /// Rules of a guild without creating an entry
    #[must_use]
    pub fn rules(&self, guild_id: u64) -> &[String] {
        self.guild_rules
            .get(&guild_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Insert or update the mute record of a user
    pub fn upsert_mute(&mut self, guild_id: u64, user_id: u64, muted_until: DateTime<Utc>) {
        let mutes = self.muted_users.entry(guild_id).or_default();
        if let Some(existing) = mutes.iter_mut().find(|m| m.user_id == user_id) {
            existing.muted_until = muted_until;
        } else {
            mutes.push(MutedUser {
                user_id,
                muted_until,
            });
        }
    }

    /// Remove the mute record of a user, returning whether one existed
    pub fn remove_mute(&mut self, guild_id: u64, user_id: u64) -> bool {
        let Some(mutes) = self.muted_users.get_mut(&guild_id) else {
            return false;
        };
        let before = mutes.len();
        mutes.retain(|m| m.user_id != user_id);
        let removed = mutes.len() != before;
        if mutes.is_empty() {
            self.muted_users.remove(&guild_id);
        }
        removed
    }

    #[must_use]
    pub fn mute_of(&self, guild_id: u64, user_id: u64) -> Option<&MutedUser> {
        self.muted_users
            .get(&guild_id)?
            .iter()
            .find(|m| m.user_id == user_id)
    }

    /// `(guild_id, user_id)` of every mute that has run out
    #[must_use]
    pub fn expired_mutes(&self, now: DateTime<Utc>) -> Vec<(u64, u64)> {
        self.muted_users
            .iter()
            .flat_map(|(guild_id, mutes)| {
                mutes
                    .iter()
                    .filter(|m| m.is_expired(now))
                    .map(move |m| (*guild_id, m.user_id))
            })
            .collect()
    }
}

/// Shared handle to the bot state
///
/// All reads and writes go through [`StateStore::lock`], so a command and the
/// scheduler sweep never interleave their read-modify-write cycles.
#[derive(Clone)]
pub struct StateStore {
    state: Arc<Mutex<State>>,
    path: Option<Arc<PathBuf>>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::in_memory(State::default())
    }
}

impl StateStore {
    /// Create a store backed by a YAML file
    #[must_use]
    pub fn new(state: State, path: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            path: Some(Arc::new(path.into())),
        }
    }

    /// Create a store without a backing file; `sync` will fail
    #[must_use]
    pub fn in_memory(state: State) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            path: None,
        }
    }

    /// Load state from a YAML file
    ///
    /// A missing file gives an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::UnreadableState`] if the file exists but cannot be
    /// read or parsed. The file is left untouched so nothing overwrites it.
    pub async fn load(path: impl Into<PathBuf>) -> BotResult<Self> {
        let path = path.into();
        let unreadable = |reason: String| BotError::UnreadableState {
            path: path.display().to_string(),
            reason,
        };

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let state = serde_yaml::from_str::<State>(&content)
                    .map_err(|e| unreadable(e.to_string()))?;
                info!("Loaded state from {}: {state}", path.display());
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting empty", path.display());
                State::default()
            }
            Err(e) => return Err(unreadable(e.to_string())),
        };

        Ok(Self::new(state, path))
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    /// Acquire the state lock
    pub async fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().await
    }

    /// Write the given state to the backing file
    ///
    /// Callers pass the guard they already hold so the snapshot on disk is the
    /// state they just mutated.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The store has no backing file
    /// - The parent directory cannot be created
    /// - The state cannot be serialized to YAML
    /// - The YAML data cannot be written to the file
    pub async fn sync(&self, state: &State) -> BotResult<()> {
        let path = self.path().ok_or(BotError::MissingStatePath)?;

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let yaml = serde_yaml::to_string(state)?;
        tokio::fs::write(path, yaml).await?;

        Ok(())
    }
}

/// Everything an event handler needs, shared between gateway events
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

pub struct DataInner {
    pub store: StateStore,
    pub guilds: GuildDirectory,
    pub platform: Arc<dyn Platform>,
    pub resolver: Arc<dyn MuteRoleResolver>,
    pub prefix: String,
    pub scheduler: JobScheduler,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("store", &self.store)
            .field("guilds", &self.guilds)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Wire up the store, platform and scheduler
    ///
    /// The mute expiry sweep is registered as the scheduler's default job.
    pub fn new(
        store: StateStore,
        platform: Arc<dyn Platform>,
        resolver: Arc<dyn MuteRoleResolver>,
        prefix: impl Into<String>,
        tick: Duration,
    ) -> Self {
        let sweep = ExpireMutesJob::new(Arc::clone(&platform), Arc::clone(&resolver));
        let scheduler = JobScheduler::new(store.clone(), tick)
            .with_default_job(SWEEP_INTERVAL, Arc::new(sweep));

        Self(Arc::new(DataInner {
            store,
            guilds: GuildDirectory::new(),
            platform,
            resolver,
            prefix: prefix.into(),
            scheduler,
        }))
    }
}
