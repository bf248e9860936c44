//! Role-based muting
//!
//! A user is muted by granting them the guild's mute role and recording when
//! the mute runs out. [`ExpireMutesJob`] lifts mutes whose time has passed.

use crate::{
    EVENT_TARGET,
    args::Mention,
    data::{State, StateStore},
    error::{BotError, BotResult},
    platform::{GuildRole, Platform},
    scheduler::ScheduledJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tracing::{info, warn};

/// Role names treated as the mute role when nothing else is configured
pub const DEFAULT_MUTE_ROLE_NAMES: [&str; 4] = ["mute", "muted", "silence", "silenced"];

/// How often expired mutes are swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Picks the role that silences members of a guild
pub trait MuteRoleResolver: Send + Sync {
    fn select(&self, roles: &[GuildRole]) -> Option<u64>;
}

/// Matches role names case-insensitively against a list of candidates
///
/// Candidates are tried in order, so an earlier name wins over a later one
/// even if the later one appears first in the guild's role list.
#[derive(Debug, Clone)]
pub struct RoleNameResolver {
    names: Vec<String>,
}

impl RoleNameResolver {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for RoleNameResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MUTE_ROLE_NAMES)
    }
}

impl MuteRoleResolver for RoleNameResolver {
    fn select(&self, roles: &[GuildRole]) -> Option<u64> {
        self.names.iter().find_map(|name| {
            roles
                .iter()
                .find(|role| role.name.to_lowercase() == *name)
                .map(|role| role.id)
        })
    }
}

/// Look up the guild's mute role
///
/// # Errors
/// Fails if the roles cannot be listed or none of them is a mute role.
pub async fn resolve_role(
    platform: &dyn Platform,
    resolver: &dyn MuteRoleResolver,
    guild_id: u64,
) -> BotResult<u64> {
    let roles = platform.guild_roles(guild_id).await?;
    resolver.select(&roles).ok_or(BotError::MissingMuteRole)
}

/// Grant the mute role and record when it should be lifted.
///
/// Muting an already muted user only moves `muted_until`. `role_id` comes
/// from [`resolve_role`], looked up once per command.
///
/// # Errors
/// Fails if the duration is too large to add to the current time or the
/// platform rejects the role grant. Nothing is recorded in that case.
pub async fn mute(
    platform: &dyn Platform,
    state: &mut State,
    guild_id: u64,
    user_id: u64,
    role_id: u64,
    duration: Duration,
) -> BotResult<DateTime<Utc>> {
    let out_of_range = || BotError::parse(format!("duration {duration:?} is too long"));
    let delta = chrono::Duration::from_std(duration).map_err(|_| out_of_range())?;
    let muted_until = Utc::now()
        .checked_add_signed(delta)
        .ok_or_else(out_of_range)?;

    platform.add_member_role(guild_id, user_id, role_id).await?;

    state.upsert_mute(guild_id, user_id, muted_until);

    info!(
        target: EVENT_TARGET,
        guild_id = guild_id,
        user_id = user_id,
        muted_until = %muted_until,
        "Muted user"
    );
    Ok(muted_until)
}

/// Revoke the mute role and forget the mute record.
///
/// Returns whether a record existed. Unmuting someone who was never muted is
/// not an error.
///
/// # Errors
/// Fails if the platform rejects the revoke.
pub async fn unmute(
    platform: &dyn Platform,
    state: &mut State,
    guild_id: u64,
    user_id: u64,
    role_id: u64,
) -> BotResult<bool> {
    platform
        .remove_member_role(guild_id, user_id, role_id)
        .await?;

    let removed = state.remove_mute(guild_id, user_id);
    info!(
        target: EVENT_TARGET,
        guild_id = guild_id,
        user_id = user_id,
        had_record = removed,
        "Unmuted user"
    );
    Ok(removed)
}

fn mention_list(user_ids: &[u64]) -> String {
    user_ids
        .iter()
        .map(|id| Mention(*id).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `**Muted:** <@a> <@b>`, followed by the cited rules if there are any
#[must_use]
pub fn compose_mute_reply(user_ids: &[u64], cited_rules: &[String]) -> String {
    let mut reply = format!("**Muted:** {}", mention_list(user_ids));
    if !cited_rules.is_empty() {
        reply.push_str("\n\nRules broken: ");
        reply.push_str(&cited_rules.join("\n"));
    }
    reply
}

#[must_use]
pub fn compose_unmute_reply(user_ids: &[u64]) -> String {
    format!("**Unmuted:** {}", mention_list(user_ids))
}

/// Lifts every mute whose `muted_until` has passed
pub struct ExpireMutesJob {
    platform: Arc<dyn Platform>,
    resolver: Arc<dyn MuteRoleResolver>,
}

impl ExpireMutesJob {
    pub fn new(platform: Arc<dyn Platform>, resolver: Arc<dyn MuteRoleResolver>) -> Self {
        Self { platform, resolver }
    }
}

#[async_trait]
impl ScheduledJob for ExpireMutesJob {
    fn name(&self) -> &'static str {
        "expire-mutes"
    }

    async fn run(&self, store: &StateStore, state: &mut State) -> BotResult<()> {
        let expired = state.expired_mutes(Utc::now());
        if expired.is_empty() {
            return Ok(());
        }

        // Role lookups are shared by every expired mute of the same guild
        let mut guild_roles: HashMap<u64, Option<u64>> = HashMap::new();
        let mut unreachable: HashSet<u64> = HashSet::new();
        let mut changed = false;

        for (guild_id, user_id) in expired {
            if unreachable.contains(&guild_id) {
                continue;
            }
            let role_id = match guild_roles.get(&guild_id) {
                Some(role_id) => *role_id,
                None => {
                    let role_id = match resolve_role(
                        self.platform.as_ref(),
                        self.resolver.as_ref(),
                        guild_id,
                    )
                    .await
                    {
                        Ok(role_id) => Some(role_id),
                        Err(BotError::MissingMuteRole) => None,
                        Err(e) => {
                            warn!(
                                target: EVENT_TARGET,
                                guild_id = guild_id,
                                error = %e,
                                "Failed to list roles, keeping expired mutes for next sweep"
                            );
                            unreachable.insert(guild_id);
                            continue;
                        }
                    };
                    guild_roles.insert(guild_id, role_id);
                    role_id
                }
            };

            let Some(role_id) = role_id else {
                warn!(
                    target: EVENT_TARGET,
                    guild_id = guild_id,
                    user_id = user_id,
                    "Guild has no mute role anymore, dropping expired mute"
                );
                state.remove_mute(guild_id, user_id);
                changed = true;
                continue;
            };

            match self
                .platform
                .remove_member_role(guild_id, user_id, role_id)
                .await
            {
                Ok(()) => {
                    state.remove_mute(guild_id, user_id);
                    changed = true;
                    info!(
                        target: EVENT_TARGET,
                        guild_id = guild_id,
                        user_id = user_id,
                        "Mute expired"
                    );
                }
                Err(e) => warn!(
                    target: EVENT_TARGET,
                    guild_id = guild_id,
                    user_id = user_id,
                    error = %e,
                    "Failed to lift expired mute"
                ),
            }
        }

        if changed {
            store.sync(state).await?;
        }
        Ok(())
    }
}
