//! Chat platform capabilities
//!
//! The command and job code only needs four operations from Discord. They are
//! collected in the [`Platform`] trait so the engines can be driven by a mock
//! in tests and by serenity's HTTP client in production.

use crate::error::BotResult;
use async_trait::async_trait;
use serenity::all::{ChannelId, GuildId, Http, RoleId, UserId};
use std::sync::Arc;
use tracing::debug;

/// A guild role as seen by the mute role resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRole {
    pub id: u64,
    pub name: String,
}

impl GuildRole {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Outbound operations against the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Send a plain text message, returning the new message ID
    async fn send_message(&self, channel_id: u64, text: &str) -> BotResult<u64>;

    /// List the roles of a guild
    async fn guild_roles(&self, guild_id: u64) -> BotResult<Vec<GuildRole>>;

    /// Grant a role to a guild member
    async fn add_member_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> BotResult<()>;

    /// Revoke a role from a guild member
    async fn remove_member_role(&self, guild_id: u64, user_id: u64, role_id: u64)
    -> BotResult<()>;
}

/// [`Platform`] backed by serenity's HTTP client
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
}

impl SerenityPlatform {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Platform for SerenityPlatform {
    async fn send_message(&self, channel_id: u64, text: &str) -> BotResult<u64> {
        let message = ChannelId::new(channel_id).say(&self.http, text).await?;
        Ok(message.id.get())
    }

    async fn guild_roles(&self, guild_id: u64) -> BotResult<Vec<GuildRole>> {
        let roles = GuildId::new(guild_id).roles(&self.http).await?;

        // Highest role first, matching the order Discord shows in the UI
        let mut roles: Vec<_> = roles.into_values().collect();
        roles.sort_by(|a, b| b.position.cmp(&a.position).then(a.id.cmp(&b.id)));

        debug!("Fetched {} roles for guild {guild_id}", roles.len());
        Ok(roles
            .into_iter()
            .map(|role| GuildRole::new(role.id.get(), role.name))
            .collect())
    }

    async fn add_member_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> BotResult<()> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Muted by moderator"),
            )
            .await?;
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> BotResult<()> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Mute expired or lifted"),
            )
            .await?;
        Ok(())
    }
}
