use crate::{
    EVENT_TARGET,
    commands::{self, InboundMessage},
    data::Data,
    error::BotError,
};
use serenity::all::{Context, EventHandler, Guild, Message, Ready, UnavailableGuild};
use serenity::async_trait;
use tracing::{debug, error, info};

pub struct Handler {
    data: Data,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        Self { data }
    }
}

impl From<&Message> for InboundMessage {
    fn from(message: &Message) -> Self {
        Self {
            channel_id: message.channel_id.get(),
            guild_id: message.guild_id.map(|id| id.get()),
            author_id: message.author.id.get(),
            author_is_bot: message.author.bot,
            content: message.content.clone(),
            mentions: message.mentions.iter().map(|user| user.id.get()).collect(),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    /// Rebuild the guild directory and start background jobs.
    ///
    /// Ready fires again after a reconnect; the scheduler keeps running then.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");

        self.data
            .guilds
            .reset(ready.guilds.iter().map(|guild| guild.id.get()));

        match self.data.scheduler.start().await {
            Ok(()) => info!(target: EVENT_TARGET, "Background jobs started"),
            Err(BotError::AlreadyRunning) => {
                debug!(target: EVENT_TARGET, "Background jobs already running");
            }
            Err(e) => error!(target: EVENT_TARGET, error = %e, "Failed to start background jobs"),
        }
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let channels: Vec<u64> = guild.channels.keys().map(|id| id.get()).collect();
        debug!(
            target: EVENT_TARGET,
            guild_id = guild.id.get(),
            channels = channels.len(),
            "Guild available"
        );
        self.data.guilds.upsert_guild(guild.id.get(), channels);
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // An unavailable guild is an outage, not a removal
        if incomplete.unavailable {
            debug!(target: EVENT_TARGET, guild_id = incomplete.id.get(), "Guild unavailable");
            return;
        }
        if self.data.guilds.remove_guild(incomplete.id.get()) {
            info!(target: EVENT_TARGET, guild_id = incomplete.id.get(), "Removed from guild");
        }
    }

    async fn message(&self, _ctx: Context, new_message: Message) {
        let message = InboundMessage::from(&new_message);
        commands::dispatch(&self.data, &message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }
}
