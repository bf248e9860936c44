use dashmap::{DashMap, DashSet};
use tracing::debug;

/// Known guilds and the channels that belong to them
///
/// Maintained from gateway events, read by command handlers to find the guild
/// a message was sent in.
#[derive(Debug, Default)]
pub struct GuildDirectory {
    guilds: DashSet<u64>,
    channels: DashMap<u64, u64>,
}

impl GuildDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything and start over with the guilds listed on ready
    pub fn reset(&self, guild_ids: impl IntoIterator<Item = u64>) {
        self.guilds.clear();
        self.channels.clear();
        for guild_id in guild_ids {
            self.guilds.insert(guild_id);
        }
        debug!("Guild directory reset with {} guild(s)", self.guilds.len());
    }

    /// Record a guild and its channels, replacing any channels seen before
    pub fn upsert_guild(&self, guild_id: u64, channel_ids: impl IntoIterator<Item = u64>) {
        self.channels.retain(|_, owner| *owner != guild_id);
        self.guilds.insert(guild_id);
        for channel_id in channel_ids {
            self.channels.insert(channel_id, guild_id);
        }
    }

    /// Drop a guild and all of its channels
    pub fn remove_guild(&self, guild_id: u64) -> bool {
        self.channels.retain(|_, owner| *owner != guild_id);
        self.guilds.remove(&guild_id).is_some()
    }

    #[must_use]
    pub fn channel_guild(&self, channel_id: u64) -> Option<u64> {
        self.channels.get(&channel_id).map(|entry| *entry.value())
    }

    #[must_use]
    pub fn contains_guild(&self, guild_id: u64) -> bool {
        self.guilds.contains(&guild_id)
    }

    #[must_use]
    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_lookup() {
        let directory = GuildDirectory::new();
        directory.upsert_guild(1, [10, 11]);
        directory.upsert_guild(2, [20]);

        assert_eq!(directory.channel_guild(10), Some(1));
        assert_eq!(directory.channel_guild(11), Some(1));
        assert_eq!(directory.channel_guild(20), Some(2));
        assert_eq!(directory.channel_guild(99), None);
        assert_eq!(directory.guild_count(), 2);
    }

    #[test]
    fn test_upsert_replaces_channels() {
        let directory = GuildDirectory::new();
        directory.upsert_guild(1, [10, 11]);
        directory.upsert_guild(1, [12]);

        assert_eq!(directory.channel_guild(10), None);
        assert_eq!(directory.channel_guild(12), Some(1));
    }

    #[test]
    fn test_remove_guild() {
        let directory = GuildDirectory::new();
        directory.upsert_guild(1, [10]);
        directory.upsert_guild(2, [20]);

        assert!(directory.remove_guild(1));
        assert!(!directory.remove_guild(1));
        assert_eq!(directory.channel_guild(10), None);
        assert_eq!(directory.channel_guild(20), Some(2));
        assert!(!directory.contains_guild(1));
    }

    #[test]
    fn test_reset() {
        let directory = GuildDirectory::new();
        directory.upsert_guild(1, [10]);
        directory.reset([2, 3]);

        assert_eq!(directory.channel_guild(10), None);
        assert!(directory.contains_guild(2));
        assert!(directory.contains_guild(3));
        assert!(!directory.contains_guild(1));
    }
}
