//! Prefix command dispatch
//!
//! A message is a command when it starts with the configured prefix. The
//! first word after the prefix picks the handler and the rest of the message
//! is handed to it untouched.

use crate::{
    COMMAND_TARGET, ERROR_TARGET,
    args::{MuteArgs, skip_mentions, tokenize},
    data::Data,
    error::{BotError, BotResult},
    logging::{log_command_end, log_command_error, log_command_start},
    mute,
    rules::{self, RuleCommand},
};
use tracing::{debug, error};

/// The parts of a chat message the dispatcher looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub content: String,
    /// Users mentioned in the message, as resolved by the platform
    pub mentions: Vec<u64>,
}

/// A recognized command and its argument tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Mute(&'a str),
    Unmute(&'a str),
    Rule(&'a str),
    /// `!!name` shortcut
    Emoji(&'a str),
}

impl<'a> Command<'a> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mute(_) => "mute",
            Self::Unmute(_) => "unmute",
            Self::Rule(_) => "rule",
            Self::Emoji(_) => "emoji",
        }
    }

    #[must_use]
    pub fn tail(&self) -> &'a str {
        match self {
            Self::Mute(tail) | Self::Unmute(tail) | Self::Rule(tail) | Self::Emoji(tail) => tail,
        }
    }
}

/// Recognize a command in a message.
///
/// Returns `None` if the prefix is empty, the message does not start with
/// it, or the keyword is unknown.
#[must_use]
pub fn parse_invocation<'a>(prefix: &str, content: &'a str) -> Option<Command<'a>> {
    if prefix.is_empty() {
        return None;
    }
    let rest = content.strip_prefix(prefix)?;
    let (head, tail) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));

    if tail.is_empty() {
        if let Some(emoji) = head.strip_prefix(prefix) {
            return (!emoji.is_empty()).then_some(Command::Emoji(emoji));
        }
    }

    match head {
        "mute" | "m" => Some(Command::Mute(tail)),
        "unmute" | "um" => Some(Command::Unmute(tail)),
        "rule" | "r" => Some(Command::Rule(tail)),
        _ => None,
    }
}

/// Run the command in a message, if there is one.
///
/// Errors are logged and echoed back to the channel. Returns whether the
/// message was a command.
pub async fn dispatch(data: &Data, message: &InboundMessage) -> bool {
    if message.author_is_bot {
        return false;
    }
    let Some(command) = parse_invocation(&data.prefix, &message.content) else {
        return false;
    };

    let started = log_command_start(command.name(), message, command.tail());
    let result = match command {
        Command::Mute(tail) => cmd_mute(data, message, tail).await,
        Command::Unmute(tail) => cmd_unmute(data, message, tail).await,
        Command::Rule(tail) => cmd_rule(data, message, tail).await,
        Command::Emoji(name) => {
            debug!(target: COMMAND_TARGET, emoji = %name, "Emoji shortcut ignored");
            Ok(())
        }
    };

    match result {
        Ok(()) => log_command_end(command.name(), message, started),
        Err(e) => {
            log_command_error(command.name(), message, &e);
            if let Err(send_error) = data
                .platform
                .send_message(message.channel_id, &e.to_string())
                .await
            {
                error!(
                    target: ERROR_TARGET,
                    channel_id = message.channel_id,
                    error = %send_error,
                    "Failed to report command error"
                );
            }
        }
    }
    true
}

fn resolve_guild(data: &Data, message: &InboundMessage) -> BotResult<u64> {
    data.guilds
        .channel_guild(message.channel_id)
        .or(message.guild_id)
        .ok_or(BotError::MissingGuild(message.channel_id))
}

async fn cmd_mute(data: &Data, message: &InboundMessage, tail: &str) -> BotResult<()> {
    let Some(args) = MuteArgs::parse(tail)? else {
        return Ok(());
    };
    if message.mentions.is_empty() {
        return Err(BotError::parse("no users mentioned"));
    }
    let guild_id = resolve_guild(data, message)?;
    let role_id =
        mute::resolve_role(data.platform.as_ref(), data.resolver.as_ref(), guild_id).await?;

    let reply = {
        let mut state = data.store.lock().await;

        let mut muted = 0;
        let mut outcome = Ok(());
        for user_id in &message.mentions {
            let result = mute::mute(
                data.platform.as_ref(),
                &mut state,
                guild_id,
                *user_id,
                role_id,
                args.duration,
            )
            .await;
            if let Err(e) = result {
                outcome = Err(e);
                break;
            }
            muted += 1;
        }

        // Users muted before a failure stay muted and must be persisted
        if muted > 0 {
            data.store.sync(&state).await?;
        }
        outcome?;

        let cited = rules::cite(state.rules(guild_id), &args.rules)?;
        mute::compose_mute_reply(&message.mentions, &cited)
    };

    data.platform
        .send_message(message.channel_id, &reply)
        .await?;
    Ok(())
}

async fn cmd_unmute(data: &Data, message: &InboundMessage, tail: &str) -> BotResult<()> {
    let tokens = tokenize(tail);
    if tokens.is_empty() && message.mentions.is_empty() {
        return Ok(());
    }
    if let Some(unexpected) = skip_mentions(&tokens).first() {
        return Err(BotError::parse(format!("unexpected argument {unexpected:?}")));
    }
    if message.mentions.is_empty() {
        return Err(BotError::parse("no users mentioned"));
    }
    let guild_id = resolve_guild(data, message)?;
    let role_id =
        mute::resolve_role(data.platform.as_ref(), data.resolver.as_ref(), guild_id).await?;

    {
        let mut state = data.store.lock().await;
        let mut changed = false;
        let mut outcome = Ok(());
        for user_id in &message.mentions {
            match mute::unmute(
                data.platform.as_ref(),
                &mut state,
                guild_id,
                *user_id,
                role_id,
            )
            .await
            {
                Ok(removed) => changed |= removed,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        if changed {
            data.store.sync(&state).await?;
        }
        outcome?;
    }

    data.platform
        .send_message(
            message.channel_id,
            &mute::compose_unmute_reply(&message.mentions),
        )
        .await?;
    Ok(())
}

async fn cmd_rule(data: &Data, message: &InboundMessage, tail: &str) -> BotResult<()> {
    let Some(command) = RuleCommand::parse(tail)? else {
        return Ok(());
    };
    let guild_id = resolve_guild(data, message)?;

    let outcome = {
        let mut state = data.store.lock().await;
        let outcome = command.apply(state.rules_mut(guild_id))?;
        if outcome.mutated {
            data.store.sync(&state).await?;
        }
        outcome
    };

    data.platform
        .send_message(message.channel_id, &outcome.reply)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{State, StateStore},
        mute::RoleNameResolver,
        platform::{GuildRole, MockPlatform},
    };
    use mockall::predicate::{always, eq};
    use std::{
        path::PathBuf,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tempfile::TempDir;

    const GUILD: u64 = 1;
    const CHANNEL: u64 = 10;
    const MUTE_ROLE: u64 = 50;

    struct Harness {
        data: Data,
        sent: Arc<Mutex<Vec<String>>>,
        role_lookups: Arc<AtomicUsize>,
        state_file: PathBuf,
        _dir: TempDir,
    }

    impl Harness {
        fn new(mut platform: MockPlatform, state: State) -> Self {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&sent);
            platform
                .expect_send_message()
                .withf(|channel_id, _| *channel_id == CHANNEL)
                .returning(move |_, text| {
                    sink.lock().unwrap().push(text.to_string());
                    Ok(1)
                });
            let role_lookups = Arc::new(AtomicUsize::new(0));
            let lookups = Arc::clone(&role_lookups);
            platform.expect_guild_roles().returning(move |_| {
                lookups.fetch_add(1, Ordering::SeqCst);
                Ok(vec![GuildRole::new(MUTE_ROLE, "Muted")])
            });

            let dir = tempfile::tempdir().unwrap();
            let state_file = dir.path().join("state.yaml");
            let data = Data::new(
                StateStore::new(state, &state_file),
                Arc::new(platform),
                Arc::new(RoleNameResolver::default()),
                "!",
                Duration::from_secs(60),
            );
            data.guilds.upsert_guild(GUILD, [CHANNEL]);

            Self {
                data,
                sent,
                role_lookups,
                state_file,
                _dir: dir,
            }
        }

        fn with_rules(platform: MockPlatform, rules: &[&str]) -> Self {
            let mut state = State::default();
            state
                .rules_mut(GUILD)
                .extend(rules.iter().map(ToString::to_string));
            Self::new(platform, state)
        }

        async fn send(&self, content: &str, mentions: &[u64]) -> bool {
            let message = InboundMessage {
                channel_id: CHANNEL,
                guild_id: Some(GUILD),
                author_id: 99,
                author_is_bot: false,
                content: content.to_string(),
                mentions: mentions.to_vec(),
            };
            dispatch(&self.data, &message).await
        }

        fn replies(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        async fn saved_state(&self) -> State {
            let store = StateStore::load(&self.state_file).await.unwrap();
            let state = store.lock().await.clone();
            state
        }
    }

    #[test]
    fn test_parse_invocation() {
        assert_eq!(
            parse_invocation("!", "!mute <@1> 10m"),
            Some(Command::Mute("<@1> 10m"))
        );
        assert_eq!(parse_invocation("!", "!m"), Some(Command::Mute("")));
        assert_eq!(parse_invocation("!", "!um <@1>"), Some(Command::Unmute("<@1>")));
        assert_eq!(
            parse_invocation("!", "!r set 1  two  spaces"),
            Some(Command::Rule("set 1  two  spaces"))
        );
        assert_eq!(parse_invocation("!", "!rules list"), None);
        assert_eq!(parse_invocation("!", "mute <@1> 10m"), None);
        assert_eq!(parse_invocation("", "!mute <@1> 10m"), None);
        assert_eq!(parse_invocation("?", "?rule list"), Some(Command::Rule("list")));
    }

    #[test]
    fn test_parse_emoji_route() {
        assert_eq!(parse_invocation("!", "!!wave"), Some(Command::Emoji("wave")));
        assert_eq!(parse_invocation("!", "!!"), None);
        assert_eq!(parse_invocation("!", "!!wave hello"), None);
        assert_eq!(Command::Emoji("wave").name(), "emoji");
    }

    #[tokio::test]
    async fn test_ignores_bots_and_unknown_commands() {
        let harness = Harness::new(MockPlatform::new(), State::default());

        let message = InboundMessage {
            channel_id: CHANNEL,
            author_is_bot: true,
            content: "!rule list".to_string(),
            ..InboundMessage::default()
        };
        assert!(!dispatch(&harness.data, &message).await);
        assert!(!harness.send("!frobnicate", &[]).await);
        assert!(!harness.send("hello there", &[]).await);
        assert!(harness.send("!!wave", &[]).await);

        assert!(harness.replies().is_empty());
    }

    #[tokio::test]
    async fn test_rule_set_appends_and_persists() {
        let harness = Harness::with_rules(MockPlatform::new(), &["no spam", "be kind"]);

        assert!(harness.send("!rule set 3 be excellent", &[]).await);

        assert_eq!(harness.replies(), ["Added rule #3: be excellent"]);
        assert_eq!(
            harness.saved_state().await.rules(GUILD),
            ["no spam", "be kind", "be excellent"]
        );
    }

    #[tokio::test]
    async fn test_rule_read_does_not_persist() {
        let harness = Harness::with_rules(MockPlatform::new(), &["a", "b"]);

        harness.send("!r list", &[]).await;
        harness.send("!r get 2", &[]).await;
        harness.send("!r mv 2 2", &[]).await;

        assert_eq!(harness.replies(), ["1. a\n2. b", "Rule #2: b", "Nothing changed."]);
        assert!(!harness.state_file.exists());
    }

    #[tokio::test]
    async fn test_rule_errors_are_echoed() {
        let harness = Harness::with_rules(MockPlatform::new(), &["a"]);

        harness.send("!rule get 4", &[]).await;
        harness.send("!rule move 1", &[]).await;
        harness.send("!rule", &[]).await;
        harness.send("!rule dance", &[]).await;

        assert_eq!(
            harness.replies(),
            ["rule 4 not found", "expecting exactly 2 arguments"]
        );
    }

    #[tokio::test]
    async fn test_mute_with_cited_rules() {
        let mut platform = MockPlatform::new();
        platform
            .expect_add_member_role()
            .with(eq(GUILD), eq(123), eq(MUTE_ROLE))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let harness = Harness::with_rules(platform, &["r1", "r2"]);

        harness.send("!mute <@123> 10m 1,2", &[123]).await;

        assert_eq!(
            harness.replies(),
            ["**Muted:** <@123>\n\nRules broken: #1. r1\n#2. r2"]
        );
        assert!(harness.saved_state().await.mute_of(GUILD, 123).is_some());
    }

    #[tokio::test]
    async fn test_mute_several_users_looks_up_role_once() {
        let mut platform = MockPlatform::new();
        platform
            .expect_add_member_role()
            .with(eq(GUILD), always(), eq(MUTE_ROLE))
            .times(2)
            .returning(|_, _, _| Ok(()));
        let harness = Harness::new(platform, State::default());

        harness.send("!m <@123> <@456> 1h", &[123, 456]).await;

        assert_eq!(harness.replies(), ["**Muted:** <@123> <@456>"]);
        assert_eq!(harness.role_lookups.load(Ordering::SeqCst), 1);
        let saved = harness.saved_state().await;
        assert!(saved.mute_of(GUILD, 123).is_some());
        assert!(saved.mute_of(GUILD, 456).is_some());
    }

    #[tokio::test]
    async fn test_mute_unknown_rule_keeps_mute() {
        let mut platform = MockPlatform::new();
        platform
            .expect_add_member_role()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let harness = Harness::with_rules(platform, &["r1", "r2"]);

        harness.send("!mute <@123> 10m 5", &[123]).await;

        assert_eq!(harness.replies(), ["rule #5 not found"]);
        assert!(harness.data.store.lock().await.mute_of(GUILD, 123).is_some());
        assert!(harness.saved_state().await.mute_of(GUILD, 123).is_some());
    }

    #[tokio::test]
    async fn test_mute_argument_errors() {
        let harness = Harness::new(MockPlatform::new(), State::default());

        harness.send("!mute", &[]).await;
        harness.send("!mute <@1> 10m 1 spam", &[1]).await;
        harness.send("!mute <@1> 10", &[1]).await;
        harness.send("!mute 10m", &[]).await;

        assert_eq!(
            harness.replies(),
            [
                "unexpected argument \"spam\"",
                "missing unit in duration \"10\"",
                "no users mentioned",
            ]
        );
    }

    #[tokio::test]
    async fn test_unmute() {
        let mut platform = MockPlatform::new();
        platform
            .expect_remove_member_role()
            .with(eq(GUILD), eq(123), eq(MUTE_ROLE))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut state = State::default();
        state.upsert_mute(GUILD, 123, chrono::Utc::now() + chrono::Duration::hours(1));
        let harness = Harness::new(platform, state);

        harness.send("!unmute <@123>", &[123]).await;

        assert_eq!(harness.replies(), ["**Unmuted:** <@123>"]);
        assert!(harness.saved_state().await.mute_of(GUILD, 123).is_none());
    }

    #[tokio::test]
    async fn test_missing_guild() {
        let harness = Harness::new(MockPlatform::new(), State::default());
        let message = InboundMessage {
            channel_id: CHANNEL,
            content: "!rule list".to_string(),
            ..InboundMessage::default()
        };
        harness.data.guilds.remove_guild(GUILD);

        dispatch(&harness.data, &message).await;

        assert_eq!(harness.replies(), ["missing guild for channel 10"]);
    }

    #[tokio::test]
    async fn test_guild_falls_back_to_message() {
        let harness = Harness::with_rules(MockPlatform::new(), &["a"]);
        harness.data.guilds.remove_guild(GUILD);

        harness.send("!rule get 1", &[]).await;

        assert_eq!(harness.replies(), ["Rule #1: a"]);
    }
}
