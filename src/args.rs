//! Argument tokenizer for prefix commands
//!
//! Commands receive the raw text that follows their keyword. The helpers here
//! split it into tokens and classify them as mentions, durations, numbers or
//! comma separated rule lists.

use crate::error::{BotError, BotResult};
use derive_more::{Display, From};
use std::time::Duration;

/// A user mention, rendered as `<@id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From)]
#[display("<@{_0}>")]
pub struct Mention(pub u64);

/// Split text into non-empty whitespace separated tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Extract the user ID from a `<@id>` or `<@!id>` token.
#[must_use]
pub fn mention_id(token: &str) -> Option<u64> {
    let inner = token.strip_prefix("<@")?.strip_suffix('>')?;
    let inner = inner.strip_prefix('!').unwrap_or(inner);
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    inner.parse().ok()
}

#[must_use]
pub fn is_user_mention(token: &str) -> bool {
    mention_id(token).is_some()
}

/// Drop the leading run of user mention tokens.
#[must_use]
pub fn skip_mentions<'a, 'b>(tokens: &'a [&'b str]) -> &'a [&'b str] {
    let first_other = tokens
        .iter()
        .position(|token| !is_user_mention(token))
        .unwrap_or(tokens.len());
    &tokens[first_other..]
}

/// Parse a signed integer argument.
///
/// # Errors
/// Returns a parse error naming the token if it is not an integer.
pub fn parse_number(token: &str) -> BotResult<i64> {
    token
        .parse::<i64>()
        .map_err(|_| BotError::parse(format!("invalid number {token:?}")))
}

/// Parse a comma separated list of rule numbers such as `1,#3,4`.
///
/// # Errors
/// Returns a parse error for the first entry that is not an integer.
pub fn parse_rule_numbers(list: &str) -> BotResult<Vec<i64>> {
    list.split(',')
        .map(|entry| {
            let entry = entry.strip_prefix('#').unwrap_or(entry);
            entry
                .parse::<i64>()
                .map_err(|_| BotError::parse(format!("invalid rule number {entry:?}")))
        })
        .collect()
}

fn unit_nanos(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1.0),
        "us" | "µs" | "μs" => Some(1e3),
        "ms" => Some(1e6),
        "s" => Some(1e9),
        "m" => Some(60e9),
        "h" => Some(3600e9),
        "d" => Some(86_400e9),
        _ => None,
    }
}

/// Parse a compound duration such as `10m`, `1h30m` or `1.5h`.
///
/// A bare `0` is accepted as zero. Every other group needs a unit.
///
/// # Errors
/// Returns a parse error for empty, negative or malformed input, a group
/// without a unit, or an unknown unit.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_duration(raw: &str) -> BotResult<Duration> {
    let invalid = || BotError::parse(format!("invalid duration {raw:?}"));

    let mut rest = raw.trim();
    if rest.starts_with('-') {
        return Err(BotError::parse(format!("negative duration {raw:?}")));
    }
    rest = rest.strip_prefix('+').unwrap_or(rest);
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos = 0.0_f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, remainder) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(BotError::parse(format!("missing unit in duration {raw:?}")));
        }
        let nanos = unit_nanos(unit).ok_or_else(|| {
            BotError::parse(format!("unknown unit {unit:?} in duration {raw:?}"))
        })?;

        total_nanos += value * nanos;
        rest = remainder;
    }

    if total_nanos.is_finite() && total_nanos < u64::MAX as f64 {
        Ok(Duration::from_nanos(total_nanos.round() as u64))
    } else {
        Err(invalid())
    }
}

/// Positional arguments of the mute command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteArgs {
    pub duration: Duration,
    pub rules: Vec<i64>,
}

impl MuteArgs {
    /// Parse `<mention>... <duration> [<rule#>[,<rule#>...]]`.
    ///
    /// Mentions are skipped here; the mentioned users come from the message's
    /// structured mention list. Returns `None` when nothing follows them.
    ///
    /// # Errors
    /// Returns a parse error for a bad duration or rule list, or when more
    /// than two positional arguments are given.
    pub fn parse(tail: &str) -> BotResult<Option<Self>> {
        let tokens = tokenize(tail);
        let positional = skip_mentions(&tokens);

        let (duration, rules) = match positional {
            [] => return Ok(None),
            [duration] => (*duration, None),
            [duration, rules] => (*duration, Some(*rules)),
            [_, _, unexpected, ..] => {
                return Err(BotError::parse(format!(
                    "unexpected argument {unexpected:?}"
                )));
            }
        };

        let duration = parse_duration(duration)?;
        let rules = rules.map(parse_rule_numbers).transpose()?.unwrap_or_default();

        Ok(Some(Self { duration, rules }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_collapses_whitespace() {
        assert_eq!(tokenize("  set 3   be\texcellent "), vec!["set", "3", "be", "excellent"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_mention_detection() {
        assert_eq!(mention_id("<@123>"), Some(123));
        assert_eq!(mention_id("<@!456>"), Some(456));
        assert_eq!(mention_id("<@abc>"), None);
        assert_eq!(mention_id("<@>"), None);
        assert_eq!(mention_id("<#123>"), None);
        assert_eq!(mention_id("123"), None);
        assert!(is_user_mention("<@1>"));
        assert!(!is_user_mention("10m"));
    }

    #[test]
    fn test_mention_display() {
        assert_eq!(Mention(123).to_string(), "<@123>");
        assert_eq!(Mention::from(7_u64).to_string(), "<@7>");
    }

    #[test]
    fn test_skip_mentions_only_leading() {
        let tokens = tokenize("<@1> <@!2> 10m <@3>");
        assert_eq!(skip_mentions(&tokens), &["10m", "<@3>"]);

        let tokens = tokenize("<@1> <@2>");
        assert!(skip_mentions(&tokens).is_empty());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_errors() {
        let err = parse_duration("10").unwrap_err();
        assert_eq!(err.to_string(), "missing unit in duration \"10\"");

        let err = parse_duration("3w").unwrap_err();
        assert_eq!(err.to_string(), "unknown unit \"w\" in duration \"3w\"");

        assert!(parse_duration("").is_err());
        assert!(parse_duration("-5m").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("1.2.3s").is_err());
    }

    #[test]
    fn test_parse_rule_numbers() {
        assert_eq!(parse_rule_numbers("1,2").unwrap(), vec![1, 2]);
        assert_eq!(parse_rule_numbers("#3,#1").unwrap(), vec![3, 1]);

        let err = parse_rule_numbers("1,x").unwrap_err();
        assert_eq!(err.to_string(), "invalid rule number \"x\"");
        assert!(parse_rule_numbers("1,,2").is_err());
    }

    #[test]
    fn test_mute_args() {
        let args = MuteArgs::parse("<@123> 10m 1,2").unwrap().unwrap();
        assert_eq!(args.duration, Duration::from_secs(600));
        assert_eq!(args.rules, vec![1, 2]);

        let args = MuteArgs::parse("<@123> <@456> 1h").unwrap().unwrap();
        assert_eq!(args.duration, Duration::from_secs(3600));
        assert!(args.rules.is_empty());

        assert_eq!(MuteArgs::parse("").unwrap(), None);
        assert_eq!(MuteArgs::parse("<@123>").unwrap(), None);
    }

    #[test]
    fn test_mute_args_too_many() {
        let err = MuteArgs::parse("<@123> 10m 1 spam").unwrap_err();
        assert_eq!(err.to_string(), "unexpected argument \"spam\"");
    }
}
