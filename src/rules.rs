//! Per-guild rule list editing
//!
//! Users address rules by 1-based number; storage is a plain `Vec<String>`.
//! Parsing a `rule` invocation and applying it are separate steps so the
//! caller can hold the state lock only while applying.

use crate::{
    args::{parse_number, tokenize},
    error::{BotError, BotResult},
};

/// A parsed `rule` sub-command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCommand {
    List,
    Get(i64),
    Set(i64, String),
    Delete(i64),
    Move(i64, i64),
    Add(String),
}

/// Result of applying a [`RuleCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Text to send back to the channel
    pub reply: String,
    /// Whether the list changed and needs to be persisted
    pub mutated: bool,
}

impl RuleOutcome {
    fn read(reply: String) -> Self {
        Self {
            reply,
            mutated: false,
        }
    }

    fn changed(reply: String) -> Self {
        Self {
            reply,
            mutated: true,
        }
    }
}

impl RuleCommand {
    /// Parse the text following the `rule` keyword.
    ///
    /// Returns `None` for an empty tail or an unknown verb; both are no-ops.
    ///
    /// # Errors
    /// Returns a parse error for a wrong argument count or a non-integer
    /// rule number.
    pub fn parse(tail: &str) -> BotResult<Option<Self>> {
        let tokens = tokenize(tail);
        let Some((verb, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match *verb {
            "list" => {
                if !args.is_empty() {
                    return Err(BotError::parse("expecting no arguments"));
                }
                Self::List
            }
            "get" | "show" => match args {
                [n] => Self::Get(parse_number(n)?),
                _ => return Err(BotError::parse("expecting exactly one argument")),
            },
            "set" | "replace" => match args {
                [n, text @ ..] if !text.is_empty() => Self::Set(parse_number(n)?, text.join(" ")),
                _ => return Err(BotError::parse("expecting 2 arguments")),
            },
            "del" | "delete" => match args {
                [n] => Self::Delete(parse_number(n)?),
                _ => return Err(BotError::parse("expecting exactly 1 argument")),
            },
            "mv" | "move" => match args {
                [n, o] => Self::Move(parse_number(n)?, parse_number(o)?),
                _ => return Err(BotError::parse("expecting exactly 2 arguments")),
            },
            "add" | "append" => {
                if args.is_empty() {
                    return Err(BotError::parse("expecting one argument"));
                }
                Self::Add(args.join(" "))
            }
            _ => return Ok(None),
        };

        Ok(Some(command))
    }

    /// Apply the command to a guild's rule list.
    ///
    /// # Errors
    /// Returns a not-found error when a rule number is out of range, and a
    /// parse error when `set` is given a number below 1.
    pub fn apply(&self, rules: &mut Vec<String>) -> BotResult<RuleOutcome> {
        match self {
            Self::List => Ok(RuleOutcome::read(list(rules))),
            Self::Get(n) => {
                let index = existing_index(*n, rules.len())
                    .ok_or_else(|| BotError::not_found(format!("rule {n} not found")))?;
                Ok(RuleOutcome::read(format!("Rule #{n}: {}", rules[index])))
            }
            Self::Set(n, text) => {
                if *n < 1 {
                    return Err(BotError::parse("number must be > 0"));
                }
                let index = usize::try_from(n - 1)
                    .ok()
                    .filter(|index| *index <= rules.len())
                    .ok_or_else(|| BotError::not_found(format!("number {n} is too high")))?;

                if index == rules.len() {
                    rules.push(text.clone());
                    Ok(RuleOutcome::changed(format!("Added rule #{n}: {text}")))
                } else {
                    let old = std::mem::replace(&mut rules[index], text.clone());
                    Ok(RuleOutcome::changed(format!(
                        "Replaced rule #{n}.\n\nOld: {old}\nNew: {text}"
                    )))
                }
            }
            Self::Delete(n) => {
                let index = existing_index(*n, rules.len())
                    .ok_or_else(|| BotError::not_found(format!("rule {n} not found")))?;
                let removed = rules.remove(index);
                Ok(RuleOutcome::changed(format!("Deleted rule #{n}: {removed}")))
            }
            Self::Move(n, o) => {
                let from = existing_index(*n, rules.len()).ok_or_else(|| {
                    BotError::not_found(format!("invalid \"from\" position: {n}"))
                })?;
                let to = existing_index(*o, rules.len()).ok_or_else(|| {
                    BotError::not_found(format!("invalid \"to\" position: {o}"))
                })?;

                if from == to {
                    return Ok(RuleOutcome::read("Nothing changed.".to_string()));
                }

                let rule = rules.remove(from);
                rules.insert(to, rule);
                Ok(RuleOutcome::changed(format!(
                    "Moved rule #{n} to position #{o}"
                )))
            }
            Self::Add(text) => {
                rules.push(text.clone());
                Ok(RuleOutcome::changed(format!(
                    "Added rule #{}: {text}",
                    rules.len()
                )))
            }
        }
    }
}

/// Render every rule as `N. text`, one per line
#[must_use]
pub fn list(rules: &[String]) -> String {
    if rules.is_empty() {
        return "No rules defined.".to_string();
    }
    rules
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("{}. {rule}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map a 1-based rule number to an index of an existing rule
fn existing_index(n: i64, len: usize) -> Option<usize> {
    usize::try_from(n.checked_sub(1)?)
        .ok()
        .filter(|index| *index < len)
}

/// Look up the rules cited by number, as `#n. text` lines
///
/// # Errors
/// Returns a not-found error for the first number that has no rule.
pub fn cite(rules: &[String], numbers: &[i64]) -> BotResult<Vec<String>> {
    numbers
        .iter()
        .map(|n| {
            existing_index(*n, rules.len())
                .map(|index| format!("#{n}. {}", rules[index]))
                .ok_or_else(|| BotError::not_found(format!("rule #{n} not found")))
        })
        .collect()
}
