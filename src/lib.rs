pub mod args;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod guilds;
pub mod handlers;
pub mod logging;
pub mod mute;
pub mod platform;
pub mod rules;
pub mod scheduler;

pub const BOT_NAME: &str = "wirebot";
pub const COMMAND_TARGET: &str = "wirebot::command";
pub const ERROR_TARGET: &str = "wirebot::error";
pub const EVENT_TARGET: &str = "wirebot::handlers";
pub const SCHEDULER_TARGET: &str = "wirebot::scheduler";
pub const CONSOLE_TARGET: &str = "wirebot";

pub use data::{Data, DataInner, State, StateStore};
pub use error::{BotError, BotResult};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
