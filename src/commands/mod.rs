//! Bot commands: the registry, prefix parsing and the per-invocation context.
//!
//! Each command is a unit struct implementing [`Command`]; the registry is
//! built once at startup from the category modules below.

mod fun;
mod general;
mod group;
mod media;
mod owner;
mod search;
mod utility;


use crate::reply::{Replier, ReplyOptions};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use whiz_core::{
    config::BotConfig,
    error::WhizError,
    format::format_uptime,
    message::{IncomingMessage, OutgoingMessage},
    traits::Transport,
};

pub use utility::evaluate;

/// Menu sections, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    General,
    Media,
    Utility,
    Search,
    Fun,
    GroupAdmin,
    OwnerOnly,
}

impl Category {
    pub const ORDER: [Category; 7] = [
        Category::General,
        Category::Media,
        Category::Utility,
        Category::Search,
        Category::Fun,
        Category::GroupAdmin,
        Category::OwnerOnly,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Media => "Media",
            Self::Utility => "Utility",
            Self::Search => "Search",
            Self::Fun => "Fun",
            Self::GroupAdmin => "Group Admin",
            Self::OwnerOnly => "Owner Only",
        }
    }
}

/// Static description of a command and its permission flags.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub category: Category,
    pub description: &'static str,
    /// Argument hint shown after the command name, empty when it takes none.
    pub usage: &'static str,
    pub owner_only: bool,
    pub group_only: bool,
    /// The bot must be a group admin to carry this out.
    pub admin_only: bool,
}

/// What the gateway should do after a command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Stop the gateway so the process supervisor restarts it.
    Restart,
}

/// Everything a command needs for one invocation.
pub struct CommandContext<'a> {
    pub msg: &'a IncomingMessage,
    /// Keyword as typed (may be an alias).
    pub keyword: &'a str,
    /// Text after the keyword, trimmed.
    pub args: &'a str,
    pub config: &'a BotConfig,
    pub transport: &'a dyn Transport,
    pub reply: &'a Replier,
    pub registry: &'a Registry,
    pub http: &'a reqwest::Client,
    pub started: Instant,
}

impl CommandContext<'_> {
    pub fn uptime(&self) -> String {
        format_uptime(self.started.elapsed())
    }

    /// Formatted reply (footer, logo) quoting the command message.
    pub async fn reply_text(&self, text: &str) {
        self.reply
            .send(&self.msg.chat, text, ReplyOptions::quoting(self.msg))
            .await;
    }

    /// Formatted reply with explicit options.
    pub async fn reply_with(&self, text: &str, options: ReplyOptions) {
        self.reply.send(&self.msg.chat, text, options).await;
    }

    /// Plain text quoting the command message, without footer or image.
    pub async fn reply_plain(&self, text: &str) -> Result<String, WhizError> {
        self.transport
            .send(OutgoingMessage::text(&self.msg.chat, text).quoting(Some(self.msg.key())))
            .await
    }

    /// Raw send into the current chat.
    pub async fn send(&self, message: OutgoingMessage) -> Result<String, WhizError> {
        self.transport.send(message).await
    }
}

/// A bot command.
#[async_trait]
pub trait Command: Send + Sync {
    fn spec(&self) -> &CommandSpec;

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError>;
}

/// Keyword → command lookup, built once at startup.
pub struct Registry {
    commands: Vec<Arc<dyn Command>>,
    index: HashMap<&'static str, usize>,
}

impl Registry {
    /// Build a registry, rejecting any keyword registered twice.
    pub fn new(commands: Vec<Arc<dyn Command>>) -> Result<Self, WhizError> {
        let mut index = HashMap::new();
        for (i, cmd) in commands.iter().enumerate() {
            let spec = cmd.spec();
            for key in std::iter::once(&spec.name).chain(spec.aliases.iter()) {
                if let Some(prev) = index.insert(*key, i) {
                    return Err(WhizError::Command(format!(
                        "duplicate command keyword '{key}' ({} and {})",
                        commands[prev].spec().name,
                        spec.name
                    )));
                }
            }
        }
        Ok(Self { commands, index })
    }

    /// Registry with every built-in command.
    pub fn builtin() -> Result<Self, WhizError> {
        let mut commands: Vec<Arc<dyn Command>> = Vec::new();
        commands.extend(general::commands());
        commands.extend(media::commands());
        commands.extend(utility::commands());
        commands.extend(search::commands());
        commands.extend(fun::commands());
        commands.extend(group::commands());
        commands.extend(owner::commands());
        Self::new(commands)
    }

    pub fn lookup(&self, keyword: &str) -> Option<Arc<dyn Command>> {
        self.index.get(keyword).map(|&i| self.commands[i].clone())
    }

    /// Specs in registration order.
    pub fn specs(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter().map(|c| c.spec())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A command invocation parsed from message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub prefix: &'a str,
    /// Lower-cased keyword.
    pub keyword: String,
    pub args: &'a str,
}

/// Parse `text` against the prefixes in order; the first matching prefix wins.
///
/// Returns `None` for text without a prefix, or a prefix with no keyword.
pub fn parse_command<'a>(text: &'a str, prefixes: &'a [String]) -> Option<ParsedCommand<'a>> {
    let text = text.trim_start();
    let (prefix, rest) = prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|p| text.strip_prefix(p.as_str()).map(|rest| (p.as_str(), rest)))?;

    let (keyword, args) = match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], rest[i..].trim()),
        None => (rest, ""),
    };
    if keyword.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        prefix,
        keyword: keyword.to_lowercase(),
        args,
    })
}
