//! General commands: ping, menu, contact, source, jid, uptime.

use super::{Category, Command, CommandContext, CommandSpec, Outcome, Registry};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use whiz_core::{
    config::BotConfig,
    error::WhizError,
    message::{MessageContent, OutgoingMessage},
};

pub(super) fn commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Ping),
        Arc::new(Menu),
        Arc::new(Contact),
        Arc::new(Source),
        Arc::new(Jid),
        Arc::new(Uptime),
    ]
}

const fn general(
    name: &'static str,
    aliases: &'static [&'static str],
    description: &'static str,
    usage: &'static str,
) -> CommandSpec {
    CommandSpec {
        name,
        aliases,
        category: Category::General,
        description,
        usage,
        owner_only: false,
        group_only: false,
        admin_only: false,
    }
}

struct Ping;

static PING: CommandSpec = general(
    "ping",
    &["p", "alive"],
    "Checks bot responsiveness and shows uptime.",
    "",
);

#[async_trait]
impl Command for Ping {
    fn spec(&self) -> &CommandSpec {
        &PING
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let text = format!(
            "Pong! 🏓\n*{}* is responsive.\nUptime: {}",
            ctx.config.name,
            ctx.uptime()
        );
        ctx.reply_text(&text).await;
        Ok(Outcome::Done)
    }
}

struct Menu;

static MENU: CommandSpec = general(
    "menu",
    &["help", "commands"],
    "Displays the bot command menu with categories.",
    "",
);

const MENU_RULE_WIDTH: usize = 35;

/// Boxed command menu grouped by category.
pub(super) fn render_menu(config: &BotConfig, registry: &Registry, uptime: &str) -> String {
    let rule = "─".repeat(MENU_RULE_WIDTH);
    let prefix = config.primary_prefix();

    let mut out = format!("╭─⊷ {} v{} ⊶─╮\n", config.name, config.version);
    out.push_str(&format!("│ Owner   : {}\n", config.owner_name));
    out.push_str(&format!("│ Prefix  : {}\n", config.prefixes.join(" ")));
    out.push_str(&format!("│ Uptime  : {uptime}\n"));
    out.push_str(&format!("│ Repo    : {}\n", config.repo_url));
    out.push_str(&format!("│ Group   : {}\n", config.group_url));
    out.push_str(&format!("├{rule}┤\n"));
    out.push_str("│ *Available Commands:*\n");

    for category in Category::ORDER {
        let mut specs = registry
            .specs()
            .filter(|s| s.category == category)
            .peekable();
        if specs.peek().is_none() {
            continue;
        }
        out.push_str(&format!("├─⊷ {} ⊶─┤\n", category.title().to_uppercase()));
        for spec in specs {
            let args = if spec.usage.is_empty() {
                String::new()
            } else {
                format!(" {}", spec.usage)
            };
            out.push_str(&format!(
                "│ {prefix}{}{args} - {}\n",
                spec.name, spec.description
            ));
        }
    }

    out.push_str("├─⊷ AUTOMATIC FEATURES ⊶─┤\n");
    out.push_str("│ 🔥 Auto Like Statuses\n");
    out.push_str(&format!("╰{rule}╯\n"));
    out.push_str(&format!("╰─⊷ Have fun using {}! ⊶─╯", config.name));
    out
}

#[async_trait]
impl Command for Menu {
    fn spec(&self) -> &CommandSpec {
        &MENU
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let menu = render_menu(ctx.config, ctx.registry, &ctx.uptime());
        ctx.send(OutgoingMessage::text(&ctx.msg.chat, menu)).await?;
        info!("sent menu to {}", ctx.msg.chat);
        Ok(Outcome::Done)
    }
}

struct Contact;

static CONTACT: CommandSpec = general("contact", &[], "Get owner & group information.", "");

pub(super) fn owner_vcard(owner_name: &str, number: &str) -> String {
    format!(
        "BEGIN:VCARD\nVERSION:3.0\nFN:{owner_name}\nTEL;type=CELL;type=VOICE;waid={number}:{owner_name} Contact\nEND:VCARD"
    )
}

#[async_trait]
impl Command for Contact {
    fn spec(&self) -> &CommandSpec {
        &CONTACT
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let number = &ctx.config.owner_number;
        if number.is_empty() {
            ctx.reply_text("Owner contact information is not configured.")
                .await;
            return Ok(Outcome::Done);
        }

        let card = OutgoingMessage::new(
            &ctx.msg.chat,
            MessageContent::Contact {
                display_name: format!("{} (Owner WHIZ-MD)", ctx.config.owner_name),
                vcard: owner_vcard(&ctx.config.owner_name, number),
            },
        );
        ctx.send(card).await?;

        let follow_up = format!(
            "For community support or further questions, you can also join our WhatsApp group:\n{}{}",
            ctx.config.group_url,
            ctx.reply.footer()
        );
        ctx.send(OutgoingMessage::text(&ctx.msg.chat, follow_up))
            .await?;
        Ok(Outcome::Done)
    }
}

struct Source;

static SOURCE: CommandSpec = general(
    "source",
    &["repo", "github"],
    "Get the link to the bot's source code repository.",
    "",
);

#[async_trait]
impl Command for Source {
    fn spec(&self) -> &CommandSpec {
        &SOURCE
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let text = format!(
            "You can find my source code, star the repo, and contribute at:\n{}",
            ctx.config.repo_url
        );
        ctx.reply_text(&text).await;
        Ok(Outcome::Done)
    }
}

struct Jid;

static JID: CommandSpec = general(
    "jid",
    &[],
    "Get JID of current chat and/or quoted user.",
    "(optional: reply to a message)",
);

#[async_trait]
impl Command for Jid {
    fn spec(&self) -> &CommandSpec {
        &JID
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let mut text = format!("💬 *Chat JID:*\n`{}`", ctx.msg.chat);
        if let Some(participant) = ctx.msg.quoted.as_ref().and_then(|q| q.participant.as_ref()) {
            text.push_str(&format!("\n👤 *Quoted User JID:*\n`{participant}`"));
        }
        ctx.reply_text(&text).await;
        Ok(Outcome::Done)
    }
}

struct Uptime;

static UPTIME: CommandSpec = general("uptime", &[], "Show how long the bot has been running.", "");

#[async_trait]
impl Command for Uptime {
    fn spec(&self) -> &CommandSpec {
        &UPTIME
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let text = format!("📈 *{} Uptime:*\n{}", ctx.config.name, ctx.uptime());
        ctx.reply_text(&text).await;
        Ok(Outcome::Done)
    }
}
