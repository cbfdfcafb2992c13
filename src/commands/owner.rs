//! Owner-only commands: delete, broadcast, restart.

use super::{Category, Command, CommandContext, CommandSpec, Outcome};
use crate::reply::ReplyOptions;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use whiz_core::{
    error::WhizError,
    message::{jid_user, MessageContent, MessageKey, OutgoingMessage},
};

pub(super) fn commands() -> Vec<Arc<dyn Command>> {
    vec![Arc::new(Delete), Arc::new(Broadcast), Arc::new(Restart)]
}

const fn owner(
    name: &'static str,
    aliases: &'static [&'static str],
    description: &'static str,
    usage: &'static str,
) -> CommandSpec {
    CommandSpec {
        name,
        aliases,
        category: Category::OwnerOnly,
        description,
        usage,
        owner_only: true,
        group_only: false,
        admin_only: false,
    }
}

struct Delete;

static DELETE: CommandSpec = owner(
    "delete",
    &["del", "d"],
    "Deletes a message previously sent by the bot.",
    "(reply to the bot's message)",
);

#[async_trait]
impl Command for Delete {
    fn spec(&self) -> &CommandSpec {
        &DELETE
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let Some(quoted) = ctx.msg.quoted.as_ref() else {
            warn!("delete used without replying to a message");
            return Ok(Outcome::Done);
        };
        let Some(bot_jid) = ctx.transport.own_jid().await else {
            warn!("delete: own JID unknown");
            return Ok(Outcome::Done);
        };
        let authored_by_bot = quoted
            .participant
            .as_deref()
            .is_some_and(|p| jid_user(p) == jid_user(&bot_jid));
        if !authored_by_bot {
            warn!(
                "delete: quoted message {} is not the bot's (participant {:?})",
                quoted.id, quoted.participant
            );
            return Ok(Outcome::Done);
        }

        let target = MessageKey {
            chat: ctx.msg.chat.clone(),
            id: quoted.id.clone(),
            from_me: true,
            participant: ctx.msg.is_group.then(|| bot_jid.clone()),
        };
        ctx.send(OutgoingMessage::new(
            &ctx.msg.chat,
            MessageContent::Delete { target },
        ))
        .await?;
        info!("deleted bot message {} in {}", quoted.id, ctx.msg.chat);

        ctx.send(OutgoingMessage::new(
            &ctx.msg.chat,
            MessageContent::Reaction {
                target: ctx.msg.key(),
                emoji: "👌".into(),
            },
        ))
        .await?;
        Ok(Outcome::Done)
    }
}

struct Broadcast;

static BROADCAST: CommandSpec = owner(
    "broadcast",
    &["bc"],
    "Send a message to every group the bot is in.",
    "<message>",
);

#[async_trait]
impl Command for Broadcast {
    fn spec(&self) -> &CommandSpec {
        &BROADCAST
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        if ctx.args.is_empty() {
            ctx.reply_with(
                &format!("⚠️ Usage: {}broadcast <message>", ctx.config.primary_prefix()),
                ReplyOptions::quoting(ctx.msg).with_owner_image(),
            )
            .await;
            return Ok(Outcome::Done);
        }

        let groups = ctx.transport.joined_groups().await?;
        let text = format!("📢 *{} Broadcast*\n\n{}", ctx.config.name, ctx.args);
        let delay = Duration::from_millis(ctx.config.broadcast_delay_ms);

        let mut sent = 0;
        for (i, group) in groups.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            match ctx.send(OutgoingMessage::text(group, text.as_str())).await {
                Ok(_) => sent += 1,
                Err(e) => warn!("broadcast to {group} failed: {e}"),
            }
        }
        info!("broadcast delivered to {sent}/{} groups", groups.len());

        ctx.reply_with(
            &format!("✅ Broadcast sent to {sent}/{} groups.", groups.len()),
            ReplyOptions::quoting(ctx.msg).with_owner_image(),
        )
        .await;
        Ok(Outcome::Done)
    }
}

struct Restart;

static RESTART: CommandSpec = owner("restart", &[], "Restart the bot.", "");

#[async_trait]
impl Command for Restart {
    fn spec(&self) -> &CommandSpec {
        &RESTART
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        ctx.reply_with(
            &format!("♻️ Restarting {}...", ctx.config.name),
            ReplyOptions::quoting(ctx.msg).with_owner_image(),
        )
        .await;
        info!("restart requested by {}", ctx.msg.sender);
        Ok(Outcome::Restart)
    }
}
