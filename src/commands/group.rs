//! Group admin commands: promote, demote, kick, grouplink, groupinfo.

use super::{Category, Command, CommandContext, CommandSpec, Outcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use whiz_core::{
    error::WhizError,
    message::{jid_user, GroupMetadata, IncomingMessage, OutgoingMessage, ParticipantAction},
};

pub(super) fn commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Participants::PROMOTE),
        Arc::new(Participants::DEMOTE),
        Arc::new(Participants::KICK),
        Arc::new(GroupLink),
        Arc::new(GroupInfo),
    ]
}

/// Users a group command acts on: mentioned users, else the author of the replied message.
pub(super) fn targets(msg: &IncomingMessage) -> Vec<String> {
    if !msg.mentions.is_empty() {
        return msg.mentions.clone();
    }
    msg.quoted
        .as_ref()
        .and_then(|q| q.participant.clone())
        .into_iter()
        .collect()
}

fn mention_list(jids: &[String]) -> String {
    jids.iter()
        .map(|j| format!("@{}", jid_user(j)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Promote, demote or remove participants.
struct Participants {
    spec: CommandSpec,
    action: ParticipantAction,
    done: &'static str,
}

impl Participants {
    const PROMOTE: Participants = Participants {
        spec: CommandSpec {
            name: "promote",
            aliases: &[],
            category: Category::GroupAdmin,
            description: "Promote user to admin.",
            usage: "@user",
            owner_only: false,
            group_only: true,
            admin_only: true,
        },
        action: ParticipantAction::Promote,
        done: "👑 Promoted",
    };
    const DEMOTE: Participants = Participants {
        spec: CommandSpec {
            name: "demote",
            aliases: &[],
            category: Category::GroupAdmin,
            description: "Demote an admin to member.",
            usage: "@user",
            owner_only: false,
            group_only: true,
            admin_only: true,
        },
        action: ParticipantAction::Demote,
        done: "⬇️ Demoted",
    };
    const KICK: Participants = Participants {
        spec: CommandSpec {
            name: "kick",
            aliases: &["remove"],
            category: Category::GroupAdmin,
            description: "Remove a user from the group.",
            usage: "@user",
            owner_only: false,
            group_only: true,
            admin_only: true,
        },
        action: ParticipantAction::Remove,
        done: "👋 Removed",
    };
}

#[async_trait]
impl Command for Participants {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let targets = targets(ctx.msg);
        if targets.is_empty() {
            ctx.reply_text(&format!(
                "⚠️ Usage: {}{} @user (or reply to their message)",
                ctx.config.primary_prefix(),
                self.spec.name
            ))
            .await;
            return Ok(Outcome::Done);
        }

        match ctx
            .transport
            .update_participants(&ctx.msg.chat, &targets, self.action)
            .await
        {
            Ok(()) => {
                info!(
                    "{} {} in {}",
                    self.action.as_str(),
                    targets.join(", "),
                    ctx.msg.chat
                );
                let text = format!("{} {}", self.done, mention_list(&targets));
                ctx.send(
                    OutgoingMessage::text(&ctx.msg.chat, text)
                        .quoting(Some(ctx.msg.key()))
                        .mentioning(targets),
                )
                .await?;
            }
            Err(e) => {
                warn!("group {} failed: {e}", self.action.as_str());
                ctx.reply_text(&format!(
                    "❌ Failed to {} {}.",
                    self.action.as_str(),
                    mention_list(&targets)
                ))
                .await;
            }
        }
        Ok(Outcome::Done)
    }
}

struct GroupLink;

static GROUPLINK: CommandSpec = CommandSpec {
    name: "grouplink",
    aliases: &["link"],
    category: Category::GroupAdmin,
    description: "Get the group's invite link.",
    usage: "",
    owner_only: false,
    group_only: true,
    admin_only: true,
};

#[async_trait]
impl Command for GroupLink {
    fn spec(&self) -> &CommandSpec {
        &GROUPLINK
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let code = ctx.transport.group_invite_code(&ctx.msg.chat).await?;
        ctx.reply_text(&format!(
            "🔗 *Group link:*\nhttps://chat.whatsapp.com/{code}"
        ))
        .await;
        Ok(Outcome::Done)
    }
}

struct GroupInfo;

static GROUPINFO: CommandSpec = CommandSpec {
    name: "groupinfo",
    aliases: &["ginfo"],
    category: Category::GroupAdmin,
    description: "Show group details.",
    usage: "",
    owner_only: false,
    group_only: true,
    admin_only: false,
};

pub(super) fn render_group_info(meta: &GroupMetadata) -> String {
    let mut out = format!("👥 *{}*\n", meta.subject);
    if let Some(desc) = meta.description.as_deref().filter(|d| !d.is_empty()) {
        out.push_str(&format!("📝 {desc}\n"));
    }
    if let Some(owner) = &meta.owner {
        out.push_str(&format!("👑 Owner: @{}\n", jid_user(owner)));
    }
    if let Some(created) = meta.created_at {
        out.push_str(&format!("📅 Created: {}\n", created.format("%Y-%m-%d")));
    }
    out.push_str(&format!("👤 Members: {}\n", meta.participants.len()));
    out.push_str(&format!("🛡️ Admins: {}", meta.admin_count()));
    out
}

#[async_trait]
impl Command for GroupInfo {
    fn spec(&self) -> &CommandSpec {
        &GROUPINFO
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let meta = ctx.transport.group_metadata(&ctx.msg.chat).await?;
        ctx.reply_text(&render_group_info(&meta)).await;
        Ok(Outcome::Done)
    }
}
