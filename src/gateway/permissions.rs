//! Permission gate: owner-only, group-only and admin-only checks, in that order.

use crate::commands::CommandSpec;
use tracing::{debug, warn};
use whiz_core::{config::BotConfig, message::IncomingMessage, traits::Transport};

pub(crate) const GROUP_ONLY_TEXT: &str = "This command can only be used in groups.";
pub(crate) const BOT_NOT_ADMIN_TEXT: &str =
    "I need to be a group admin to do that. Please make me an admin first.";
pub(crate) const SENDER_NOT_ADMIN_TEXT: &str = "Only group admins can use this command.";
pub(crate) const METADATA_FAILED_TEXT: &str =
    "Failed to fetch group information. Please try again.";

/// Result of the permission gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Gate {
    Allow,
    /// Denied, with the text to reply (`None` = deny silently).
    Deny(Option<&'static str>),
}

/// Whether the sender is the configured owner. No owner configured = nobody is.
pub(crate) fn is_owner(msg: &IncomingMessage, config: &BotConfig) -> bool {
    !config.owner_number.is_empty() && msg.sender_number == config.owner_number
}

/// Evaluate the command's flags against the message, short-circuiting on the first failure.
pub(crate) async fn check(
    spec: &CommandSpec,
    msg: &IncomingMessage,
    config: &BotConfig,
    transport: &dyn Transport,
) -> Gate {
    if spec.owner_only && !is_owner(msg, config) {
        debug!("{} denied: {} is not the owner", spec.name, msg.sender_number);
        return Gate::Deny(None);
    }

    if (spec.group_only || spec.admin_only) && !msg.is_group {
        return Gate::Deny(Some(GROUP_ONLY_TEXT));
    }

    if spec.admin_only {
        let meta = match transport.group_metadata(&msg.chat).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("group metadata for {} failed: {e}", msg.chat);
                return Gate::Deny(Some(METADATA_FAILED_TEXT));
            }
        };
        let bot_is_admin = match transport.own_jid().await {
            Some(bot) => meta.is_admin(&bot),
            None => false,
        };
        if !bot_is_admin {
            return Gate::Deny(Some(BOT_NOT_ADMIN_TEXT));
        }
        if config.require_sender_admin && !meta.is_admin(&msg.sender) {
            return Gate::Deny(Some(SENDER_NOT_ADMIN_TEXT));
        }
    }

    Gate::Allow
}
