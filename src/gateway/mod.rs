//! Gateway: the main event loop connecting the transport to the commands.
//!
//! Includes: prefix routing, the permission gate, passive status reactions,
//! the startup notification and graceful shutdown.

pub(crate) mod permissions;

#[cfg(test)]
mod tests;

use crate::commands::{parse_command, CommandContext, Outcome, Registry};
use crate::reply::Replier;
use permissions::Gate;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};
use whiz_core::{
    config::BotConfig,
    format::format_uptime,
    message::{jid_user, IncomingMessage, MessageContent, MessageKey, OutgoingMessage},
    traits::Transport,
};

/// Why the gateway stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Ctrl-C.
    Signal,
    /// The `restart` command; the supervisor should start a fresh process.
    Restart,
    /// The transport closed its message stream.
    TransportClosed,
}

/// Routes inbound messages to commands.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    config: BotConfig,
    registry: Registry,
    reply: Replier,
    http: reqwest::Client,
    started: Instant,
    /// Chats with a message in flight, and what arrived meanwhile.
    active_chats: Mutex<HashMap<String, VecDeque<IncomingMessage>>>,
    restart: Notify,
}

impl Gateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: BotConfig,
        registry: Registry,
        http: reqwest::Client,
        started: Instant,
    ) -> Self {
        let reply = Replier::new(transport.clone(), &config, http.clone());
        Self {
            transport,
            config,
            registry,
            reply,
            http,
            started,
            active_chats: Mutex::new(HashMap::new()),
            restart: Notify::new(),
        }
    }

    /// Run the main event loop until Ctrl-C, a restart request or transport shutdown.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<Shutdown> {
        info!(
            "{} gateway running | transport: {} | commands: {} | prefixes: {}",
            self.config.name,
            self.transport.name(),
            self.registry.len(),
            self.config.prefixes.join(" "),
        );

        let mut rx = self
            .transport
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start transport {}: {e}", self.transport.name()))?;

        let notify_gw = self.clone();
        let notify_handle = tokio::spawn(async move {
            notify_gw.send_startup_notification().await;
        });

        let reason = loop {
            tokio::select! {
                incoming = rx.recv() => match incoming {
                    Some(incoming) => {
                        let gw = self.clone();
                        tokio::spawn(async move {
                            gw.dispatch_message(incoming).await;
                        });
                    }
                    None => {
                        warn!("transport message stream closed");
                        break Shutdown::TransportClosed;
                    }
                },
                _ = self.restart.notified() => {
                    info!("Restart requested");
                    break Shutdown::Restart;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break Shutdown::Signal;
                }
            }
        };

        info!("Shutting down...");
        notify_handle.abort();
        if let Err(e) = self.transport.stop().await {
            warn!("failed to stop transport {}: {e}", self.transport.name());
        }
        info!("Shutdown complete.");
        Ok(reason)
    }

    /// Dispatch a message: buffer it if its chat is busy (when serializing), otherwise handle it.
    async fn dispatch_message(self: Arc<Self>, incoming: IncomingMessage) {
        if !self.config.serialize_per_chat {
            self.handle_message(incoming).await;
            return;
        }

        let chat = incoming.chat.clone();
        {
            let mut active = self.active_chats.lock().await;
            if let Some(queue) = active.get_mut(&chat) {
                debug!("buffered message {} for busy chat {chat}", incoming.id);
                queue.push_back(incoming);
                return;
            }
            active.insert(chat.clone(), VecDeque::new());
        }

        self.handle_message(incoming).await;

        loop {
            let next = {
                let mut active = self.active_chats.lock().await;
                match active.get_mut(&chat).and_then(VecDeque::pop_front) {
                    Some(msg) => Some(msg),
                    None => {
                        active.remove(&chat);
                        None
                    }
                }
            };
            match next {
                Some(buffered) => self.handle_message(buffered).await,
                None => break,
            }
        }
    }

    /// Handle one inbound message: passive behaviours, then command dispatch.
    pub(crate) async fn handle_message(&self, msg: IncomingMessage) {
        if msg.is_status() {
            self.react_to_status(&msg).await;
            return;
        }

        if msg.from_me && !self.is_owner_chat(&msg.chat).await {
            return;
        }

        let Some(parsed) = parse_command(&msg.text, &self.config.prefixes) else {
            return;
        };
        let Some(command) = self.registry.lookup(&parsed.keyword) else {
            debug!("unknown command '{}' from {}", parsed.keyword, msg.sender);
            return;
        };
        let spec = command.spec();

        match permissions::check(spec, &msg, &self.config, self.transport.as_ref()).await {
            Gate::Allow => {}
            Gate::Deny(None) => {
                info!("{} denied for {}", spec.name, msg.sender);
                return;
            }
            Gate::Deny(Some(text)) => {
                info!("{} denied for {}: {text}", spec.name, msg.sender);
                self.reply
                    .send(&msg.chat, text, crate::reply::ReplyOptions::quoting(&msg))
                    .await;
                return;
            }
        }

        info!(
            "[{}] {} from {} in {}",
            spec.name,
            parsed.args,
            msg.sender,
            msg.chat
        );
        let ctx = CommandContext {
            msg: &msg,
            keyword: &parsed.keyword,
            args: parsed.args,
            config: &self.config,
            transport: self.transport.as_ref(),
            reply: &self.reply,
            registry: &self.registry,
            http: &self.http,
            started: self.started,
        };

        match command.execute(&ctx).await {
            Ok(Outcome::Done) => {}
            Ok(Outcome::Restart) => self.restart.notify_one(),
            Err(e) => {
                error!("command {} failed: {e}", spec.name);
                let text = format!("⚠️ An error occurred while running `{}`.", spec.name);
                let out = OutgoingMessage::text(&msg.chat, text).quoting(Some(msg.key()));
                if let Err(e) = self.transport.send(out).await {
                    error!("failed to report command error: {e}");
                }
            }
        }
    }

    /// React 🔥 to a contact's status update.
    async fn react_to_status(&self, msg: &IncomingMessage) {
        if !self.config.auto_like_status || msg.from_me {
            return;
        }
        let target = MessageKey {
            chat: msg.chat.clone(),
            id: msg.id.clone(),
            from_me: false,
            participant: Some(msg.sender.clone()),
        };
        let reaction = OutgoingMessage::new(
            &msg.chat,
            MessageContent::Reaction {
                target,
                emoji: "🔥".into(),
            },
        );
        match self.transport.send(reaction).await {
            Ok(_) => debug!("liked status {} from {}", msg.id, msg.sender),
            Err(e) => warn!("failed to react to status from {}: {e}", msg.sender),
        }
    }

    /// The owner's own chat ("Message yourself"), where the bot's own messages are commands.
    async fn is_owner_chat(&self, chat: &str) -> bool {
        let user = jid_user(chat);
        if !self.config.owner_number.is_empty() && user == self.config.owner_number {
            return true;
        }
        match self.transport.own_jid().await {
            Some(own) => jid_user(&own) == user,
            None => false,
        }
    }

    /// Tell the bot's own number that it is up, once connected.
    async fn send_startup_notification(&self) {
        self.transport.wait_connected().await;
        let Some(own) = self.transport.own_jid().await else {
            warn!("Could not send startup message: own JID unknown");
            return;
        };
        let text = startup_text(&self.config, &format_uptime(self.started.elapsed()));
        match self.transport.send(OutgoingMessage::text(&own, text)).await {
            Ok(_) => info!("Startup notification sent to {own}"),
            Err(e) => error!("Failed to send startup notification: {e}"),
        }
    }
}

pub(crate) fn startup_text(config: &BotConfig, uptime: &str) -> String {
    format!(
        "Hello {} 🤗\nYour Bot is running perfectly 💥\nRepo: {}\nUptime: {uptime}",
        config.owner_name, config.repo_url
    )
}
