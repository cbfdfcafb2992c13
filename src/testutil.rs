//! Test doubles shared by the command, gateway and API tests.

use async_trait::async_trait;
use chrono::Utc;
use std::any::Any;
use std::sync::{Arc, Mutex};
use whiz_core::{
    config::BotConfig,
    error::WhizError,
    message::{
        is_group_jid, jid_user, GroupMetadata, GroupParticipant, IncomingMessage,
        MediaAttachment, OutgoingMessage, ParticipantAction,
    },
    traits::Transport,
};

pub const OWNER: &str = "254700000001";
pub const BOT: &str = "254799999999";
pub const GROUP: &str = "120363001234567890@g.us";

pub fn user_jid(number: &str) -> String {
    format!("{number}@s.whatsapp.net")
}

/// A transport that records everything sent through it.
pub struct MockTransport {
    pub sent: Arc<Mutex<Vec<OutgoingMessage>>>,
    pub updates: Arc<Mutex<Vec<(String, Vec<String>, ParticipantAction)>>>,
    pub own: Option<String>,
    pub group: Option<GroupMetadata>,
    pub groups: Vec<String>,
    pub media: Vec<u8>,
    /// When true, `send()` returns an error.
    pub fail_send: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            updates: Arc::new(Mutex::new(Vec::new())),
            own: Some(user_jid(BOT)),
            group: None,
            groups: Vec::new(),
            media: Vec::new(),
            fail_send: false,
        }
    }
}

impl MockTransport {
    /// Group where the listed numbers are admins.
    pub fn with_group(mut self, admins: &[&str], members: &[&str]) -> Self {
        let mut participants: Vec<GroupParticipant> = admins
            .iter()
            .map(|n| GroupParticipant {
                jid: user_jid(n),
                is_admin: true,
                is_super_admin: false,
            })
            .collect();
        participants.extend(members.iter().map(|n| GroupParticipant {
            jid: user_jid(n),
            ..Default::default()
        }));
        self.group = Some(GroupMetadata {
            jid: GROUP.into(),
            subject: "Rustaceans".into(),
            participants,
            ..Default::default()
        });
        self
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Bodies of sent text messages and captions.
    pub fn bodies(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|m| m.body().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, WhizError> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<String, WhizError> {
        if self.fail_send {
            return Err(WhizError::Transport("connection reset".to_string()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message);
        Ok(format!("MOCK{}", sent.len()))
    }

    async fn download(&self, _media: &MediaAttachment) -> Result<Vec<u8>, WhizError> {
        Ok(self.media.clone())
    }

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, WhizError> {
        self.group
            .clone()
            .filter(|g| g.jid == group)
            .ok_or_else(|| WhizError::Transport(format!("unknown group {group}")))
    }

    async fn update_participants(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), WhizError> {
        self.updates
            .lock()
            .unwrap()
            .push((group.to_string(), participants.to_vec(), action));
        Ok(())
    }

    async fn group_invite_code(&self, _group: &str) -> Result<String, WhizError> {
        Ok("AbCdEf123".into())
    }

    async fn joined_groups(&self) -> Result<Vec<String>, WhizError> {
        Ok(self.groups.clone())
    }

    async fn wait_connected(&self) {}

    async fn own_jid(&self) -> Option<String> {
        self.own.clone()
    }

    async fn stop(&self) -> Result<(), WhizError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Config with an owner, no branding images and a zero broadcast delay.
pub fn test_config() -> BotConfig {
    BotConfig {
        owner_number: OWNER.into(),
        logo_url: None,
        owner_image_url: None,
        broadcast_delay_ms: 0,
        ..Default::default()
    }
}

/// A text message from `sender_number` in `chat`.
pub fn incoming(chat: &str, sender_number: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: "3EB0C0FFEE".into(),
        chat: chat.into(),
        sender: user_jid(sender_number),
        sender_number: jid_user(&user_jid(sender_number)).to_string(),
        push_name: Some("Tester".into()),
        text: text.into(),
        is_group: is_group_jid(chat),
        from_me: false,
        timestamp: Utc::now(),
        media: None,
        quoted: None,
        mentions: Vec::new(),
    }
}
