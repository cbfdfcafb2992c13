use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Pseudo-chat carrying contacts' status updates.
pub const STATUS_BROADCAST_JID: &str = "status@broadcast";

/// Server suffix of group JIDs.
pub const GROUP_SERVER: &str = "g.us";

/// Whether a JID string addresses a group.
pub fn is_group_jid(jid: &str) -> bool {
    jid.rsplit_once('@')
        .is_some_and(|(_, server)| server == GROUP_SERVER)
}

/// User part of a JID (`254700000001:12@s.whatsapp.net` → `254700000001`).
pub fn jid_user(jid: &str) -> &str {
    let user = jid.split('@').next().unwrap_or(jid);
    user.split(':').next().unwrap_or(user)
}

/// An incoming message from the transport.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Transport message ID.
    pub id: String,
    /// Chat the message arrived in (user, group or status broadcast).
    pub chat: String,
    /// Full JID of the author.
    pub sender: String,
    /// Phone number of the author (JID user part).
    pub sender_number: String,
    pub push_name: Option<String>,
    /// Text body or media caption.
    pub text: String,
    pub is_group: bool,
    pub from_me: bool,
    pub timestamp: DateTime<Utc>,
    /// Media carried by this message itself.
    pub media: Option<MediaAttachment>,
    /// The message this one replies to.
    pub quoted: Option<QuotedMessage>,
    /// JIDs mentioned with `@`.
    pub mentions: Vec<String>,
}

impl IncomingMessage {
    /// Whether this arrived through the status broadcast pseudo-chat.
    pub fn is_status(&self) -> bool {
        self.chat == STATUS_BROADCAST_JID
    }

    /// Key addressing this message, for quoting and reactions.
    pub fn key(&self) -> MessageKey {
        MessageKey {
            chat: self.chat.clone(),
            id: self.id.clone(),
            from_me: self.from_me,
            participant: self.is_group.then(|| self.sender.clone()),
        }
    }
}

/// The message an incoming message replies to.
#[derive(Debug, Clone)]
pub struct QuotedMessage {
    pub id: String,
    /// Author of the quoted message, when the transport reports it.
    pub participant: Option<String>,
    pub text: Option<String>,
    pub media: Option<MediaAttachment>,
}

/// Kinds of media the bot handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
    Sticker,
    Audio,
    Document,
}

/// Media attached to a message, downloadable through the transport.
#[derive(Debug, Clone)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub mimetype: Option<String>,
    pub caption: Option<String>,
    /// Duration for audio/video.
    pub seconds: Option<u32>,
    /// Animated sticker.
    pub is_animated: bool,
    /// Wrapped in a view-once envelope.
    pub view_once: bool,
    pub handle: MediaHandle,
}

/// Opaque transport-owned token used to download a media attachment.
#[derive(Clone)]
pub struct MediaHandle(Arc<dyn Any + Send + Sync>);

impl MediaHandle {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    /// Downcast to the transport's concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MediaHandle(..)")
    }
}

/// Addresses a single message in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    pub chat: String,
    pub id: String,
    pub from_me: bool,
    /// Author inside a group.
    pub participant: Option<String>,
}

/// Payload of an outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Image {
        data: Vec<u8>,
        mimetype: String,
        caption: Option<String>,
    },
    Video {
        data: Vec<u8>,
        mimetype: String,
        caption: Option<String>,
        gif_playback: bool,
    },
    Sticker {
        data: Vec<u8>,
        animated: bool,
    },
    Contact {
        display_name: String,
        vcard: String,
    },
    Reaction {
        target: MessageKey,
        emoji: String,
    },
    Delete {
        target: MessageKey,
    },
}

/// An outgoing message to send through the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub chat: String,
    pub content: MessageContent,
    /// Message to quote in the reply.
    pub quoted: Option<MessageKey>,
    pub mentions: Vec<String>,
}

impl OutgoingMessage {
    pub fn new(chat: impl Into<String>, content: MessageContent) -> Self {
        Self {
            chat: chat.into(),
            content,
            quoted: None,
            mentions: Vec::new(),
        }
    }

    pub fn text(chat: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(chat, MessageContent::Text(text.into()))
    }

    pub fn quoting(mut self, key: Option<MessageKey>) -> Self {
        self.quoted = key;
        self
    }

    pub fn mentioning(mut self, mentions: Vec<String>) -> Self {
        self.mentions = mentions;
        self
    }

    /// Text body or caption, if any.
    pub fn body(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            MessageContent::Image { caption, .. } | MessageContent::Video { caption, .. } => {
                caption.as_deref()
            }
            _ => None,
        }
    }
}

/// Group metadata as reported by the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub jid: String,
    pub subject: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub participants: Vec<GroupParticipant>,
}

impl GroupMetadata {
    /// Participant entry for a JID, compared by user part.
    pub fn participant(&self, jid: &str) -> Option<&GroupParticipant> {
        let user = jid_user(jid);
        self.participants.iter().find(|p| jid_user(&p.jid) == user)
    }

    pub fn is_admin(&self, jid: &str) -> bool {
        self.participant(jid).is_some_and(GroupParticipant::has_admin_rank)
    }

    pub fn admin_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.has_admin_rank())
            .count()
    }
}

/// A member of a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupParticipant {
    pub jid: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

impl GroupParticipant {
    pub fn has_admin_rank(&self) -> bool {
        self.is_admin || self.is_super_admin
    }
}

/// Participant changes applied by group admin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantAction {
    Promote,
    Demote,
    Remove,
}

impl ParticipantAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Promote => "promote",
            Self::Demote => "demote",
            Self::Remove => "remove",
        }
    }
}
