//! Incoming WhatsApp message handling: unwrapping, normalization and forwarding.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use waproto::whatsapp::{self as wa, message as wam};
use whiz_core::message::{
    is_group_jid, IncomingMessage, MediaAttachment, MediaHandle, MediaKind, QuotedMessage,
    STATUS_BROADCAST_JID,
};

/// IDs of recent sends whose echo may still arrive, oldest evicted first.
#[derive(Debug)]
pub(super) struct SentIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SentIds {
    pub const CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Whether sends to `chat` can echo back as our own messages.
    ///
    /// Group and status sends never come back through the event stream.
    pub fn tracks(chat: &str) -> bool {
        !is_group_jid(chat) && chat != STATUS_BROADCAST_JID
    }

    pub fn record(&mut self, id: String) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    /// Forget `id`, returning whether it was a recorded send.
    pub fn take(&mut self, id: &str) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.order.retain(|i| i != id);
        true
    }
}

impl Default for SentIds {
    fn default() -> Self {
        Self::new(Self::CAPACITY)
    }
}

/// The protocol message behind a [`MediaHandle`], kept for download.
#[derive(Debug, Clone)]
pub(super) enum WaMedia {
    Image(wam::ImageMessage),
    Video(wam::VideoMessage),
    Sticker(wam::StickerMessage),
    Audio(wam::AudioMessage),
    Document(wam::DocumentMessage),
}

/// Text, media and reply context pulled out of a protocol message.
#[derive(Debug, Default)]
pub(super) struct Extracted {
    pub text: String,
    pub media: Option<MediaAttachment>,
    pub quoted: Option<QuotedMessage>,
    pub mentions: Vec<String>,
}

/// Process an incoming WhatsApp message event and forward it to the gateway.
pub(super) async fn handle_whatsapp_message(
    msg: wa::Message,
    info: wacore::types::message::MessageInfo,
    tx: &mpsc::Sender<IncomingMessage>,
    sent_ids: &Arc<Mutex<SentIds>>,
) {
    let msg_id = info.id.clone();

    // Our own sends echo back; only forward messages typed on the phone.
    if info.source.is_from_me && sent_ids.lock().await.take(&msg_id) {
        debug!("skipping own echo: {msg_id}");
        return;
    }

    let extracted = extract(&msg);
    let chat = info.source.chat.to_string();
    let is_status = chat == STATUS_BROADCAST_JID;
    if extracted.text.is_empty() && extracted.media.is_none() && !is_status {
        debug!("WA filtered: no text or media in {msg_id}");
        return;
    }

    debug!(
        "WA msg: is_group={}, is_from_me={}, sender={}, chat={}",
        info.source.is_group, info.source.is_from_me, info.source.sender.user, chat,
    );

    let incoming = IncomingMessage {
        id: msg_id,
        chat,
        sender: info.source.sender.to_string(),
        sender_number: info.source.sender.user.clone(),
        push_name: (!info.push_name.is_empty()).then(|| info.push_name.clone()),
        text: extracted.text,
        is_group: info.source.is_group,
        from_me: info.source.is_from_me,
        timestamp: chrono::Utc::now(),
        media: extracted.media,
        quoted: extracted.quoted,
        mentions: extracted.mentions,
    };

    if tx.send(incoming).await.is_err() {
        info!("whatsapp transport receiver dropped");
    }
}

/// Peel off device-sent, ephemeral and view-once envelopes.
///
/// Returns the innermost message and whether a view-once envelope was seen.
pub(super) fn unwrap_message(msg: &wa::Message) -> (&wa::Message, bool) {
    let mut current = msg;
    let mut view_once = false;
    // Envelopes can nest (ephemeral → view-once); bound the walk.
    for _ in 0..4 {
        if let Some(inner) = current
            .device_sent_message
            .as_ref()
            .and_then(|d| d.message.as_deref())
        {
            current = inner;
            continue;
        }
        if let Some(inner) = current
            .ephemeral_message
            .as_ref()
            .and_then(|e| e.message.as_deref())
        {
            current = inner;
            continue;
        }
        if let Some(inner) = current
            .view_once_message
            .as_ref()
            .or(current.view_once_message_v2.as_ref())
            .and_then(|v| v.message.as_deref())
        {
            view_once = true;
            current = inner;
            continue;
        }
        break;
    }
    (current, view_once)
}

/// Normalize a protocol message into text, media and reply context.
pub(super) fn extract(msg: &wa::Message) -> Extracted {
    let (inner, wrapped_view_once) = unwrap_message(msg);

    let mut out = Extracted {
        text: body_text(inner).unwrap_or_default(),
        media: media_of(inner, wrapped_view_once),
        ..Default::default()
    };

    if let Some(ctx) = context_of(inner) {
        out.mentions = ctx.mentioned_jid.clone();
        if let Some(stanza_id) = ctx.stanza_id.clone().filter(|s| !s.is_empty()) {
            let quoted_msg = ctx.quoted_message.as_deref();
            out.quoted = Some(QuotedMessage {
                id: stanza_id,
                participant: ctx.participant.clone().filter(|p| !p.is_empty()),
                text: quoted_msg.and_then(|m| {
                    let (q, _) = unwrap_message(m);
                    body_text(q)
                }),
                media: quoted_msg.and_then(|m| {
                    let (q, view_once) = unwrap_message(m);
                    media_of(q, view_once)
                }),
            });
        }
    }

    out
}

fn body_text(msg: &wa::Message) -> Option<String> {
    msg.conversation
        .clone()
        .or_else(|| {
            msg.extended_text_message
                .as_ref()
                .and_then(|e| e.text.clone())
        })
        .or_else(|| msg.image_message.as_ref().and_then(|m| m.caption.clone()))
        .or_else(|| msg.video_message.as_ref().and_then(|m| m.caption.clone()))
        .or_else(|| msg.document_message.as_ref().and_then(|m| m.caption.clone()))
        .filter(|t| !t.is_empty())
}

fn context_of(msg: &wa::Message) -> Option<&wa::ContextInfo> {
    msg.extended_text_message
        .as_ref()
        .and_then(|m| m.context_info.as_deref())
        .or_else(|| msg.image_message.as_ref().and_then(|m| m.context_info.as_deref()))
        .or_else(|| msg.video_message.as_ref().and_then(|m| m.context_info.as_deref()))
        .or_else(|| msg.sticker_message.as_ref().and_then(|m| m.context_info.as_deref()))
        .or_else(|| msg.document_message.as_ref().and_then(|m| m.context_info.as_deref()))
}

fn media_of(msg: &wa::Message, wrapped_view_once: bool) -> Option<MediaAttachment> {
    if let Some(img) = msg.image_message.as_ref() {
        return Some(MediaAttachment {
            kind: MediaKind::Image,
            mimetype: img.mimetype.clone(),
            caption: img.caption.clone(),
            seconds: None,
            is_animated: false,
            view_once: wrapped_view_once || img.view_once.unwrap_or(false),
            handle: MediaHandle::new(WaMedia::Image((**img).clone())),
        });
    }
    if let Some(vid) = msg.video_message.as_ref() {
        return Some(MediaAttachment {
            kind: MediaKind::Video,
            mimetype: vid.mimetype.clone(),
            caption: vid.caption.clone(),
            seconds: vid.seconds,
            is_animated: vid.gif_playback.unwrap_or(false),
            view_once: wrapped_view_once || vid.view_once.unwrap_or(false),
            handle: MediaHandle::new(WaMedia::Video((**vid).clone())),
        });
    }
    if let Some(st) = msg.sticker_message.as_ref() {
        return Some(MediaAttachment {
            kind: MediaKind::Sticker,
            mimetype: st.mimetype.clone(),
            caption: None,
            seconds: None,
            is_animated: st.is_animated.unwrap_or(false),
            view_once: false,
            handle: MediaHandle::new(WaMedia::Sticker((**st).clone())),
        });
    }
    if let Some(au) = msg.audio_message.as_ref() {
        return Some(MediaAttachment {
            kind: MediaKind::Audio,
            mimetype: au.mimetype.clone(),
            caption: None,
            seconds: au.seconds,
            is_animated: false,
            view_once: wrapped_view_once || au.view_once.unwrap_or(false),
            handle: MediaHandle::new(WaMedia::Audio((**au).clone())),
        });
    }
    msg.document_message.as_ref().map(|doc| MediaAttachment {
        kind: MediaKind::Document,
        mimetype: doc.mimetype.clone(),
        caption: doc.caption.clone(),
        seconds: None,
        is_animated: false,
        view_once: false,
        handle: MediaHandle::new(WaMedia::Document((**doc).clone())),
    })
}
