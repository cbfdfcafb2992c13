//! Message sending utilities: protocol message building, chunking and retry logic.

use tracing::{error, warn};
use wacore_binary::jid::Jid;
use waproto::whatsapp::{self as wa, message as wam};
use whatsapp_rust::client::Client;
use whatsapp_rust::download::MediaType;
use whiz_core::error::WhizError;
use whiz_core::message::{MessageContent, MessageKey, OutgoingMessage};

/// Retry delays for exponential backoff: 500ms, 1s, 2s.
pub(super) const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

/// Longest text body sent as one message.
pub(super) const MAX_TEXT_LEN: usize = 4096;

/// Send a WhatsApp message with retry and exponential backoff.
///
/// Attempts up to 3 times with delays of 500ms, 1s, 2s between retries.
/// Clones the message for each retry attempt.
pub(super) async fn retry_send(
    client: &Client,
    jid: &Jid,
    msg: wa::Message,
) -> Result<String, WhizError> {
    let mut last_err = None;

    for (attempt, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
        match client.send_message(jid.clone(), msg.clone()).await {
            Ok(msg_id) => return Ok(msg_id),
            Err(e) => {
                let attempt_num = attempt + 1;
                if attempt_num < RETRY_DELAYS_MS.len() {
                    warn!(
                        "whatsapp send attempt {attempt_num}/{} failed: {e}, retrying in {delay_ms}ms",
                        RETRY_DELAYS_MS.len()
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
                } else {
                    error!(
                        "whatsapp send attempt {attempt_num}/{} failed: {e}, giving up",
                        RETRY_DELAYS_MS.len()
                    );
                }
                last_err = Some(e);
            }
        }
    }

    Err(WhizError::Transport(format!(
        "whatsapp send failed after {} attempts: {}",
        RETRY_DELAYS_MS.len(),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Split text into chunks of at most `max_len` bytes, preferring line breaks.
pub(super) fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.len() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let break_at = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .map(|i| start + i + 1)
                .unwrap_or(end)
        } else {
            end
        };
        chunks.push(&text[start..break_at]);
        start = break_at;
    }

    chunks
}

/// Parse a JID string, mapping failures to a transport error.
pub(super) fn parse_jid(jid_str: &str) -> Result<Jid, WhizError> {
    jid_str
        .parse()
        .map_err(|e| WhizError::Transport(format!("invalid whatsapp JID '{jid_str}': {e}")))
}

/// Protocol key addressing an existing message.
pub(super) fn protocol_key(key: &MessageKey) -> wa::MessageKey {
    wa::MessageKey {
        remote_jid: Some(key.chat.clone()),
        from_me: Some(key.from_me),
        id: Some(key.id.clone()),
        participant: key.participant.clone(),
        ..Default::default()
    }
}

/// Reply/mention context, if the message quotes or mentions anything.
pub(super) fn context_info(
    quoted: Option<&MessageKey>,
    mentions: &[String],
) -> Option<Box<wa::ContextInfo>> {
    if quoted.is_none() && mentions.is_empty() {
        return None;
    }
    Some(Box::new(wa::ContextInfo {
        stanza_id: quoted.map(|k| k.id.clone()),
        participant: quoted.map(|k| {
            k.participant
                .clone()
                .unwrap_or_else(|| k.chat.clone())
        }),
        mentioned_jid: mentions.to_vec(),
        ..Default::default()
    }))
}

/// Build the text messages for one outgoing text, chunked.
///
/// Only the first chunk carries the quote and mentions.
pub(super) fn text_messages(text: &str, out: &OutgoingMessage) -> Vec<wa::Message> {
    split_message(text, MAX_TEXT_LEN)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let ctx = if i == 0 {
                context_info(out.quoted.as_ref(), &out.mentions)
            } else {
                None
            };
            match ctx {
                None => wa::Message {
                    conversation: Some(chunk.to_string()),
                    ..Default::default()
                },
                Some(ctx) => wa::Message {
                    extended_text_message: Some(Box::new(wam::ExtendedTextMessage {
                        text: Some(chunk.to_string()),
                        context_info: Some(ctx),
                        ..Default::default()
                    })),
                    ..Default::default()
                },
            }
        })
        .collect()
}

/// Build the protocol message for any non-text content, uploading media first.
pub(super) async fn content_message(
    client: &Client,
    out: &OutgoingMessage,
) -> Result<wa::Message, WhizError> {
    let ctx = || context_info(out.quoted.as_ref(), &out.mentions);

    let msg = match &out.content {
        MessageContent::Text(text) => {
            // Callers route text through `text_messages`; keep a single-chunk fallback.
            text_messages(text, out).into_iter().next().unwrap_or_default()
        }
        MessageContent::Image {
            data,
            mimetype,
            caption,
        } => {
            let upload = upload(client, data, MediaType::Image).await?;
            wa::Message {
                image_message: Some(Box::new(wam::ImageMessage {
                    mimetype: Some(mimetype.clone()),
                    caption: caption.clone(),
                    url: Some(upload.url),
                    direct_path: Some(upload.direct_path),
                    media_key: Some(upload.media_key),
                    file_enc_sha256: Some(upload.file_enc_sha256),
                    file_sha256: Some(upload.file_sha256),
                    file_length: Some(upload.file_length),
                    context_info: ctx(),
                    ..Default::default()
                })),
                ..Default::default()
            }
        }
        MessageContent::Video {
            data,
            mimetype,
            caption,
            gif_playback,
        } => {
            let upload = upload(client, data, MediaType::Video).await?;
            wa::Message {
                video_message: Some(Box::new(wam::VideoMessage {
                    mimetype: Some(mimetype.clone()),
                    caption: caption.clone(),
                    gif_playback: Some(*gif_playback),
                    url: Some(upload.url),
                    direct_path: Some(upload.direct_path),
                    media_key: Some(upload.media_key),
                    file_enc_sha256: Some(upload.file_enc_sha256),
                    file_sha256: Some(upload.file_sha256),
                    file_length: Some(upload.file_length),
                    context_info: ctx(),
                    ..Default::default()
                })),
                ..Default::default()
            }
        }
        MessageContent::Sticker { data, animated } => {
            let upload = upload(client, data, MediaType::Sticker).await?;
            wa::Message {
                sticker_message: Some(Box::new(wam::StickerMessage {
                    mimetype: Some("image/webp".to_string()),
                    is_animated: Some(*animated),
                    url: Some(upload.url),
                    direct_path: Some(upload.direct_path),
                    media_key: Some(upload.media_key),
                    file_enc_sha256: Some(upload.file_enc_sha256),
                    file_sha256: Some(upload.file_sha256),
                    file_length: Some(upload.file_length),
                    context_info: ctx(),
                    ..Default::default()
                })),
                ..Default::default()
            }
        }
        MessageContent::Contact {
            display_name,
            vcard,
        } => wa::Message {
            contact_message: Some(Box::new(wam::ContactMessage {
                display_name: Some(display_name.clone()),
                vcard: Some(vcard.clone()),
                context_info: ctx(),
                ..Default::default()
            })),
            ..Default::default()
        },
        MessageContent::Reaction { target, emoji } => wa::Message {
            reaction_message: Some(wam::ReactionMessage {
                key: Some(protocol_key(target)),
                text: Some(emoji.clone()),
                sender_timestamp_ms: Some(chrono::Utc::now().timestamp_millis()),
                ..Default::default()
            }),
            ..Default::default()
        },
        MessageContent::Delete { target } => wa::Message {
            protocol_message: Some(Box::new(wam::ProtocolMessage {
                key: Some(protocol_key(target)),
                r#type: Some(wam::protocol_message::Type::Revoke as i32),
                ..Default::default()
            })),
            ..Default::default()
        },
    };
    Ok(msg)
}

/// Result of a media upload, as referenced from the media message.
struct Uploaded {
    url: String,
    direct_path: String,
    media_key: Vec<u8>,
    file_enc_sha256: Vec<u8>,
    file_sha256: Vec<u8>,
    file_length: u64,
}

async fn upload(client: &Client, data: &[u8], media_type: MediaType) -> Result<Uploaded, WhizError> {
    let resp = client
        .upload(data.to_vec(), media_type)
        .await
        .map_err(|e| WhizError::Transport(format!("whatsapp media upload failed: {e}")))?;
    Ok(Uploaded {
        url: resp.url,
        direct_path: resp.direct_path,
        media_key: resp.media_key,
        file_enc_sha256: resp.file_enc_sha256,
        file_sha256: resp.file_sha256,
        file_length: resp.file_length,
    })
}
