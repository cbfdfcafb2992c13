//! Media commands: sticker, toimg, vv, save.

use super::{Category, Command, CommandContext, CommandSpec, Outcome};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use whiz_core::{
    error::WhizError,
    message::{MediaAttachment, MediaKind, MessageContent, OutgoingMessage},
};

pub(super) fn commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Sticker),
        Arc::new(ToImage),
        Arc::new(ViewOnce),
        Arc::new(Save),
    ]
}

const fn media(
    name: &'static str,
    aliases: &'static [&'static str],
    description: &'static str,
    usage: &'static str,
) -> CommandSpec {
    CommandSpec {
        name,
        aliases,
        category: Category::Media,
        description,
        usage,
        owner_only: false,
        group_only: false,
        admin_only: false,
    }
}

/// Longest video accepted for an animated sticker.
pub(super) const MAX_STICKER_VIDEO_SECS: u32 = 15;

/// Caption on the GIF sent in place of an animated sticker.
pub(super) const VIDEO_STICKER_CAPTION: &str =
    "Animated stickers from video are not supported yet, so here it is as a GIF ✨";

/// Sticker canvas edge in pixels.
pub(super) const STICKER_SIZE: u32 = 512;

/// Media on the command message itself, else on the message it replies to.
fn target_media<'a>(ctx: &'a CommandContext<'_>) -> Option<&'a MediaAttachment> {
    ctx.msg
        .media
        .as_ref()
        .or_else(|| ctx.msg.quoted.as_ref().and_then(|q| q.media.as_ref()))
}

fn image_err(e: image::ImageError) -> WhizError {
    WhizError::Command(format!("image conversion failed: {e}"))
}

/// Fit an image into a transparent 512×512 canvas and encode it as WebP.
pub(super) fn to_sticker_webp(data: &[u8]) -> Result<Vec<u8>, WhizError> {
    let img = image::load_from_memory(data).map_err(image_err)?;
    let fitted = img
        .resize(STICKER_SIZE, STICKER_SIZE, FilterType::Lanczos3)
        .to_rgba8();

    let mut canvas = RgbaImage::new(STICKER_SIZE, STICKER_SIZE);
    let x = (STICKER_SIZE - fitted.width()) / 2;
    let y = (STICKER_SIZE - fitted.height()) / 2;
    image::imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));

    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)
        .map_err(image_err)?;
    Ok(out)
}

/// Sticker pack and author from `pack;author` arguments, falling back to defaults.
pub(super) fn sticker_metadata(args: &str, bot_name: &str, owner_name: &str) -> (String, String) {
    let mut pack = format!("{bot_name} Stickers");
    let mut author = owner_name.to_string();
    let mut parts = args.splitn(2, ';');
    if let Some(p) = parts.next().map(str::trim).filter(|p| !p.is_empty()) {
        pack = p.to_string();
    }
    if let Some(a) = parts.next().map(str::trim).filter(|a| !a.is_empty()) {
        author = a.to_string();
    }
    (pack, author)
}

/// EXIF payload WhatsApp reads sticker pack and author from.
pub(super) fn sticker_exif(pack: &str, author: &str) -> Vec<u8> {
    let json = serde_json::json!({
        "sticker-pack-id": format!("whiz-{}", chrono::Utc::now().timestamp_millis()),
        "sticker-pack-name": pack,
        "sticker-pack-publisher": author,
        "emojis": [""],
    })
    .to_string();

    // Little-endian TIFF header, one IFD entry (tag 0x5741, UNDEFINED) pointing past itself.
    let mut exif = vec![
        0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00, 0x41, 0x57, 0x07, 0x00,
    ];
    exif.extend_from_slice(&(json.len() as u32).to_le_bytes());
    exif.extend_from_slice(&[0x16, 0x00, 0x00, 0x00]);
    exif.extend_from_slice(json.as_bytes());
    exif
}

fn riff_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

const VP8X_FLAG_EXIF: u8 = 0x08;
const VP8X_FLAG_ALPHA: u8 = 0x10;

/// Re-wrap a WebP file in the extended format with an EXIF chunk appended.
pub(super) fn embed_exif(
    webp: &[u8],
    exif: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, WhizError> {
    if webp.len() < 12 || &webp[..4] != b"RIFF" || &webp[8..12] != b"WEBP" {
        return Err(WhizError::Command("not a WebP file".into()));
    }

    let mut chunks: Vec<([u8; 4], &[u8])> = Vec::new();
    let mut pos = 12;
    while pos + 8 <= webp.len() {
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&webp[pos..pos + 4]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&webp[pos + 4..pos + 8]);
        let len = u32::from_le_bytes(len) as usize;
        let start = pos + 8;
        let end = start + len;
        if end > webp.len() {
            return Err(WhizError::Command("truncated WebP chunk".into()));
        }
        chunks.push((fourcc, &webp[start..end]));
        pos = end + len % 2;
    }

    let mut body = b"WEBP".to_vec();
    match chunks.first() {
        Some((fourcc, payload)) if fourcc == b"VP8X" && payload.len() >= 10 => {
            let mut header = payload.to_vec();
            header[0] |= VP8X_FLAG_EXIF;
            riff_chunk(&mut body, b"VP8X", &header);
            for (fourcc, payload) in chunks.iter().skip(1).filter(|(f, _)| f != b"EXIF") {
                riff_chunk(&mut body, fourcc, payload);
            }
        }
        Some(_) => {
            let mut header = vec![VP8X_FLAG_EXIF | VP8X_FLAG_ALPHA, 0, 0, 0];
            header.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
            header.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
            riff_chunk(&mut body, b"VP8X", &header);
            for (fourcc, payload) in &chunks {
                riff_chunk(&mut body, fourcc, payload);
            }
        }
        None => return Err(WhizError::Command("empty WebP file".into())),
    }
    riff_chunk(&mut body, b"EXIF", exif);

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a static sticker and re-encode it as PNG.
pub(super) fn sticker_to_png(data: &[u8]) -> Result<Vec<u8>, WhizError> {
    let img = image::load_from_memory_with_format(data, ImageFormat::WebP).map_err(image_err)?;
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(image_err)?;
    Ok(out)
}

struct Sticker;

static STICKER: CommandSpec = media(
    "sticker",
    &["s"],
    "Create a sticker from an image or short video.",
    "[pack;author] (reply to media or send media with caption)",
);

impl Sticker {
    async fn build(
        &self,
        ctx: &CommandContext<'_>,
        media: &MediaAttachment,
    ) -> Result<MessageContent, WhizError> {
        let data = ctx.transport.download(media).await?;
        debug!("sticker media downloaded ({} bytes)", data.len());

        if media.kind == MediaKind::Video {
            // Stickers must be WebP and there is no video encoder here, so
            // short clips come back as looping GIF-playback videos.
            info!("sticker from video sent as GIF playback ({} bytes)", data.len());
            return Ok(MessageContent::Video {
                data,
                mimetype: media.mimetype.clone().unwrap_or_else(|| "video/mp4".into()),
                caption: Some(VIDEO_STICKER_CAPTION.into()),
                gif_playback: true,
            });
        }

        let (pack, author) =
            sticker_metadata(ctx.args, &ctx.config.name, &ctx.config.owner_name);
        let webp = to_sticker_webp(&data)?;
        let webp = embed_exif(&webp, &sticker_exif(&pack, &author), STICKER_SIZE, STICKER_SIZE)?;
        info!("sticker created | pack: \"{pack}\", author: \"{author}\"");
        Ok(MessageContent::Sticker {
            data: webp,
            animated: false,
        })
    }
}

#[async_trait]
impl Command for Sticker {
    fn spec(&self) -> &CommandSpec {
        &STICKER
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let media = match target_media(ctx) {
            Some(m) if matches!(m.kind, MediaKind::Image | MediaKind::Video) => m,
            _ => {
                ctx.reply_text(&format!(
                    "Please reply to an image/video with the command, or send an image/video with the command as caption (e.g., {}sticker MyPack;MyAuthor).",
                    ctx.config.primary_prefix()
                ))
                .await;
                return Ok(Outcome::Done);
            }
        };

        if media.kind == MediaKind::Video
            && media.seconds.is_some_and(|s| s > MAX_STICKER_VIDEO_SECS)
        {
            warn!("sticker video too long ({:?}s)", media.seconds);
            ctx.reply_text("Video is too long for an animated sticker. Please use a shorter video (max 15 seconds).")
                .await;
            return Ok(Outcome::Done);
        }

        let sent = match self.build(ctx, media).await {
            Ok(content) => {
                let msg = OutgoingMessage::new(&ctx.msg.chat, content).quoting(Some(ctx.msg.key()));
                ctx.send(msg).await.map(|_| ())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            error!("sticker creation failed: {e}");
            ctx.reply_text("Oops! Failed to create sticker. Ensure it is a valid image or a short video (max 15s).")
                .await;
        }
        Ok(Outcome::Done)
    }
}

struct ToImage;

static TOIMG: CommandSpec = media(
    "toimg",
    &["image"],
    "Convert a sticker to an image or GIF/video.",
    "(reply to a sticker)",
);

#[async_trait]
impl Command for ToImage {
    fn spec(&self) -> &CommandSpec {
        &TOIMG
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let sticker = match ctx.msg.quoted.as_ref().and_then(|q| q.media.as_ref()) {
            Some(m) if m.kind == MediaKind::Sticker => m,
            _ => {
                ctx.reply_text(&format!(
                    "Please reply to a sticker with the command `{}toimg`.",
                    ctx.config.primary_prefix()
                ))
                .await;
                return Ok(Outcome::Done);
            }
        };

        let converted: Result<String, WhizError> = async {
            let data = ctx.transport.download(sticker).await?;
            let content = if sticker.is_animated {
                MessageContent::Video {
                    data,
                    mimetype: "video/mp4".into(),
                    caption: Some("Animated sticker converted to GIF/Video ✨".into()),
                    gif_playback: true,
                }
            } else {
                MessageContent::Image {
                    data: sticker_to_png(&data)?,
                    mimetype: "image/png".into(),
                    caption: Some("Sticker converted to Image ✨".into()),
                }
            };
            let msg = OutgoingMessage::new(&ctx.msg.chat, content).quoting(Some(ctx.msg.key()));
            ctx.send(msg).await
        }
        .await;

        if let Err(e) = converted {
            error!("sticker conversion failed: {e}");
            ctx.reply_text("Oops! Failed to convert sticker. Please ensure you replied to a valid sticker.")
                .await;
        }
        Ok(Outcome::Done)
    }
}

struct ViewOnce;

static VV: CommandSpec = media(
    "vv",
    &[],
    "Reveal a view-once image or video.",
    "(reply to a view-once message)",
);

/// Resend content for downloaded media, or `None` for kinds that cannot be resent.
fn resend_content(media: &MediaAttachment, data: Vec<u8>, caption: Option<String>) -> Option<MessageContent> {
    match media.kind {
        MediaKind::Image => Some(MessageContent::Image {
            data,
            mimetype: media.mimetype.clone().unwrap_or_else(|| "image/jpeg".into()),
            caption,
        }),
        MediaKind::Video => Some(MessageContent::Video {
            data,
            mimetype: media.mimetype.clone().unwrap_or_else(|| "video/mp4".into()),
            caption,
            gif_playback: media.is_animated,
        }),
        MediaKind::Sticker => Some(MessageContent::Sticker {
            data,
            animated: media.is_animated,
        }),
        MediaKind::Audio | MediaKind::Document => None,
    }
}

#[async_trait]
impl Command for ViewOnce {
    fn spec(&self) -> &CommandSpec {
        &VV
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let Some(quoted) = ctx.msg.quoted.as_ref() else {
            ctx.reply_plain(&format!(
                "Please reply to a view-once message with `{}vv` to save it.",
                ctx.config.primary_prefix()
            ))
            .await?;
            return Ok(Outcome::Done);
        };

        let media = match quoted.media.as_ref() {
            Some(m) if m.view_once && matches!(m.kind, MediaKind::Image | MediaKind::Video) => m,
            _ => {
                ctx.reply_plain(&format!(
                    "Hmm, it seems you didn't reply to a view-once message with media. Please use {}vv as a reply to a view-once image or video. 🤔",
                    ctx.config.primary_prefix()
                ))
                .await?;
                return Ok(Outcome::Done);
            }
        };

        let data = match ctx.transport.download(media).await {
            Ok(data) => data,
            Err(e) => {
                error!("view-once download failed: {e}");
                ctx.reply_plain("Oops! Something went wrong while trying to capture the media. 😥 Please try again. (Media download failed)")
                    .await?;
                return Ok(Outcome::Done);
            }
        };

        let caption = Some("Here is the view-once media you requested! ✨".to_string());
        let sent = match resend_content(media, data, caption) {
            Some(content) => ctx.send(OutgoingMessage::new(&ctx.msg.chat, content)).await,
            None => Err(WhizError::Command("unsupported view-once media".into())),
        };
        match sent {
            Ok(_) => {
                ctx.reply_plain("Got it! ✨ The view-once media has been captured and sent to you.")
                    .await?;
            }
            Err(e) => {
                error!("view-once resend failed: {e}");
                ctx.reply_plain("Oops! Something went wrong while trying to capture the media. 😥 Please try again.")
                    .await?;
            }
        }
        Ok(Outcome::Done)
    }
}

struct Save;

static SAVE: CommandSpec = media(
    "save",
    &[],
    "Forward a replied status or message to the owner.",
    "(reply to a message)",
);

#[async_trait]
impl Command for Save {
    fn spec(&self) -> &CommandSpec {
        &SAVE
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let Some(target) = ctx.config.save_target() else {
            ctx.reply_text("Save target is not configured. Set OWNER_JID or OWNER_JID_FOR_STATUS_SAVES.")
                .await;
            return Ok(Outcome::Done);
        };
        let Some(quoted) = ctx.msg.quoted.as_ref() else {
            ctx.reply_text(&format!(
                "Please reply to the status or message you want to save with `{}save`.",
                ctx.config.primary_prefix()
            ))
            .await;
            return Ok(Outcome::Done);
        };

        let content = match quoted.media.as_ref() {
            Some(media) => {
                let data = ctx.transport.download(media).await?;
                resend_content(media, data, quoted.text.clone()).ok_or_else(|| {
                    WhizError::Command(format!("cannot forward {:?} media", media.kind))
                })?
            }
            None => match quoted.text.as_deref().filter(|t| !t.is_empty()) {
                Some(text) => MessageContent::Text(text.to_string()),
                None => {
                    ctx.reply_text("There is nothing to save in that message.").await;
                    return Ok(Outcome::Done);
                }
            },
        };

        ctx.send(OutgoingMessage::new(&target, content)).await?;
        info!("saved message {} to {target}", quoted.id);
        ctx.reply_text("Saved ✅").await;
        Ok(Outcome::Done)
    }
}
