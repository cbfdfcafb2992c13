//! Reply formatter: footer, optional logo/owner image, text fallback.
//!
//! Sending a formatted reply never fails from the caller's point of view;
//! errors are logged and swallowed.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use whiz_core::{
    config::BotConfig,
    error::WhizError,
    format::footer,
    message::{IncomingMessage, MessageContent, MessageKey, OutgoingMessage},
    traits::Transport,
};

/// How a reply is decorated.
#[derive(Debug, Clone)]
pub struct ReplyOptions {
    pub quoted: Option<MessageKey>,
    pub with_logo: bool,
    pub with_owner_image: bool,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            quoted: None,
            with_logo: true,
            with_owner_image: false,
        }
    }
}

impl ReplyOptions {
    /// Default decoration, quoting `msg`.
    pub fn quoting(msg: &IncomingMessage) -> Self {
        Self {
            quoted: Some(msg.key()),
            ..Self::default()
        }
    }

    /// Footer only.
    pub fn text_only() -> Self {
        Self {
            with_logo: false,
            ..Self::default()
        }
    }

    pub fn with_owner_image(mut self) -> Self {
        self.with_owner_image = true;
        self
    }
}

/// Sends bot replies with the standard footer and branding image.
pub struct Replier {
    transport: Arc<dyn Transport>,
    http: reqwest::Client,
    footer: String,
    logo_url: Option<String>,
    owner_image_url: Option<String>,
    /// Fetched image bytes by URL.
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl Replier {
    pub fn new(transport: Arc<dyn Transport>, config: &BotConfig, http: reqwest::Client) -> Self {
        Self {
            transport,
            http,
            footer: footer(&config.footer_text, &config.group_url),
            logo_url: config.logo_url.clone().filter(|u| !u.is_empty()),
            owner_image_url: config.owner_image_url.clone().filter(|u| !u.is_empty()),
            images: Mutex::new(HashMap::new()),
        }
    }

    /// The footer appended to every formatted reply.
    pub fn footer(&self) -> &str {
        &self.footer
    }

    /// Send `text` plus footer to `chat`, as an image caption when an image is selected.
    pub async fn send(&self, chat: &str, text: &str, options: ReplyOptions) {
        let body = format!("{text}{}", self.footer);

        if let Some(url) = self.image_url(&options) {
            match self.image(url).await {
                Ok((data, mimetype)) => {
                    let msg = OutgoingMessage::new(
                        chat,
                        MessageContent::Image {
                            data,
                            mimetype,
                            caption: Some(body.clone()),
                        },
                    )
                    .quoting(options.quoted.clone());
                    match self.transport.send(msg).await {
                        Ok(_) => return,
                        Err(e) => error!("reply with image to {chat} failed, falling back to text: {e}"),
                    }
                }
                Err(e) => warn!("reply image {url} unavailable, sending text: {e}"),
            }
        }

        let msg = OutgoingMessage::text(chat, body).quoting(options.quoted);
        if let Err(e) = self.transport.send(msg).await {
            error!("reply to {chat} failed: {e}");
        }
    }

    /// Owner image when requested and configured, else the logo when requested.
    fn image_url(&self, options: &ReplyOptions) -> Option<&str> {
        if options.with_owner_image {
            if let Some(url) = &self.owner_image_url {
                return Some(url);
            }
        }
        if options.with_logo {
            return self.logo_url.as_deref();
        }
        None
    }

    /// Image bytes and mimetype for a URL, fetched once and cached.
    async fn image(&self, url: &str) -> Result<(Vec<u8>, String), WhizError> {
        if let Some(data) = self.images.lock().await.get(url) {
            return Ok((data.clone(), image_mimetype(data)));
        }

        debug!("fetching reply image {url}");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WhizError::Http(format!("image fetch failed: {e}")))?;
        let data = resp
            .bytes()
            .await
            .map_err(|e| WhizError::Http(format!("image read failed: {e}")))?
            .to_vec();

        let mimetype = image_mimetype(&data);
        self.images
            .lock()
            .await
            .insert(url.to_string(), data.clone());
        Ok((data, mimetype))
    }

    #[cfg(test)]
    pub(crate) async fn prime_image(&self, url: &str, data: Vec<u8>) {
        self.images.lock().await.insert(url.to_string(), data);
    }
}

fn image_mimetype(data: &[u8]) -> String {
    match image::guess_format(data) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => "image/jpeg".to_string(),
    }
}
