//! Session generator: links a new device by QR code or pairing code and
//! delivers the captured session to the user's own WhatsApp chat.
//!
//! Each method runs as an independent [`LinkFlow`]. A flow owns at most one
//! attempt at a time; every attempt gets a fresh generation number so events
//! and timers left over from a superseded attempt are ignored.

pub mod web;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};
use whiz_core::error::WhizError;
use whiz_core::link::{LinkBackend, LinkEvent, LinkMethod, LinkSession};

/// Pause between the session blob and the confirmation message.
pub const CONFIRM_DELAY: Duration = Duration::from_secs(1);

pub(crate) const CONFLICT_TEXT: &str =
    "A pairing process is already active. Please wait or refresh.";
pub(crate) const TIMEOUT_TEXT: &str = "Initialization timed out. Please try again.";
pub(crate) const DISCONNECTED_TEXT: &str = "Client disconnected. Please try again.";
pub(crate) const CAPTURE_FAILED_TEXT: &str = "Session file not found after authentication.";
const NO_OWN_JID_TEXT: &str = "Could not determine your WhatsApp number to send the session.";

const SUCCESS_TAIL: &str = "\n\n*Gɪᴠᴇ ᴀ ꜱᴛᴀʀ ᴛᴏ ʀᴇᴘᴏ ꜰᴏʀ ᴄᴏᴜʀᴀɢᴇ* 🌟\nhttps://github.com/twoem\n\n*WHIZ BOT* 🥀";

/// Message sent after the session blob.
pub fn confirmation_text(method: &LinkMethod) -> String {
    let head = match method {
        LinkMethod::Qr => "*QR HAS BEEN SCANNED SUCCESSFULLY* ✅",
        LinkMethod::PairingCode { .. } => "*SUCCESS PAIRING CODE WAS CORRECT* ✅",
    };
    format!("{head}{SUCCESS_TAIL}")
}

/// Where a flow stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    /// Client starting, nothing to show yet.
    Initializing,
    /// Raw QR payload to render.
    QrReady(String),
    CodeIssued(String),
    /// Phone linked; the session is being delivered.
    Authenticated,
    /// Session delivered.
    Delivered,
    /// Linked, but the session could not be delivered.
    DeliveryFailed(String),
    Error(String),
}

impl LinkStatus {
    /// No further events change a terminal status; only a reset or a new attempt does.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::DeliveryFailed(_) | Self::Error(_)
        )
    }

    /// An attempt is in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::Idle
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            Self::Authenticated | Self::Delivered | Self::DeliveryFailed(_)
        )
    }

    /// User-facing error, including a failed delivery after linking.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(e) | Self::DeliveryFailed(e) => Some(e),
            _ => None,
        }
    }
}

struct Attempt {
    generation: u64,
    session: Option<Arc<dyn LinkSession>>,
}

/// One linking method's state machine.
pub struct LinkFlow {
    name: &'static str,
    backend: Arc<dyn LinkBackend>,
    session_dir: PathBuf,
    timeout: Duration,
    confirm_delay: Duration,
    attempt: Mutex<Attempt>,
    status: watch::Sender<LinkStatus>,
}

impl LinkFlow {
    pub fn new(
        name: &'static str,
        backend: Arc<dyn LinkBackend>,
        session_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(LinkStatus::Idle);
        Self {
            name,
            backend,
            session_dir: session_dir.into(),
            timeout,
            confirm_delay: CONFIRM_DELAY,
            attempt: Mutex::new(Attempt {
                generation: 0,
                session: None,
            }),
            status,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_confirm_delay(mut self, delay: Duration) -> Self {
        self.confirm_delay = delay;
        self
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Claim the flow for a new attempt and return its generation.
    ///
    /// A finished or failed attempt is torn down first; an active one is a conflict.
    pub async fn begin(&self) -> Result<u64, WhizError> {
        let mut attempt = self.attempt.lock().await;
        if self.status.borrow().is_active() {
            return Err(WhizError::Link(CONFLICT_TEXT.into()));
        }
        self.release(attempt.session.take(), true).await;
        attempt.generation += 1;
        self.status.send_replace(LinkStatus::Initializing);
        info!("[{}] attempt {} starting", self.name, attempt.generation);
        Ok(attempt.generation)
    }

    /// Start the client for a claimed attempt and follow its events in the background.
    pub async fn launch(self: Arc<Self>, generation: u64, method: LinkMethod) {
        let timer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timer.timeout).await;
            timer.expire(generation).await;
        });

        let started = self.backend.start(&method, &self.session_dir).await;
        let (session, events) = match started {
            Ok((session, events)) => (Arc::<dyn LinkSession>::from(session), events),
            Err(e) => {
                error!("[{}] client failed to start: {e}", self.name);
                let text = format!(
                    "Failed to initialize WhatsApp client for {}: {e}",
                    method.label()
                );
                if self.advance(generation, |_| Some(LinkStatus::Error(text))).await {
                    self.teardown(generation).await;
                }
                return;
            }
        };

        {
            let mut attempt = self.attempt.lock().await;
            let current = attempt.generation == generation;
            if !current || self.status.borrow().is_terminal() {
                debug!("[{}] attempt {generation} ended while starting", self.name);
                self.release(Some(session), current).await;
                return;
            }
            attempt.session = Some(session);
        }

        let flow = self.clone();
        tokio::spawn(async move {
            flow.follow(generation, method, events).await;
        });
    }

    /// Claim and launch in one go.
    pub async fn start(self: &Arc<Self>, method: LinkMethod) -> Result<u64, WhizError> {
        let generation = self.begin().await?;
        self.clone().launch(generation, method).await;
        Ok(generation)
    }

    /// Drop the current attempt, tear down its resources and return to idle.
    pub async fn reset(&self) {
        let mut attempt = self.attempt.lock().await;
        attempt.generation += 1;
        self.release(attempt.session.take(), true).await;
        self.status.send_replace(LinkStatus::Idle);
        info!("[{}] reset", self.name);
    }

    async fn follow(&self, generation: u64, method: LinkMethod, mut events: mpsc::Receiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            if !self.is_current(generation).await {
                break;
            }
            self.handle_event(generation, &method, event).await;
        }
        debug!("[{}] attempt {generation} event stream closed", self.name);
    }

    async fn handle_event(&self, generation: u64, method: &LinkMethod, event: LinkEvent) {
        match event {
            LinkEvent::Qr(qr) => {
                debug!("[{}] QR received", self.name);
                self.advance(generation, |s| {
                    (!s.is_authenticated()).then_some(LinkStatus::QrReady(qr))
                })
                .await;
            }
            LinkEvent::PairingCode(code) => {
                info!("[{}] pairing code issued: {code}", self.name);
                self.advance(generation, |s| {
                    (!s.is_authenticated()).then_some(LinkStatus::CodeIssued(code))
                })
                .await;
            }
            LinkEvent::Authenticated => {
                let first = self
                    .advance(generation, |s| {
                        (!s.is_authenticated()).then_some(LinkStatus::Authenticated)
                    })
                    .await;
                if !first {
                    return;
                }
                info!("[{}] authenticated, delivering session", self.name);
                let next = match self.deliver(generation, method).await {
                    Ok(jid) => {
                        info!("[{}] session delivered to {jid}", self.name);
                        LinkStatus::Delivered
                    }
                    Err(e) => {
                        error!("[{}] session delivery failed: {e}", self.name);
                        LinkStatus::DeliveryFailed(e)
                    }
                };
                if self.advance(generation, |_| Some(next)).await {
                    self.teardown(generation).await;
                }
            }
            LinkEvent::AuthFailure(msg) => {
                error!("[{}] authentication failure: {msg}", self.name);
                let text = format!("Authentication Failed: {msg}. Please try again.");
                if self.advance(generation, |_| Some(LinkStatus::Error(text))).await {
                    self.teardown(generation).await;
                }
            }
            LinkEvent::Disconnected(reason) => {
                info!("[{}] client disconnected: {reason}", self.name);
                let failed = self
                    .advance(generation, |s| {
                        (!s.is_authenticated())
                            .then(|| LinkStatus::Error(DISCONNECTED_TEXT.to_string()))
                    })
                    .await;
                if failed {
                    self.teardown(generation).await;
                }
            }
        }
    }

    /// Capture the session and send it, then the confirmation, to the linked account.
    async fn deliver(&self, generation: u64, method: &LinkMethod) -> Result<String, String> {
        let session = self
            .current_session(generation)
            .await
            .ok_or_else(|| "Client info not available to send session.".to_string())?;

        let blob = session.capture_session().await.map_err(|e| {
            warn!("[{}] session capture failed: {e}", self.name);
            CAPTURE_FAILED_TEXT.to_string()
        })?;
        let jid = session
            .own_jid()
            .await
            .ok_or_else(|| NO_OWN_JID_TEXT.to_string())?;

        let send_failed = |e: WhizError| {
            format!(
                "Failed to send session/info to your WhatsApp: {e}. Please copy the session from server logs if available."
            )
        };
        info!("[{}] sending session to {jid}", self.name);
        session.send_text(&jid, &blob).await.map_err(send_failed)?;
        tokio::time::sleep(self.confirm_delay).await;
        session
            .send_text(&jid, &confirmation_text(method))
            .await
            .map_err(send_failed)?;
        Ok(jid)
    }

    /// Timeout: fail the attempt if it has not finished.
    async fn expire(&self, generation: u64) {
        let expired = self
            .advance(generation, |_| Some(LinkStatus::Error(TIMEOUT_TEXT.to_string())))
            .await;
        if expired {
            error!(
                "[{}] attempt {generation} timed out after {}s",
                self.name,
                self.timeout.as_secs()
            );
            self.teardown(generation).await;
        }
    }

    /// Apply `next` to the current status if `generation` is current and not yet terminal.
    async fn advance<F>(&self, generation: u64, next: F) -> bool
    where
        F: FnOnce(&LinkStatus) -> Option<LinkStatus>,
    {
        let attempt = self.attempt.lock().await;
        if attempt.generation != generation {
            return false;
        }
        let current = self.status.borrow().clone();
        if current.is_terminal() {
            return false;
        }
        match next(&current) {
            Some(status) => {
                self.status.send_replace(status);
                true
            }
            None => false,
        }
    }

    async fn is_current(&self, generation: u64) -> bool {
        self.attempt.lock().await.generation == generation
    }

    async fn current_session(&self, generation: u64) -> Option<Arc<dyn LinkSession>> {
        let attempt = self.attempt.lock().await;
        (attempt.generation == generation)
            .then(|| attempt.session.clone())
            .flatten()
    }

    /// Release the resources of `generation` if it is still current. Safe to repeat.
    async fn teardown(&self, generation: u64) {
        let mut attempt = self.attempt.lock().await;
        if attempt.generation != generation {
            return;
        }
        self.release(attempt.session.take(), true).await;
    }

    /// Destroy a client and optionally remove the session directory. Failures are logged.
    async fn release(&self, session: Option<Arc<dyn LinkSession>>, remove_dir: bool) {
        if let Some(session) = session {
            match session.destroy().await {
                Ok(()) => debug!("[{}] client destroyed", self.name),
                Err(e) => warn!("[{}] failed to destroy client: {e}", self.name),
            }
        }
        if remove_dir && self.session_dir.exists() {
            match tokio::fs::remove_dir_all(&self.session_dir).await {
                Ok(()) => debug!(
                    "[{}] removed {}",
                    self.name,
                    self.session_dir.display()
                ),
                Err(e) => warn!(
                    "[{}] failed to remove {}: {e}",
                    self.name,
                    self.session_dir.display()
                ),
            }
        }
    }
}

/// The QR and pairing-code flows served by `whiz link`.
pub struct Linker {
    pub qr: Arc<LinkFlow>,
    pub pairing: Arc<LinkFlow>,
}

impl Linker {
    /// Flows keeping their temporary sessions under `{data_dir}/linker`.
    pub fn new(backend: Arc<dyn LinkBackend>, data_dir: &Path, timeout: Duration) -> Self {
        let root = data_dir.join("linker");
        Self {
            qr: Arc::new(LinkFlow::new("qr", backend.clone(), root.join("qr"), timeout)),
            pairing: Arc::new(LinkFlow::new(
                "pairing",
                backend,
                root.join("pairing"),
                timeout,
            )),
        }
    }
}
