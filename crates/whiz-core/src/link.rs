//! Device-linking seam: a backend starts a pairing attempt and reports its
//! progress as [`LinkEvent`]s.

use crate::error::WhizError;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// How the user links the new device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMethod {
    /// Scan a QR code from the phone.
    Qr,
    /// Enter an 8-character code on the phone with this number.
    PairingCode { phone_number: String },
}

impl LinkMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Qr => "QR",
            Self::PairingCode { .. } => "PairingCode",
        }
    }
}

/// Progress reported by a linking attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A (rotated) QR payload to render.
    Qr(String),
    /// Pairing code to type on the phone.
    PairingCode(String),
    /// Device linked and connected; the session can be captured.
    Authenticated,
    AuthFailure(String),
    Disconnected(String),
}

/// A running linking client.
#[async_trait]
pub trait LinkSession: Send + Sync {
    /// JID of the account that linked this device.
    async fn own_jid(&self) -> Option<String>;

    async fn send_text(&self, jid: &str, text: &str) -> Result<(), WhizError>;

    /// Persisted session encoded as a `WHIZBOT_` blob, ready for delivery.
    async fn capture_session(&self) -> Result<String, WhizError>;

    /// Disconnect and stop the client. Safe to call more than once.
    async fn destroy(&self) -> Result<(), WhizError>;
}

/// Starts linking attempts.
#[async_trait]
pub trait LinkBackend: Send + Sync {
    /// Start a new attempt whose session lives under `session_dir`.
    async fn start(
        &self,
        method: &LinkMethod,
        session_dir: &Path,
    ) -> Result<(Box<dyn LinkSession>, mpsc::Receiver<LinkEvent>), WhizError>;
}
