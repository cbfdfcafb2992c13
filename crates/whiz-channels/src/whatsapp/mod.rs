//! WhatsApp transport: pure Rust implementation via `whatsapp-rust`.
//!
//! Uses the WhatsApp Web protocol (Noise handshake + Signal encryption).
//! The session is persisted to `{data_dir}/session/whatsapp.db`; a fresh
//! store pairs by QR code printed to the log.

mod bot;
mod events;
mod link;
mod qr;
mod send;
mod transport;


pub use link::WhatsAppLinker;
pub use qr::{generate_qr_image, generate_qr_terminal, qr_data_url};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::session::SESSION_DB_FILE;

/// WhatsApp transport using the WhatsApp Web protocol.
pub struct WhatsAppTransport {
    pub(super) device_name: String,
    pub(super) session_dir: PathBuf,
    /// Client handle for sending messages, set once connected.
    pub(super) client: Arc<Mutex<Option<Arc<whatsapp_rust::client::Client>>>>,
    /// Recent direct-chat sends, used to drop our own echoes.
    pub(super) sent_ids: Arc<Mutex<events::SentIds>>,
    pub(super) connected: Arc<watch::Sender<bool>>,
    pub(super) bot_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WhatsAppTransport {
    /// Create a transport whose session store lives in `session_dir`.
    pub fn new(device_name: &str, session_dir: impl Into<PathBuf>) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            device_name: device_name.to_string(),
            session_dir: session_dir.into(),
            client: Arc::new(Mutex::new(None)),
            sent_ids: Arc::new(Mutex::new(events::SentIds::default())),
            connected: Arc::new(connected),
            bot_handle: Mutex::new(None),
        }
    }

    /// Session directory for a data dir.
    pub fn session_dir_for(data_dir: &str) -> PathBuf {
        Path::new(&whiz_core::config::shellexpand(data_dir)).join("session")
    }

    /// Check if the WhatsApp client is currently connected.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub(super) fn session_db_path(&self) -> Result<String, whiz_core::error::WhizError> {
        std::fs::create_dir_all(&self.session_dir)?;
        Ok(self.session_dir.join(SESSION_DB_FILE).to_string_lossy().into_owned())
    }

    /// Clone the connected client out of the lock.
    pub(super) async fn connected_client(
        &self,
    ) -> Result<Arc<whatsapp_rust::client::Client>, whiz_core::error::WhizError> {
        self.client.lock().await.clone().ok_or_else(|| {
            whiz_core::error::WhizError::Transport("whatsapp client not connected".into())
        })
    }
}
