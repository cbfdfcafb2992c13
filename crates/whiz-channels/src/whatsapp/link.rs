//! Linking backend: runs a throwaway client in a temporary session directory
//! until the phone links it, then hands the captured session back.

use super::send::{parse_jid, retry_send};
use super::transport::user_jid;
use crate::session::{encode_session, SessionFiles, SESSION_DB_FILE};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wacore::types::events::Event;
use whatsapp_rust::bot::Bot;
use whatsapp_rust::client::Client;
use whatsapp_rust::pair_code::PairCodeOptions;
use whatsapp_rust_sqlite_storage::SqliteStore;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;
use whiz_core::error::WhizError;
use whiz_core::link::{LinkBackend, LinkEvent, LinkMethod, LinkSession};

/// Starts WhatsApp linking clients that show up as `device_name` on the phone.
pub struct WhatsAppLinker {
    device_name: String,
}

impl WhatsAppLinker {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
        }
    }
}

/// Map a client event to linking progress. Events irrelevant to linking map to `None`.
fn link_event(event: Event) -> Option<LinkEvent> {
    match event {
        Event::PairingQrCode { code, .. } => Some(LinkEvent::Qr(code)),
        Event::PairingCode { code, .. } => Some(LinkEvent::PairingCode(code)),
        Event::PairSuccess(_) => {
            info!("linking: pair success, waiting for connection");
            None
        }
        // The session is only usable once the linked client has reconnected.
        Event::Connected(_) => Some(LinkEvent::Authenticated),
        Event::PairError(e) => Some(LinkEvent::AuthFailure(format!("{e:?}"))),
        Event::LoggedOut(_) => Some(LinkEvent::AuthFailure("logged out by the phone".into())),
        Event::Disconnected(_) => Some(LinkEvent::Disconnected("connection closed".into())),
        _ => None,
    }
}

#[async_trait]
impl LinkBackend for WhatsAppLinker {
    async fn start(
        &self,
        method: &LinkMethod,
        session_dir: &Path,
    ) -> Result<(Box<dyn LinkSession>, mpsc::Receiver<LinkEvent>), WhizError> {
        std::fs::create_dir_all(session_dir)?;
        let db_path = session_dir.join(SESSION_DB_FILE);
        info!(
            "linking ({}) in {}",
            method.label(),
            session_dir.display()
        );

        let backend = Arc::new(
            SqliteStore::new(&db_path.to_string_lossy())
                .await
                .map_err(|e| WhizError::Link(format!("session store init failed: {e}")))?,
        );

        let (tx, rx) = mpsc::channel::<LinkEvent>(16);

        let mut builder = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            );

        if let LinkMethod::PairingCode { phone_number } = method {
            builder = builder.with_pair_code(PairCodeOptions {
                phone_number: phone_number.clone(),
                ..Default::default()
            });
        }

        let mut bot = builder
            .on_event(move |event, _client| {
                let tx = tx.clone();
                async move {
                    if let Some(ev) = link_event(event) {
                        debug!("linking event: {ev:?}");
                        if tx.send(ev).await.is_err() {
                            debug!("linking flow no longer listening");
                        }
                    }
                }
            })
            .build()
            .await
            .map_err(|e| WhizError::Link(format!("linking client build failed: {e}")))?;

        let client = bot.client();
        let handle = bot
            .run()
            .await
            .map_err(|e| WhizError::Link(format!("linking client run failed: {e}")))?;

        let session = WhatsAppLinkSession {
            client,
            handle: Mutex::new(Some(handle)),
            session_dir: session_dir.to_path_buf(),
        };
        Ok((Box::new(session), rx))
    }
}

/// A running linking client.
struct WhatsAppLinkSession {
    client: Arc<Client>,
    handle: Mutex<Option<JoinHandle<()>>>,
    session_dir: PathBuf,
}

#[async_trait]
impl LinkSession for WhatsAppLinkSession {
    async fn own_jid(&self) -> Option<String> {
        self.client.get_pn().await.map(|jid| user_jid(&jid))
    }

    async fn send_text(&self, jid: &str, text: &str) -> Result<(), WhizError> {
        let jid = parse_jid(jid)?;
        let msg = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };
        retry_send(&self.client, &jid, msg).await.map(|_| ())
    }

    async fn capture_session(&self) -> Result<String, WhizError> {
        let files = SessionFiles::read_from(&self.session_dir)?;
        Ok(encode_session(&files))
    }

    async fn destroy(&self) -> Result<(), WhizError> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };
        self.client.disconnect().await;
        handle.abort();
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!("linking client task ended abnormally: {e}");
            }
        }
        Ok(())
    }
}
