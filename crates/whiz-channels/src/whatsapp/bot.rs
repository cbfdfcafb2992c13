//! Bot lifecycle: building and running the WhatsApp client.

use super::events::handle_whatsapp_message;
use super::qr::generate_qr_terminal;
use super::WhatsAppTransport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wacore::types::events::Event;
use whatsapp_rust::bot::Bot;
use whatsapp_rust_sqlite_storage::SqliteStore;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;
use whiz_core::{error::WhizError, message::IncomingMessage};

impl WhatsAppTransport {
    /// Build a WhatsApp bot with the event handler and run it in the background.
    pub(super) async fn build_and_run_bot(
        &self,
        tx: mpsc::Sender<IncomingMessage>,
    ) -> Result<(), WhizError> {
        let db_path = self.session_db_path()?;
        info!("WhatsApp bot building (session: {db_path})...");

        let backend = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .map_err(|e| WhizError::Transport(format!("whatsapp store init failed: {e}")))?,
        );

        let client_handle = self.client.clone();
        let sent_ids_handle = self.sent_ids.clone();
        let connected_handle = self.connected.clone();

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let tx = tx.clone();
                let client_store = client_handle.clone();
                let sent_ids = sent_ids_handle.clone();
                let connected = connected_handle.clone();
                async move {
                    match event {
                        Event::PairingQrCode { code, .. } => {
                            info!("No session found. Scan this QR code with WhatsApp > Linked Devices, or import a session id.");
                            match generate_qr_terminal(&code) {
                                Ok(rendered) => info!("\n{rendered}"),
                                Err(e) => warn!("QR render failed: {e}"),
                            }
                        }
                        Event::PairSuccess(_) => {
                            info!("WhatsApp pairing successful!");
                        }
                        Event::Connected(_) => {
                            info!("WhatsApp connected");
                            *client_store.lock().await = Some(client);
                            connected.send_replace(true);
                        }
                        Event::Disconnected(_) => {
                            warn!("WhatsApp disconnected");
                            connected.send_replace(false);
                        }
                        Event::LoggedOut(_) => {
                            warn!("WhatsApp logged out, session invalidated; link again with `whiz link`");
                            *client_store.lock().await = None;
                            connected.send_replace(false);
                        }
                        Event::Message(msg, info) => {
                            handle_whatsapp_message(*msg, info, &tx, &sent_ids).await;
                        }
                        _ => {}
                    }
                }
            })
            .build()
            .await
            .map_err(|e| WhizError::Transport(format!("whatsapp bot build failed: {e}")))?;

        // Store client reference immediately; sends fail cleanly until connected.
        *self.client.lock().await = Some(bot.client());

        let handle = bot
            .run()
            .await
            .map_err(|e| WhizError::Transport(format!("whatsapp bot run failed: {e}")))?;
        *self.bot_handle.lock().await = Some(handle);

        info!("WhatsApp bot started");
        Ok(())
    }
}
