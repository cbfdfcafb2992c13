//! Transport trait implementation for WhatsApp.

use super::events::{SentIds, WaMedia};
use super::send::{content_message, parse_jid, retry_send, text_messages};
use super::WhatsAppTransport;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wacore_binary::jid::Jid;
use whiz_core::{
    error::WhizError,
    message::{
        GroupMetadata, GroupParticipant, IncomingMessage, MediaAttachment, MessageContent,
        OutgoingMessage, ParticipantAction,
    },
    traits::Transport,
};

/// Bare user JID (`user@s.whatsapp.net`) for a possibly device-qualified JID.
pub(super) fn user_jid(jid: &Jid) -> String {
    format!("{}@s.whatsapp.net", jid.user)
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, WhizError> {
        let (tx, rx) = mpsc::channel(64);
        self.build_and_run_bot(tx).await?;
        info!("WhatsApp transport started");
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<String, WhizError> {
        let client = self.connected_client().await?;
        let jid = parse_jid(&message.chat)?;

        let protocol_messages = match &message.content {
            MessageContent::Text(text) => text_messages(text, &message),
            _ => vec![content_message(&client, &message).await?],
        };

        let track = SentIds::tracks(&message.chat);
        let mut last_id = String::new();
        for msg in protocol_messages {
            let msg_id = retry_send(&client, &jid, msg).await?;
            if track {
                self.sent_ids.lock().await.record(msg_id.clone());
            }
            last_id = msg_id;
        }
        debug!("sent {} to {}", last_id, message.chat);
        Ok(last_id)
    }

    async fn download(&self, media: &MediaAttachment) -> Result<Vec<u8>, WhizError> {
        let client = self.connected_client().await?;
        let wa_media = media
            .handle
            .downcast_ref::<WaMedia>()
            .ok_or_else(|| WhizError::Transport("media handle is not a whatsapp message".into()))?;

        let result = match wa_media {
            WaMedia::Image(m) => client.download(m).await,
            WaMedia::Video(m) => client.download(m).await,
            WaMedia::Sticker(m) => client.download(m).await,
            WaMedia::Audio(m) => client.download(m).await,
            WaMedia::Document(m) => client.download(m).await,
        };
        result.map_err(|e| WhizError::Transport(format!("whatsapp media download failed: {e}")))
    }

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, WhizError> {
        let client = self.connected_client().await?;
        let jid = parse_jid(group)?;
        let meta = client
            .query_group_metadata(&jid)
            .await
            .map_err(|e| WhizError::Transport(format!("group metadata query failed: {e}")))?;

        Ok(GroupMetadata {
            jid: group.to_string(),
            subject: meta.subject.clone(),
            description: None,
            owner: None,
            created_at: None,
            participants: meta
                .participants
                .iter()
                .map(|p| GroupParticipant {
                    jid: p.jid.to_string(),
                    is_admin: p.is_admin,
                    is_super_admin: false,
                })
                .collect(),
        })
    }

    async fn update_participants(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), WhizError> {
        let client = self.connected_client().await?;
        let group_jid = parse_jid(group)?;
        let jids = participants
            .iter()
            .map(|p| parse_jid(p))
            .collect::<Result<Vec<_>, _>>()?;

        let result = match action {
            ParticipantAction::Promote => client.promote_group_participants(&group_jid, &jids).await,
            ParticipantAction::Demote => client.demote_group_participants(&group_jid, &jids).await,
            ParticipantAction::Remove => client.remove_group_participants(&group_jid, &jids).await,
        };
        let results = result.map_err(|e| {
            WhizError::Transport(format!("group {} failed: {e}", action.as_str()))
        })?;

        // Per-participant outcomes: (jid, success, error code).
        let failed: Vec<String> = results
            .into_iter()
            .filter(|(_, ok, _)| !ok)
            .map(|(jid, _, code)| format!("{jid} ({code:?})"))
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            warn!("group {} partially failed: {}", action.as_str(), failed.join(", "));
            Err(WhizError::Transport(format!(
                "could not {} {}",
                action.as_str(),
                failed.join(", ")
            )))
        }
    }

    async fn group_invite_code(&self, group: &str) -> Result<String, WhizError> {
        let client = self.connected_client().await?;
        let jid = parse_jid(group)?;
        let link = client
            .get_group_invite_link(&jid, false)
            .await
            .map_err(|e| WhizError::Transport(format!("invite link query failed: {e}")))?;
        // The server may answer with a full link or the bare code.
        Ok(link.rsplit('/').next().unwrap_or(&link).to_string())
    }

    async fn joined_groups(&self) -> Result<Vec<String>, WhizError> {
        let client = self.connected_client().await?;
        let groups = client
            .get_joined_groups()
            .await
            .map_err(|e| WhizError::Transport(format!("joined groups query failed: {e}")))?;
        Ok(groups.into_iter().map(|g| g.id.to_string()).collect())
    }

    async fn wait_connected(&self) {
        let mut rx = self.connected.subscribe();
        // Sender lives as long as the transport; an error means shutdown.
        let _ = rx.wait_for(|connected| *connected).await;
    }

    async fn own_jid(&self) -> Option<String> {
        let client = self.client.lock().await.clone()?;
        client.get_pn().await.map(|jid| user_jid(&jid))
    }

    async fn stop(&self) -> Result<(), WhizError> {
        if let Some(client) = self.client.lock().await.take() {
            client.disconnect().await;
        }
        if let Some(handle) = self.bot_handle.lock().await.take() {
            handle.abort();
        }
        self.connected.send_replace(false);
        info!("WhatsApp transport stopped");
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
