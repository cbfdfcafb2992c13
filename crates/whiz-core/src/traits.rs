use crate::{
    error::WhizError,
    message::{GroupMetadata, IncomingMessage, MediaAttachment, OutgoingMessage, ParticipantAction},
};
use async_trait::async_trait;

/// Messaging transport trait.
///
/// The WhatsApp client implements this to deliver incoming messages and
/// carry out everything commands ask of the network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, WhizError>;

    /// Send a message. Returns the transport message ID.
    async fn send(&self, message: OutgoingMessage) -> Result<String, WhizError>;

    /// Download and decrypt a media attachment.
    async fn download(&self, media: &MediaAttachment) -> Result<Vec<u8>, WhizError>;

    /// Fetch group metadata.
    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, WhizError>;

    /// Promote, demote or remove group participants.
    async fn update_participants(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), WhizError>;

    /// Fetch the invite code for a group.
    async fn group_invite_code(&self, group: &str) -> Result<String, WhizError>;

    /// JIDs of all groups the bot is a member of.
    async fn joined_groups(&self) -> Result<Vec<String>, WhizError>;

    /// Resolve once the transport has an authenticated connection.
    async fn wait_connected(&self);

    /// The bot's own JID, once connected.
    async fn own_jid(&self) -> Option<String>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), WhizError>;

    /// Downcast support for transport-specific operations.
    fn as_any(&self) -> &dyn std::any::Any;
}
