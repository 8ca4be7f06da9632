//! The conversation client contract

use async_trait::async_trait;

use crate::error::ClientError;
use crate::types::{ConversationMessage, ConversationResponse, SpaceInfo};

/// Seam between the conversation layer and the workspace API.
///
/// Implemented by [`GenieClient`](crate::GenieClient); tests substitute
/// scripted doubles.
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Send one user message, starting a new server-side conversation when
    /// `conversation_id` is `None`.
    async fn send_message(
        &self,
        conversation_id: Option<&str>,
        message: &str,
    ) -> Result<ConversationResponse, ClientError>;

    /// List accessible Genie spaces.
    async fn list_spaces(&self) -> Result<Vec<SpaceInfo>, ClientError>;

    /// Send the latest user turn of a full conversation.
    async fn send_conversation(
        &self,
        messages: &[ConversationMessage],
        conversation_id: Option<&str>,
    ) -> Result<ConversationResponse, ClientError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::MessageRole::User)
            .ok_or(ClientError::MissingUserMessage)?;
        self.send_message(conversation_id, &last_user.content).await
    }
}
