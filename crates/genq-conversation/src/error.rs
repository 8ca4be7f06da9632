//! Conversation layer errors

use std::time::Duration;

use genq_client::ClientError;
use genq_queue::{QueueError, RequestId};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("conversation {0} not found")]
    UnknownConversation(Uuid),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The queued request reached `Failed`; carries its recorded error.
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("request {0} completed without a result")]
    MissingResult(RequestId),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("queued requests still pending after {0:?}")]
    DrainTimeout(Duration),

    /// Direct client failure on the unqueued path.
    #[error(transparent)]
    Client(#[from] ClientError),
}
