//! Conversation manager: histories plus queued message delivery

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use genq_client::{ClientError, ConversationClient, ConversationMessage, ConversationResponse};
use genq_queue::{
    OperationOutcome, QueueConfig, QueueManager, QueueStats, RequestId, RequestStatus,
};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ConversationError;

/// Poll interval for the coarse drain wait in [`wait_for_all`].
///
/// [`wait_for_all`]: ConversationManager::wait_for_all
const DRAIN_POLL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Conversation {
    history: Vec<ConversationMessage>,
    /// Server-side conversation id, known after the first answer.
    remote_id: Option<String>,
}

/// Manages conversations whose outgoing messages flow through the
/// bounded request queue.
pub struct ConversationManager {
    queue: QueueManager,
    client: Arc<dyn ConversationClient>,
    conversations: Arc<RwLock<HashMap<Uuid, Conversation>>>,
}

impl ConversationManager {
    pub fn new(client: Arc<dyn ConversationClient>, queue_config: QueueConfig) -> Self {
        Self {
            queue: QueueManager::new(queue_config),
            client,
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start the queue workers. Idempotent.
    pub fn initialize(&self) {
        self.queue.start();
        info!("conversation manager initialized");
    }

    /// Stop the queue workers, waiting for in-flight requests to settle.
    pub async fn shutdown(&self) {
        self.queue.stop().await;
        info!("conversation manager shut down");
    }

    /// Open a new local conversation, optionally seeded with a system turn.
    pub async fn start_conversation(&self, system_message: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        let mut conversation = Conversation::default();
        if let Some(content) = system_message {
            conversation.history.push(ConversationMessage::system(content));
        }
        self.conversations.write().await.insert(id, conversation);
        info!(conversation_id = %id, "started conversation");
        id
    }

    /// Queue a user message for delivery; returns immediately with the
    /// request identifier to [`response`](Self::response) on.
    pub async fn send_message(
        &self,
        conversation: Uuid,
        text: &str,
    ) -> Result<RequestId, ConversationError> {
        {
            let mut conversations = self.conversations.write().await;
            let entry = conversations
                .get_mut(&conversation)
                .ok_or(ConversationError::UnknownConversation(conversation))?;
            entry.history.push(ConversationMessage::user(text));
        }

        let client = self.client.clone();
        let conversations = self.conversations.clone();
        let text = text.to_string();

        let request = self.queue.submit_fn(move || {
            let client = client.clone();
            let conversations = conversations.clone();
            let text = text.clone();
            async move {
                deliver(client, conversations, conversation, text).await
            }
        })?;

        debug!(conversation_id = %conversation, request_id = %request, "queued message");
        Ok(request)
    }

    /// Send a message without going through the queue.
    pub async fn send_message_immediate(
        &self,
        conversation: Uuid,
        text: &str,
    ) -> Result<ConversationResponse, ConversationError> {
        {
            let mut conversations = self.conversations.write().await;
            let entry = conversations
                .get_mut(&conversation)
                .ok_or(ConversationError::UnknownConversation(conversation))?;
            entry.history.push(ConversationMessage::user(text));
        }

        let remote_id = self
            .conversations
            .read()
            .await
            .get(&conversation)
            .and_then(|c| c.remote_id.clone());

        let response = self.client.send_message(remote_id.as_deref(), text).await?;
        record_answer(&self.conversations, conversation, &response).await;
        Ok(response)
    }

    /// Wait for a queued request and decode its answer.
    pub async fn response(
        &self,
        request: RequestId,
        timeout: Option<Duration>,
    ) -> Result<ConversationResponse, ConversationError> {
        let record = self.queue.wait(request, timeout).await?;
        match record.status {
            RequestStatus::Completed => {
                let value = record
                    .result
                    .ok_or(ConversationError::MissingResult(request))?;
                Ok(serde_json::from_value(value)?)
            }
            RequestStatus::Failed => Err(ConversationError::RequestFailed(
                record.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            other => Err(ConversationError::RequestFailed(format!(
                "request {request} returned in non-terminal status {other:?}"
            ))),
        }
    }

    pub async fn history(&self, conversation: Uuid) -> Vec<ConversationMessage> {
        self.conversations
            .read()
            .await
            .get(&conversation)
            .map(|c| c.history.clone())
            .unwrap_or_default()
    }

    pub async fn conversation_ids(&self) -> Vec<Uuid> {
        self.conversations.read().await.keys().copied().collect()
    }

    pub async fn delete_conversation(&self, conversation: Uuid) {
        if self.conversations.write().await.remove(&conversation).is_some() {
            info!(conversation_id = %conversation, "deleted conversation");
        }
    }

    /// Block until the queue is drained: nothing waiting, nothing active.
    pub async fn wait_for_all(&self, timeout: Option<Duration>) -> Result<(), ConversationError> {
        let started = Instant::now();
        loop {
            let stats = self.queue.stats();
            if stats.queue_size == 0 && stats.active_count == 0 {
                return Ok(());
            }
            if let Some(limit) = timeout {
                if started.elapsed() > limit {
                    return Err(ConversationError::DrainTimeout(limit));
                }
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

/// The queued operation body: look up the remote conversation, call the
/// client, store the answer, and tag the outcome for the queue.
async fn deliver(
    client: Arc<dyn ConversationClient>,
    conversations: Arc<RwLock<HashMap<Uuid, Conversation>>>,
    conversation: Uuid,
    text: String,
) -> OperationOutcome {
    let remote_id = conversations
        .read()
        .await
        .get(&conversation)
        .and_then(|c| c.remote_id.clone());

    match client.send_message(remote_id.as_deref(), &text).await {
        Ok(response) => {
            record_answer(&conversations, conversation, &response).await;
            match serde_json::to_value(&response) {
                Ok(value) => OperationOutcome::Success(value),
                Err(encode_error) => {
                    OperationOutcome::Failed(format!("failed to encode response: {encode_error}"))
                }
            }
        }
        Err(ClientError::RateLimited {
            message,
            retry_after,
        }) => OperationOutcome::RateLimited {
            message,
            retry_after,
        },
        Err(other) => OperationOutcome::Failed(other.to_string()),
    }
}

async fn record_answer(
    conversations: &Arc<RwLock<HashMap<Uuid, Conversation>>>,
    conversation: Uuid,
    response: &ConversationResponse,
) {
    let mut conversations = conversations.write().await;
    if let Some(entry) = conversations.get_mut(&conversation) {
        entry.remote_id = Some(response.conversation_id.clone());
        entry
            .history
            .push(ConversationMessage::assistant(&response.message));
    }
}
