//! `genq ask` - one-shot question

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use genq_client::GenieClient;
use genq_conversation::ConversationManager;
use genq_queue::QueueConfig;

#[derive(Args)]
pub struct AskArgs {
    /// The question to send
    pub question: String,
}

pub async fn run(args: AskArgs) -> Result<()> {
    let client = Arc::new(GenieClient::from_env().context("workspace configuration")?);
    let manager = ConversationManager::new(client, QueueConfig::from_env());

    let conversation = manager.start_conversation(None).await;
    let response = manager
        .send_message_immediate(conversation, &args.question)
        .await
        .context("question failed")?;

    println!("{}", response.message);
    Ok(())
}
