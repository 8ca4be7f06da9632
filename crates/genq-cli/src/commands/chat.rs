//! `genq chat` - interactive conversation

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use genq_client::GenieClient;
use genq_conversation::ConversationManager;
use genq_queue::QueueConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::print_error;

#[derive(Args)]
pub struct ChatArgs {
    /// Seconds to wait for each answer
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,
}

pub async fn run(args: ChatArgs) -> Result<()> {
    let client = Arc::new(GenieClient::from_env().context("workspace configuration")?);
    let manager = ConversationManager::new(client, QueueConfig::from_env());
    manager.initialize();

    let conversation = manager.start_conversation(None).await;

    println!("{}", "GenQ interactive chat".bold());
    println!("Type a question, 'stats' for queue counters, 'quit' to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "you>".cyan().bold());
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "quit" | "exit" => break,
            "stats" => {
                let stats = manager.queue_stats();
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            question => {
                let request = manager.send_message(conversation, question).await?;
                match manager
                    .response(request, Some(Duration::from_secs(args.timeout)))
                    .await
                {
                    Ok(response) => {
                        println!("{} {}\n", "genie>".green().bold(), response.message);
                    }
                    Err(answer_error) => print_error(&answer_error.to_string()),
                }
            }
        }
    }

    manager.shutdown().await;
    println!("bye");
    Ok(())
}
