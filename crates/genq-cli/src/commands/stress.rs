//! `genq stress` - burst-submit questions to exercise queueing and backoff

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use genq_client::GenieClient;
use genq_conversation::ConversationManager;
use genq_queue::QueueConfig;

use crate::{print_error, print_success};

const QUESTIONS: &[&str] = &[
    "What is the total revenue?",
    "Which region has the highest sales?",
    "What is the most popular product?",
    "How many customers do we have?",
    "What is the average order value?",
    "Which product category is most profitable?",
    "How has sales changed over time?",
    "What is the customer retention rate?",
    "Which marketing channel is most effective?",
    "What is the inventory turnover rate?",
];

#[derive(Args)]
pub struct StressArgs {
    /// Number of questions to submit
    #[arg(short = 'n', long, default_value_t = 10)]
    pub count: usize,

    /// Seconds to wait for each answer
    #[arg(long, default_value_t = 180)]
    pub timeout: u64,
}

pub async fn run(args: StressArgs) -> Result<()> {
    let client = Arc::new(GenieClient::from_env().context("workspace configuration")?);
    let manager = ConversationManager::new(client, QueueConfig::from_env());
    manager.initialize();

    let conversation = manager.start_conversation(None).await;

    println!(
        "Submitting {} questions rapidly; rate-limit responses are retried with backoff.",
        args.count
    );

    let started = Instant::now();
    let mut requests = Vec::with_capacity(args.count);
    for i in 0..args.count {
        let question = QUESTIONS[i % QUESTIONS.len()];
        let request = manager.send_message(conversation, question).await?;
        println!("  queued {request}: {question}");
        requests.push(request);
    }

    let mut completed = 0usize;
    let mut failed = 0usize;
    for request in &requests {
        match manager
            .response(*request, Some(Duration::from_secs(args.timeout)))
            .await
        {
            Ok(_) => {
                completed += 1;
                println!("  done {}/{}", completed, requests.len());
            }
            Err(answer_error) => {
                failed += 1;
                print_error(&format!("{request} failed: {answer_error}"));
            }
        }
    }

    let elapsed = started.elapsed();
    let stats = manager.queue_stats();

    println!("\nResults:");
    println!("  submitted: {}", requests.len());
    println!("  completed: {completed}");
    println!("  failed:    {failed}");
    println!("  elapsed:   {:.2}s", elapsed.as_secs_f64());
    println!(
        "  avg/question: {:.2}s",
        elapsed.as_secs_f64() / requests.len().max(1) as f64
    );
    println!("\nQueue statistics:");
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if failed == 0 {
        print_success("all questions answered");
    } else {
        print_error("some questions failed; see log for details");
    }

    manager.shutdown().await;
    Ok(())
}
