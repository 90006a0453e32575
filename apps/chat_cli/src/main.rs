mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{ChatError, ChatEvent, ChatSession};
use shared::domain::Message;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::{Args, CliSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = CliSettings::load(&args)?.into_chat_config()?;
    let session = ChatSession::connect(config).context("failed to start chat session")?;

    if let Some(chat_id) = session.chat_id() {
        println!("chat id: {chat_id}");
    }
    if session.config().sink.is_none() {
        println!("no webhook configured; pass --webhook-url to forward requests");
    }
    for message in session.transcript().await {
        print_message(&message);
    }

    let printer = tokio::spawn(print_events(session.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim() == "/quit" {
            break;
        }
        session.set_input(line).await;
        match session.submit_input().await {
            Ok(delivery) => {
                let outcome = delivery.outcome().await;
                debug!(?outcome, "delivery finished");
            }
            Err(ChatError::EmptyInput) => {}
            Err(err) => warn!(error = %err, "message not sent"),
        }
    }

    drop(session);
    let _ = printer.await;
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<ChatEvent>) {
    loop {
        match events.recv().await {
            Ok(ChatEvent::MessageAppended(message)) if !message.is_visitor() => {
                print_message(&message)
            }
            Ok(ChatEvent::Notification(notice)) => {
                println!("  [{}] {}", notice.title, notice.description)
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "chat events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_message(message: &Message) {
    let who = if message.is_visitor() { "you" } else { "agent" };
    println!(
        "{} {who}> {}",
        message.timestamp.format("%H:%M"),
        message.content
    );
}
