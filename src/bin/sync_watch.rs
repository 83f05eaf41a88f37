//! Drive the client sync layer from the terminal.
//!
//! Usage: `cargo run --bin sync-watch`, then type one event per line:
//! `visible`, `hidden`, `online`, `offline`, `focus`, `blur`.
//! `posts` fetches the first page through the query cache and `status`
//! prints the connection state.
//!
//! `PEDIABLOG_TOKEN` sets the initial session token.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pediablog::client::{PostQuery, SyncClient, SyncEvent, TracingNotifier};
use pediablog::config::Config;

#[derive(Debug, PartialEq)]
enum Command {
    Event(SyncEvent),
    Posts,
    Status,
}

fn parse_command(line: &str) -> Option<Command> {
    let command = match line.trim().to_ascii_lowercase().as_str() {
        "visible" => Command::Event(SyncEvent::Visibility(true)),
        "hidden" => Command::Event(SyncEvent::Visibility(false)),
        "online" => Command::Event(SyncEvent::Online),
        "offline" => Command::Event(SyncEvent::Offline),
        "focus" => Command::Event(SyncEvent::Focus(true)),
        "blur" => Command::Event(SyncEvent::Focus(false)),
        "posts" => Command::Posts,
        "status" => Command::Status,
        _ => return None,
    };
    Some(command)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pediablog=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load_with_env(Path::new("config.yml"))?;
    let token = std::env::var("PEDIABLOG_TOKEN").ok().filter(|t| !t.is_empty());
    tracing::info!(
        api = %config.client.api_base_url,
        authenticated = token.is_some(),
        "Starting sync watcher"
    );

    let client = SyncClient::from_config(&config.client, token, Arc::new(TracingNotifier))?;
    let (tx, rx) = mpsc::channel(32);
    let watcher = tokio::spawn(client.watcher.clone().run(rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Some(Command::Event(event)) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Some(Command::Posts) => match client.api.posts(&PostQuery::page(1)).await {
                Ok(list) => tracing::info!(count = list.posts.len(), total = list.total, "Fetched posts"),
                Err(e) => tracing::warn!("Fetching posts failed: {}", e),
            },
            Some(Command::Status) => tracing::info!(
                state = ?client.watcher.state(),
                online = client.watcher.is_online(),
                visible = client.watcher.is_visible(),
                "Status"
            ),
            None => tracing::warn!("Unknown command: {}", line.trim()),
        }
    }

    drop(tx);
    watcher.await?;
    Ok(())
}
