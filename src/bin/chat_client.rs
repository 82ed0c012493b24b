//! Broadcast Chat Client - Entry Point
//!
//! Line-based front end: every stdin line is sent as a chat message and every
//! broadcast is printed as one formatted line. An empty line reprints the
//! recent history. `>>bye<<` (or end of input) leaves the chat.

use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use broadcast_chat::message::QUIT_TOKEN;
use broadcast_chat::{format_line, timestamp, ChatClient, ChatView, Direction, History};

/// Default server URL
const DEFAULT_URL: &str = "ws://127.0.0.1:30000";

/// How long to wait for the server to close the connection after quitting
const QUIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Default)]
struct StdoutView {
    history: Mutex<History>,
}

impl StdoutView {
    fn redraw(&self) {
        if let Ok(history) = self.history.lock() {
            for line in history.lines() {
                println!("{}", line);
            }
        }
    }
}

impl ChatView for StdoutView {
    fn deliver(&self, ip: &str, user_id: &str, text: &str, direction: Direction) {
        let line = format_line(ip, user_id, direction, text, &timestamp());
        println!("{}", line);
        if let Ok(mut history) = self.history.lock() {
            history.push(line);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout is the chat display
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("broadcast_chat=info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let Some(user_id) = args.next() else {
        eprintln!("Usage: chat_client <user-id> [ws-url]");
        std::process::exit(2);
    };
    let url = args.next().unwrap_or_else(|| DEFAULT_URL.to_string());

    let view = Arc::new(StdoutView::default());
    let (client, mut reader) = ChatClient::connect(&url, &user_id, view.clone()).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut server_closed = false;

    loop {
        tokio::select! {
            _ = &mut reader => {
                info!("Server closed the connection");
                server_closed = true;
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) if line.trim() == QUIT_TOKEN => {
                    client.quit().await?;
                    break;
                }
                Some(line) if line.trim().is_empty() => view.redraw(),
                Some(line) => client.submit(&line).await?,
                None => {
                    client.quit().await?;
                    break;
                }
            },
        }
    }

    // Let the quit request reach the server before exiting
    if !server_closed {
        let _ = tokio::time::timeout(QUIT_GRACE, reader).await;
    }

    Ok(())
}
