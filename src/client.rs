//! Chat client library
//!
//! Connects to the server, performs registration, and bridges the connection
//! to a display layer: inbound broadcasts are handed to a [`ChatView`], and
//! outbound text is submitted through a cloneable [`ChatClient`] handle.
//! [`History`] keeps the last few rendered lines for views that redraw.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Local;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::{
    truncate_chars, Broadcast, ClientMessage, FAILED_TOKEN, QUIT_TOKEN, REGISTER_TOKEN,
    SUCCESS_TOKEN, USER_ID_LEN,
};

/// Channel buffer size for submitted messages
const OUTBOUND_QUEUE_SIZE: usize = 32;

/// Number of rendered lines a [`History`] keeps by default
pub const HISTORY_SIZE: usize = 10;

/// Whether a displayed message was sent by the local user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the local user
    Outgoing,
    /// Sent by someone else
    Incoming,
}

impl Direction {
    /// Direction of a broadcast from `sender` as seen by `local_user`
    pub fn for_sender(sender: &str, local_user: &str) -> Self {
        if sender == local_user {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Direction::Outgoing => ">>",
            Direction::Incoming => "<<",
        }
    }
}

/// Display layer fed by the client's reader task
///
/// Called from a background task, concurrently with the UI's own thread.
pub trait ChatView: Send + Sync + 'static {
    fn deliver(&self, ip: &str, user_id: &str, text: &str, direction: Direction);
}

/// Render one chat line: address, user ID, direction marker, text, time
pub fn format_line(
    ip: &str,
    user_id: &str,
    direction: Direction,
    text: &str,
    time: &str,
) -> String {
    format!(
        "{:<15} [{:<5}] {:>2} {:<40} ({})",
        ip,
        user_id,
        direction.marker(),
        text,
        time
    )
}

/// Current local time as `HH:MM:SS`
pub fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Bounded display buffer of rendered lines, oldest first
///
/// Once full, each new line overwrites the oldest one.
#[derive(Debug, Clone)]
pub struct History {
    lines: VecDeque<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Kept lines, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(HISTORY_SIZE)
    }
}

/// Handle for submitting messages on a registered connection
///
/// Cheap to clone; every clone feeds the same connection.
#[derive(Debug, Clone)]
pub struct ChatClient {
    user_id: String,
    outbound: mpsc::Sender<ClientMessage>,
}

impl ChatClient {
    /// Connect to `url` and register as `user_id`
    ///
    /// Returns the client handle plus the reader task, which finishes when the
    /// server closes the connection. User IDs longer than the protocol allows
    /// are truncated.
    pub async fn connect<V: ChatView>(
        url: &str,
        user_id: &str,
        view: Arc<V>,
    ) -> Result<(Self, JoinHandle<()>), AppError> {
        let user_id = truncate_chars(user_id, USER_ID_LEN);

        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let hello = ClientMessage::new(&user_id, REGISTER_TOKEN).encode()?;
        ws_sender.send(Message::Text(hello.into())).await?;

        let reply = next_broadcast(&mut ws_receiver).await?;
        if !reply.is_reply(SUCCESS_TOKEN) {
            warn!("Registration as '{}' rejected: {}", user_id, reply.message);
            return Err(AppError::RegistrationRejected);
        }
        info!("Registered as '{}' at {}", user_id, url);

        let (outbound, mut outbound_rx) = mpsc::channel::<ClientMessage>(OUTBOUND_QUEUE_SIZE);

        // Write task: submitted messages → WebSocket
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let json = match msg.encode() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket send failed, ending client write task");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        // Read task: broadcasts → view
        let local_user = user_id.clone();
        let reader = tokio::spawn(async move {
            loop {
                let bcast = match next_broadcast(&mut ws_receiver).await {
                    Ok(bcast) => bcast,
                    Err(e) => {
                        debug!("Connection to server ended: {}", e);
                        break;
                    }
                };
                if bcast.is_reply(FAILED_TOKEN) {
                    warn!("Server rejected the session");
                    break;
                }
                let direction = Direction::for_sender(&bcast.client_user_id, &local_user);
                view.deliver(&bcast.client_ip, &bcast.client_user_id, &bcast.message, direction);
            }
        });

        Ok((Self { user_id, outbound }, reader))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Send chat text, waiting for queue space if needed
    pub async fn submit(&self, text: &str) -> Result<(), AppError> {
        self.outbound
            .send(ClientMessage::new(&self.user_id, text))
            .await
            .map_err(|_| AppError::ChannelSend)
    }

    /// Send chat text without waiting; usable from a non-async UI thread
    pub fn try_submit(&self, text: &str) -> Result<(), AppError> {
        self.outbound
            .try_send(ClientMessage::new(&self.user_id, text))
            .map_err(|_| AppError::ChannelSend)
    }

    /// Leave the chat; the server closes the connection afterwards
    pub async fn quit(&self) -> Result<(), AppError> {
        self.submit(QUIT_TOKEN).await
    }
}

/// Next broadcast frame from the server
async fn next_broadcast<S>(frames: &mut S) -> Result<Broadcast, AppError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = frames.next().await {
        match msg_result? {
            Message::Text(text) => return Broadcast::decode(&text.to_string()),
            Message::Close(_) => return Err(AppError::Disconnected),
            _ => continue,
        }
    }
    Err(AppError::Disconnected)
}
