//! WebSocket connection handler
//!
//! Drives one client through `AwaitingRegistration → Registered → Closed`.
//! Inbound frames are read in the handler task itself; outbound frames (replies
//! and broadcasts) go through a per-connection queue drained by a writer task.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::broadcaster::BroadcastSender;
use crate::error::AppError;
use crate::message::{
    Broadcast, ClientMessage, BROADCAST_MESSAGE_LEN, FAILED_TOKEN, QUIT_TOKEN, SUCCESS_TOKEN,
};
use crate::registry::{ClientEntry, SharedRegistry};
use crate::split::split_message;
use crate::types::HandlerId;

type FrameSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type FrameSource = SplitStream<WebSocketStream<TcpStream>>;

/// Shared server state every handler needs
#[derive(Clone)]
pub struct ConnectionContext {
    pub registry: SharedRegistry,
    pub broadcasts: BroadcastSender,
    /// Capacity of each connection's outbound queue
    pub client_queue_size: usize,
}

/// Protocol state of one connection
#[derive(Debug)]
enum HandlerState {
    AwaitingRegistration,
    Registered { user_id: String },
    Closed,
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake and runs the protocol until the client
/// quits or the connection fails. Protocol and I/O failures after the
/// handshake end this connection only and are not returned as errors.
pub async fn handle_connection(stream: TcpStream, ctx: ConnectionContext) -> Result<(), AppError> {
    let peer_addr = stream.peer_addr()?;
    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (ws_sender, ws_receiver) = ws_stream.split();

    let handler_id = HandlerId::new();
    let (out_tx, out_rx) = mpsc::channel::<Broadcast>(ctx.client_queue_size);
    let write_task = tokio::spawn(write_frames(ws_sender, out_rx, handler_id));

    let mut conn = Connection {
        handler_id,
        address: peer_addr.ip().to_string(),
        frames: ws_receiver,
        outbound: out_tx,
        ctx,
    };

    let mut state = HandlerState::AwaitingRegistration;
    loop {
        state = match state {
            HandlerState::AwaitingRegistration => conn.register().await,
            HandlerState::Registered { user_id } => conn.exchange(user_id).await,
            HandlerState::Closed => break,
        };
    }

    conn.close().await;

    // Writer flushes what is queued, then sends the close frame
    if let Err(e) = write_task.await {
        error!("Writer task for {} panicked: {}", handler_id, e);
    }
    debug!("Connection from {} closed", peer_addr);

    Ok(())
}

struct Connection {
    handler_id: HandlerId,
    address: String,
    frames: FrameSource,
    outbound: mpsc::Sender<Broadcast>,
    ctx: ConnectionContext,
}

impl Connection {
    /// AwaitingRegistration: one frame decides whether the client joins
    async fn register(&mut self) -> HandlerState {
        let msg = match self.read_message().await {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Connection from {} failed before registering: {}", self.address, e);
                return HandlerState::Closed;
            }
        };

        let user_id = msg.client_user_id.clone();
        let entry = ClientEntry::new(
            self.handler_id,
            self.address.clone(),
            user_id.clone(),
            self.outbound.clone(),
        );

        let shared = self.ctx.registry.clone();
        let mut registry = shared.lock().await;
        match registry.register(entry, &msg.message) {
            Ok(()) => {
                // Queued under the lock, so it precedes every broadcast to this client
                self.reply(SUCCESS_TOKEN);
                info!(
                    "Client '{}' from {} registered ({} connected)",
                    user_id,
                    self.address,
                    registry.size()
                );
                HandlerState::Registered { user_id }
            }
            Err(e) => {
                self.reply(FAILED_TOKEN);
                info!(
                    "Client '{}' from {} failed to register: {}",
                    user_id, self.address, e
                );
                HandlerState::Closed
            }
        }
    }

    /// Registered: handle one chat message or the quit request
    ///
    /// Broadcasts carry `user_id` as recorded at registration, not the
    /// `clientUserID` repeated in each message; a different non-blank value
    /// there is ignored. A blank repeated ID ends the connection.
    async fn exchange(&mut self, user_id: String) -> HandlerState {
        let msg = match self.read_message().await {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Client '{}' from {} dropped: {}", user_id, self.address, e);
                return HandlerState::Closed;
            }
        };

        if msg.has_blank_user_id() {
            warn!("Client '{}' from {} sent a message without user ID", user_id, self.address);
            return HandlerState::Closed;
        }

        if msg.message == QUIT_TOKEN {
            let mut registry = self.ctx.registry.lock().await;
            registry.remove_handler(self.handler_id);
            info!(
                "Client '{}' from {} quit ({} connected)",
                user_id,
                self.address,
                registry.size()
            );
            return HandlerState::Closed;
        }

        let (first, second) = split_message(&msg.message, BROADCAST_MESSAGE_LEN);
        for part in std::iter::once(first).chain(second) {
            let bcast = Broadcast::new(&self.address, &user_id, &part);
            if self.ctx.broadcasts.send(bcast).await.is_err() {
                warn!("Broadcast queue closed, dropping client '{}'", user_id);
                return HandlerState::Closed;
            }
        }

        HandlerState::Registered { user_id }
    }

    /// Read the next protocol frame and decode it
    async fn read_message(&mut self) -> Result<ClientMessage, AppError> {
        let text = self.read_frame().await?;
        debug!("Frame from {}: {}", self.address, text);
        ClientMessage::decode(&text)
    }

    async fn read_frame(&mut self) -> Result<String, AppError> {
        while let Some(msg_result) = self.frames.next().await {
            match msg_result? {
                Message::Text(text) => return Ok(text.to_string()),
                Message::Binary(data) => {
                    return String::from_utf8(data.to_vec())
                        .map_err(|e| AppError::Decode(e.to_string()));
                }
                Message::Close(_) => return Err(AppError::Disconnected),
                // Ping/Pong are answered by tungstenite itself
                _ => continue,
            }
        }
        Err(AppError::Disconnected)
    }

    /// Queue a reply carrying a reserved token
    fn reply(&self, token: &str) {
        if let Err(e) = self.outbound.try_send(Broadcast::reply(token)) {
            debug!("Could not queue reply for {}: {}", self.address, e);
        }
    }

    /// Closed: leave the registry if still present and release the connection
    async fn close(self) {
        let removed = self
            .ctx
            .registry
            .lock()
            .await
            .remove_handler(self.handler_id);
        if let Some(entry) = removed {
            info!("Client '{}' from {} disconnected", entry.user_id, entry.address);
        }
        // Dropping `self.outbound` closes the writer's queue
    }
}

/// Writer task: outbound queue → WebSocket
async fn write_frames(
    mut ws_sender: FrameSink,
    mut outbound: mpsc::Receiver<Broadcast>,
    handler_id: HandlerId,
) {
    while let Some(bcast) = outbound.recv().await {
        match bcast.encode() {
            Ok(json) => {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket send failed, ending write task for {}", handler_id);
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize broadcast: {}", e);
                // Continue - don't break on serialization errors
            }
        }
    }

    // Send close frame when done
    let _ = ws_sender.close().await;
    debug!("Write task ended for {}", handler_id);
}
