//! WebSocket handler for display connections.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::auth::AuthState;
use crate::bridge::{BindError, ClientChannel, ConnectionId, SessionBridge};
use crate::trigger::TriggerRequest;

use super::CONNECTION_BUFFER_SIZE;
use super::types::{ClientCommand, ParsedCommand, ServerEvent};

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// How long queued events may take to flush after the client is done.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the connection should stay open after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Protocol state of one display connection.
///
/// Transport agnostic: outbound events go to the connection's channel and
/// the socket task writes them out.
pub struct Connection {
    channel: ClientChannel,
    bridge: Arc<SessionBridge>,
    auth: AuthState,
    user_id: Option<String>,
    conversation_id: Option<String>,
}

impl Connection {
    pub fn new(
        bridge: Arc<SessionBridge>,
        auth: AuthState,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (channel, rx) = ClientChannel::new(capacity);
        (
            Self {
                channel,
                bridge,
                auth,
                user_id: None,
                conversation_id: None,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.channel.id()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn greet(&self) {
        self.reply(ServerEvent::Connected {
            message: "Connected to callcanvas".to_string(),
        });
    }

    fn reply(&self, event: ServerEvent) {
        if let Err(e) = self.channel.push(event) {
            debug!("Dropping reply to connection {}: {:?}", self.id(), e);
        }
    }

    fn error(&self, message: impl Into<String>) {
        self.reply(ServerEvent::Error {
            message: message.into(),
        });
    }

    /// Handle one text frame.
    pub fn handle_text(&mut self, text: &str) -> Flow {
        match ParsedCommand::parse(text) {
            ParsedCommand::Command(cmd) => self.handle_command(cmd),
            ParsedCommand::Unknown(kind) => {
                debug!(
                    "Ignoring unknown message type '{}' on connection {}",
                    kind,
                    self.id()
                );
                Flow::Continue
            }
            ParsedCommand::Malformed(e) => {
                warn!("Malformed message on connection {}: {}", self.id(), e);
                self.error(e);
                Flow::Continue
            }
        }
    }

    fn handle_command(&mut self, cmd: ClientCommand) -> Flow {
        match cmd {
            ClientCommand::Ping => {
                self.reply(ServerEvent::Pong);
                Flow::Continue
            }
            ClientCommand::Authenticate { token } => self.authenticate(token.as_deref()),
            ClientCommand::JoinConversation { conversation_id } => {
                self.join(conversation_id.trim());
                Flow::Continue
            }
            ClientCommand::LeaveConversation => {
                self.leave();
                Flow::Continue
            }
            ClientCommand::ManualGenerate {
                prompt,
                style,
                aspect_ratio,
            } => {
                self.manual_generate(&prompt, style.as_deref(), aspect_ratio.as_deref());
                Flow::Continue
            }
        }
    }

    fn authenticate(&mut self, token: Option<&str>) -> Flow {
        let claims = match self.auth.validate_token(token.unwrap_or_default()) {
            Ok(claims) => claims,
            Err(e) => {
                warn!("Authentication failed on connection {}: {}", self.id(), e);
                self.error(format!("Authentication failed: {}", e));
                self.disconnect();
                return Flow::Close;
            }
        };

        if self.user_id.as_deref().is_some_and(|current| current != claims.sub) {
            // A different account must not inherit the previous binding.
            self.disconnect();
        }

        info!("Connection {} authenticated as {}", self.id(), claims.sub);
        self.reply(ServerEvent::Authenticated {
            user_id: claims.sub.clone(),
        });
        self.user_id = Some(claims.sub);
        Flow::Continue
    }

    fn join(&mut self, conversation_id: &str) {
        let Some(user_id) = self.user_id.clone() else {
            self.error("Not authenticated");
            return;
        };
        if conversation_id.is_empty() {
            self.error("conversationId must not be empty");
            return;
        }

        if let Some(previous) = self.conversation_id.take()
            && previous != conversation_id
        {
            self.bridge.release(&previous, self.id());
        }

        match self
            .bridge
            .join(conversation_id, &user_id, self.channel.clone())
        {
            Ok(_) => self.conversation_id = Some(conversation_id.to_string()),
            Err(BindError::NotOwner { .. }) => {
                warn!(
                    "User {} may not join conversation {}",
                    user_id, conversation_id
                );
                self.error("Conversation belongs to another user");
            }
        }
    }

    /// The joined conversation, if this connection still displays it.
    ///
    /// A display replaced by another connection loses its join here.
    fn active_conversation(&mut self) -> Option<String> {
        let conversation_id = self.conversation_id.take()?;
        if self.bridge.is_bound_to(&conversation_id, self.id()) {
            self.conversation_id = Some(conversation_id.clone());
            Some(conversation_id)
        } else {
            debug!(
                "Connection {} no longer displays {}",
                self.id(),
                conversation_id
            );
            None
        }
    }

    fn leave(&mut self) {
        if self.conversation_id.is_none() {
            self.error("Not in a conversation");
            return;
        }
        let Some(conversation_id) = self.active_conversation() else {
            self.error("Conversation session is no longer active");
            return;
        };
        self.conversation_id = None;
        self.bridge.disconnect(&conversation_id, self.id());
        self.reply(ServerEvent::Left { conversation_id });
    }

    fn manual_generate(&mut self, prompt: &str, style: Option<&str>, aspect_ratio: Option<&str>) {
        if self.user_id.is_none() {
            self.error("Not authenticated");
            return;
        }
        if self.conversation_id.is_none() {
            self.error("Join a conversation first");
            return;
        }
        let Some(conversation_id) = self.active_conversation() else {
            self.error("Conversation session is no longer active");
            return;
        };
        let request = TriggerRequest::from_parts(prompt, style, aspect_ratio);
        if request.prompt.is_empty() {
            self.error("prompt must not be empty");
            return;
        }

        if self.bridge.generate(&conversation_id, request).is_none() {
            self.conversation_id = None;
            self.error("Conversation session is no longer active");
        }
    }

    /// Tear down this connection's session binding.
    ///
    /// Only ends the session if this connection is still its display.
    pub fn disconnect(&mut self) {
        if let Some(conversation_id) = self.conversation_id.take() {
            self.bridge.disconnect(&conversation_id, self.id());
        }
    }
}

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (mut connection, mut event_rx) = Connection::new(
        Arc::clone(&state.bridge),
        state.auth.clone(),
        CONNECTION_BUFFER_SIZE,
    );
    let conn_id = connection.id();
    info!("Display connection {} opened", conn_id);
    connection.greet();

    let mut send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        ping_interval.tick().await;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    };
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            warn!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }

                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if connection.handle_text(text.as_str()) == Flow::Close {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame on connection {}", conn_id);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("Display connection {} closed by client", conn_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error on connection {}: {}", conn_id, e);
                break;
            }
        }
    }

    connection.disconnect();
    drop(connection);

    // Every sender is gone now, so the writer drains and sends Close.
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
    info!("Display connection {} finished", conn_id);
}
