//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{DirectSender, MatchHandle, PlayerId};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

const OUTBOUND_BUFFER: usize = 128;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    let _connection = state.track_connection();
    info!(player_id = %player_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let (direct_tx, direct_rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(write_loop(player_id, ws_sink, out_rx, direct_rx));

    let mut session = Session {
        player_id,
        state,
        out_tx,
        direct_tx,
        current: None,
    };
    session.read_loop(ws_stream).await;
    session.leave_current().await;

    writer.abort();
    info!(player_id = %player_id, "WebSocket connection closed");
}

/// The match a socket is currently part of
struct Joined {
    handle: MatchHandle,
    forwarder: JoinHandle<()>,
}

struct Session {
    player_id: PlayerId,
    state: AppState,
    /// Broadcasts forwarded from the match
    out_tx: mpsc::Sender<ServerMsg>,
    /// Replies meant for this socket alone
    direct_tx: DirectSender,
    current: Option<Joined>,
}

impl Session {
    async fn read_loop(&mut self, mut ws_stream: SplitStream<WebSocket>) {
        let player_id = self.player_id;
        let rate_limiter = PlayerRateLimiter::new();

        while let Some(result) = ws_stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if !rate_limiter.check_input() {
                        warn!(player_id = %player_id, "Rate limited inbound message");
                        continue;
                    }

                    match ClientMsg::decode(&text) {
                        Ok(msg) => self.dispatch(msg).await,
                        Err(e) => {
                            debug!(player_id = %player_id, error = %e, "Rejected client message");
                            self.reply(ServerMsg::error("invalid_message", e.to_string()));
                        }
                    }
                }
                Ok(Message::Binary(_)) => {
                    warn!(player_id = %player_id, "Received binary message, ignoring");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    info!(player_id = %player_id, "Client initiated close");
                    break;
                }
                Err(e) => {
                    error!(player_id = %player_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    async fn dispatch(&mut self, msg: ClientMsg) {
        match msg {
            ClientMsg::JoinMatch {
                match_id,
                player_name,
            } if self.current.is_none() => {
                self.join(match_id.as_deref(), player_name).await;
            }
            ClientMsg::LeaveMatch => {
                self.leave_current().await;
            }
            msg => {
                let Some(joined) = &self.current else {
                    self.reply(ServerMsg::error("not_in_match", "Join a match first"));
                    return;
                };
                if !joined.handle.send(self.player_id, msg).await {
                    // Match actor is gone; the socket may join another
                    if let Some(joined) = self.current.take() {
                        joined.forwarder.abort();
                    }
                }
            }
        }
    }

    async fn join(&mut self, match_id: Option<&str>, player_name: Option<String>) {
        let handle = self.state.match_registry.find_or_create(match_id);
        let rx = handle.subscribe();

        match handle
            .join(self.player_id, player_name, self.direct_tx.clone())
            .await
        {
            Ok(team) => {
                info!(
                    player_id = %self.player_id,
                    match_id = %handle.id,
                    team = %team,
                    "Socket joined match"
                );
                let forwarder = tokio::spawn(forward_loop(self.player_id, rx, self.out_tx.clone()));
                self.current = Some(Joined { handle, forwarder });
            }
            Err(e) => {
                self.reply(ServerMsg::error(e.code(), e.to_string()));
            }
        }
    }

    async fn leave_current(&mut self) {
        if let Some(joined) = self.current.take() {
            joined.handle.leave(self.player_id).await;
            joined.forwarder.abort();
        }
    }

    fn reply(&self, msg: ServerMsg) {
        let _ = self.direct_tx.send(msg);
    }
}

/// Match broadcasts -> this socket's outbound queue
async fn forward_loop(
    player_id: PlayerId,
    mut rx: broadcast::Receiver<ServerMsg>,
    out_tx: mpsc::Sender<ServerMsg>,
) {
    loop {
        match rx.recv().await {
            Ok(msg) => {
                if out_tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(
                    player_id = %player_id,
                    lagged_count = n,
                    "Client lagged, skipping {} messages", n
                );
                // Continue - don't disconnect for lag
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(player_id = %player_id, "Match output closed");
                break;
            }
        }
    }
}

/// Outbound queues -> WebSocket, direct replies first
async fn write_loop(
    player_id: PlayerId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMsg>,
    mut direct_rx: mpsc::UnboundedReceiver<ServerMsg>,
) {
    loop {
        let msg = tokio::select! {
            biased;
            Some(msg) = direct_rx.recv() => msg,
            Some(msg) = out_rx.recv() => msg,
            else => break,
        };
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
