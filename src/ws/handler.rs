//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::room::{JoinError, RoomHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Queued outbound messages per connection before senders wait
const OUTBOUND_BUFFER: usize = 128;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        session_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome");
        return;
    }

    // Writer task: direct replies and forwarded room broadcasts -> WebSocket
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_BUFFER);
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let mut session = Session::new(session_id, state, out_tx);
    let rate_limiter = ConnectionRateLimiter::new();

    // Reader loop: WebSocket -> session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(client_msg) => {
                    if !admit(&rate_limiter, &client_msg) {
                        warn!(session_id = %session_id, "Rate limited client message");
                        continue;
                    }
                    session.handle(client_msg).await;
                }
                Err(e) => {
                    if !rate_limiter.check_message() {
                        continue;
                    }
                    warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                    session
                        .reply(ServerMsg::error("invalid_message", e.to_string()))
                        .await;
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    if let Some(room_id) = session.room_id() {
        debug!(session_id = %session_id, room_id = %room_id, "Leaving room on disconnect");
    }
    session.leave_room().await;
    writer_handle.abort();

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Input and leave bypass the quota; everything else spends it
fn admit(limiter: &ConnectionRateLimiter, msg: &ClientMsg) -> bool {
    match msg {
        ClientMsg::InputUpdate { .. } | ClientMsg::LeaveGame => true,
        _ => limiter.check_message(),
    }
}

/// Room membership of one connection
struct Membership {
    room: RoomHandle,
    forwarder: JoinHandle<()>,
}

/// Per-connection protocol state, independent of the socket
pub(crate) struct Session {
    id: Uuid,
    state: AppState,
    out_tx: mpsc::Sender<ServerMsg>,
    membership: Option<Membership>,
}

impl Session {
    pub(crate) fn new(id: Uuid, state: AppState, out_tx: mpsc::Sender<ServerMsg>) -> Self {
        Self {
            id,
            state,
            out_tx,
            membership: None,
        }
    }

    pub(crate) fn room_id(&self) -> Option<&str> {
        self.membership.as_ref().map(|m| m.room.id.as_str())
    }

    pub(crate) async fn handle(&mut self, msg: ClientMsg) {
        match msg {
            ClientMsg::JoinGame {
                room_id,
                max_players,
                character,
            } => self.join(room_id, max_players, character).await,

            ClientMsg::InputUpdate { input } => {
                let Some(room) = self.current_room() else {
                    return self.not_in_room().await;
                };
                if !room.send_input(self.id, input).await {
                    self.room_gone().await;
                }
            }

            ClientMsg::LoadLevel { level_id } => {
                let Some(room) = self.current_room() else {
                    return self.not_in_room().await;
                };
                info!(session_id = %self.id, room_id = %room.id, level_id, "Level requested");
                if !room.load_level(level_id).await {
                    self.room_gone().await;
                }
            }

            ClientMsg::Ping { t } => self.reply(ServerMsg::Pong { t }).await,

            ClientMsg::LeaveGame => {
                if self.membership.is_none() {
                    return self.not_in_room().await;
                }
                self.leave_room().await;
            }
        }
    }

    async fn join(&mut self, room_id: String, max_players: Option<usize>, character: Option<String>) {
        if self.membership.is_some() {
            return self
                .reply(ServerMsg::error("already_in_room", "Leave your current room first"))
                .await;
        }

        let room_id = room_id.trim().to_string();
        if room_id.is_empty() {
            return self
                .reply(ServerMsg::error("invalid_room", "Room id must not be empty"))
                .await;
        }

        let character = character.filter(|c| !c.trim().is_empty());

        match self
            .state
            .rooms
            .join(&room_id, self.id, max_players, character)
            .await
        {
            Ok(ticket) => {
                // Direct reply first so the client sees it before any broadcast
                self.reply(ServerMsg::JoinedGame {
                    room_id: room_id.clone(),
                    player_id: self.id,
                    player_index: ticket.player_index,
                    max_players: ticket.max_players,
                    game_state: ticket.game_state,
                    config: ticket.config,
                })
                .await;

                let forwarder = spawn_forwarder(self.id, ticket.events, self.out_tx.clone());
                self.membership = Some(Membership {
                    room: ticket.room,
                    forwarder,
                });
            }
            Err(e @ JoinError::RoomFull { .. }) => {
                info!(session_id = %self.id, room_id = %room_id, "Join rejected, room full");
                self.reply(ServerMsg::RoomFull {
                    message: e.to_string(),
                })
                .await;
            }
            Err(e @ JoinError::AlreadyInRoom) => {
                self.reply(ServerMsg::error("already_in_room", e.to_string()))
                    .await;
            }
            Err(e @ JoinError::RoomUnavailable) => {
                self.reply(ServerMsg::error("room_unavailable", e.to_string()))
                    .await;
            }
        }
    }

    /// Leave the current room, if any
    pub(crate) async fn leave_room(&mut self) {
        if let Some(membership) = self.membership.take() {
            membership.forwarder.abort();
            membership.room.leave(self.id).await;
            debug!(session_id = %self.id, room_id = %membership.room.id, "Left room");
        }
    }

    pub(crate) async fn reply(&self, msg: ServerMsg) {
        let _ = self.out_tx.send(msg).await;
    }

    fn current_room(&self) -> Option<RoomHandle> {
        self.membership.as_ref().map(|m| m.room.clone())
    }

    async fn not_in_room(&self) {
        self.reply(ServerMsg::error("not_in_room", "Join a room first"))
            .await;
    }

    /// The room task ended underneath us
    async fn room_gone(&mut self) {
        if let Some(membership) = self.membership.take() {
            membership.forwarder.abort();
            warn!(session_id = %self.id, room_id = %membership.room.id, "Room closed unexpectedly");
        }
        self.not_in_room().await;
    }
}

/// Forward room broadcasts into the connection's outbound channel
fn spawn_forwarder(
    session_id: Uuid,
    mut events: broadcast::Receiver<ServerMsg>,
    out_tx: mpsc::Sender<ServerMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(msg) => {
                    if out_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        session_id = %session_id,
                        lagged_count = n,
                        "Client lagged, skipping {} room messages", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(session_id = %session_id, "Room channel closed");
                    break;
                }
            }
        }
    })
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::entity::InputState;
    use crate::game::level::LevelCatalog;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn state() -> AppState {
        let catalog = Arc::new(LevelCatalog::builtin().unwrap());
        AppState::new(Config::default(), catalog)
    }

    fn session(state: &AppState) -> (Session, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        (Session::new(Uuid::new_v4(), state.clone(), tx), rx)
    }

    async fn next(rx: &mut mpsc::Receiver<ServerMsg>) -> ServerMsg {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    fn join(room_id: &str, max_players: Option<usize>) -> ClientMsg {
        ClientMsg::JoinGame {
            room_id: room_id.to_string(),
            max_players,
            character: None,
        }
    }

    #[tokio::test]
    async fn join_replies_before_broadcasts() {
        let state = state();
        let (mut s, mut rx) = session(&state);

        s.handle(join("lobby", None)).await;

        match next(&mut rx).await {
            ServerMsg::JoinedGame {
                room_id,
                player_index,
                max_players,
                game_state,
                ..
            } => {
                assert_eq!(room_id, "lobby");
                assert_eq!(player_index, 0);
                assert_eq!(max_players, 4);
                assert_eq!(game_state.level_id, 0);
            }
            other => panic!("expected joined_game, got {:?}", other),
        }
        assert!(matches!(
            next(&mut rx).await,
            ServerMsg::PlayerJoined { total_players: 1, .. }
        ));
        assert_eq!(s.room_id(), Some("lobby"));
    }

    #[tokio::test]
    async fn commands_outside_a_room_are_rejected() {
        let state = state();
        let (mut s, mut rx) = session(&state);

        s.handle(ClientMsg::InputUpdate {
            input: InputState::default(),
        })
        .await;
        s.handle(ClientMsg::LoadLevel { level_id: 1 }).await;

        for _ in 0..2 {
            match next(&mut rx).await {
                ServerMsg::Error { code, .. } => assert_eq!(code, "not_in_room"),
                other => panic!("expected error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn second_join_is_rejected_while_in_a_room() {
        let state = state();
        let (mut s, mut rx) = session(&state);

        s.handle(join("lobby", None)).await;
        assert!(matches!(next(&mut rx).await, ServerMsg::JoinedGame { .. }));

        s.handle(join("other", None)).await;
        loop {
            if let ServerMsg::Error { code, .. } = next(&mut rx).await {
                assert_eq!(code, "already_in_room");
                break;
            }
        }
        assert_eq!(state.rooms.active_rooms(), 1);
    }

    #[tokio::test]
    async fn full_room_sends_room_full() {
        let state = state();
        let (mut first, _rx1) = session(&state);
        let (mut second, mut rx2) = session(&state);

        first.handle(join("solo", Some(1))).await;
        second.handle(join("solo", None)).await;

        assert!(matches!(next(&mut rx2).await, ServerMsg::RoomFull { .. }));
        assert_eq!(second.room_id(), None);
    }

    #[tokio::test]
    async fn leaving_tears_down_empty_room() {
        let state = state();
        let (mut s, _rx) = session(&state);

        s.handle(join("lobby", None)).await;
        assert_eq!(state.rooms.active_rooms(), 1);

        s.handle(ClientMsg::LeaveGame).await;
        assert_eq!(s.room_id(), None);

        timeout(Duration::from_secs(2), async {
            while state.rooms.active_rooms() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("room was not removed");
    }

    #[test]
    fn exhausted_quota_still_admits_input_and_leave() {
        let limiter = ConnectionRateLimiter::with_limit(2);
        let ping = ClientMsg::Ping { t: 1 };

        assert!(admit(&limiter, &ping));
        assert!(admit(&limiter, &ping));
        assert!(!admit(&limiter, &ping), "quota spent");

        let release = ClientMsg::InputUpdate {
            input: InputState::default(),
        };
        for _ in 0..10 {
            assert!(admit(&limiter, &release));
        }
        assert!(admit(&limiter, &ClientMsg::LeaveGame));
        assert!(!admit(&limiter, &ClientMsg::LoadLevel { level_id: 0 }));
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let state = state();
        let (mut s, mut rx) = session(&state);

        s.handle(ClientMsg::Ping { t: 42 }).await;
        assert!(matches!(next(&mut rx).await, ServerMsg::Pong { t: 42 }));
    }
}
