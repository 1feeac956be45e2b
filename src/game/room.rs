//! Room tasks and the room manager
//!
//! Every room is a tokio task that exclusively owns its [`Simulation`]. The
//! task wakes on a fixed-rate tick or on an inbound command, never both at
//! once, so the simulation is never touched from two contexts.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RoomSettings;
use crate::util::time::{tick_duration, Timer};
use crate::ws::protocol::{GameSnapshot, ServerMsg};

use super::entity::InputState;
use super::level::LevelCatalog;
use super::physics::GameConfig;
use super::simulation::{SimEvent, Simulation};
use super::snapshot::{build_snapshot, SnapshotBuilder};

/// Joins that race a room teardown are retried this many times
const JOIN_ATTEMPTS: usize = 3;

/// Commands delivered to a room task
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        session_id: Uuid,
        character: Option<String>,
        reply: oneshot::Sender<Result<JoinAccepted, JoinError>>,
    },
    Leave {
        session_id: Uuid,
    },
    Input {
        session_id: Uuid,
        input: InputState,
    },
    LoadLevel {
        level_id: usize,
    },
}

/// Room-side answer to a successful join
#[derive(Debug)]
pub struct JoinAccepted {
    pub player_index: usize,
    pub max_players: usize,
    pub game_state: GameSnapshot,
    pub config: GameConfig,
    pub events: broadcast::Receiver<ServerMsg>,
}

/// Everything a session needs after joining
#[derive(Debug)]
pub struct JoinTicket {
    pub room: RoomHandle,
    pub player_index: usize,
    pub max_players: usize,
    pub game_state: GameSnapshot,
    pub config: GameConfig,
    /// Room broadcasts (state updates, joins, level changes)
    pub events: broadcast::Receiver<ServerMsg>,
}

/// Join errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Room is full ({capacity} players)")]
    RoomFull { capacity: usize },

    #[error("Already in this room")]
    AlreadyInRoom,

    #[error("Room is shutting down, try again")]
    RoomUnavailable,
}

/// Handle to a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub id: String,
    generation: u64,
    commands: mpsc::Sender<RoomCommand>,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Deliver a command; false if the room is gone
    pub async fn send(&self, command: RoomCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn send_input(&self, session_id: Uuid, input: InputState) -> bool {
        self.send(RoomCommand::Input { session_id, input }).await
    }

    pub async fn load_level(&self, level_id: usize) -> bool {
        self.send(RoomCommand::LoadLevel { level_id }).await
    }

    pub async fn leave(&self, session_id: Uuid) -> bool {
        self.send(RoomCommand::Leave { session_id }).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomFlow {
    Continue,
    Close,
}

/// A room's authoritative state (owned by the room task)
struct Room {
    id: String,
    sim: Simulation,
    capacity: usize,
    catalog: Arc<LevelCatalog>,
    settings: RoomSettings,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<AtomicUsize>,
}

impl Room {
    fn new(
        id: String,
        capacity: usize,
        catalog: Arc<LevelCatalog>,
        settings: RoomSettings,
        player_count: Arc<AtomicUsize>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(64);

        let mut sim = Simulation::new(settings.game);
        sim.load_level(0, catalog.get(0));

        Self {
            id,
            sim,
            capacity,
            catalog,
            settings,
            broadcast_tx,
            snapshot_builder: SnapshotBuilder::new(settings.snapshot_interval_ticks),
            player_count,
        }
    }

    /// Run the authoritative tick loop until the last player leaves
    async fn run(mut self, mut commands: mpsc::Receiver<RoomCommand>) {
        info!(room_id = %self.id, capacity = self.capacity, "Room started");

        let tick_length = tick_duration(self.settings.game.tick_rate);
        let mut tick_interval = interval(tick_length);
        // A slow tick runs late; missed ticks are not replayed
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let timer = Timer::new();
                    self.run_tick();
                    if timer.elapsed() > tick_length {
                        warn!(
                            room_id = %self.id,
                            tick = self.sim.tick,
                            elapsed_us = timer.elapsed_micros(),
                            "Tick overran its budget"
                        );
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if self.handle_command(command) == RoomFlow::Close {
                        break;
                    }
                }
            }
        }

        info!(room_id = %self.id, ticks = self.sim.tick, "Room closed");
    }

    fn handle_command(&mut self, command: RoomCommand) -> RoomFlow {
        match command {
            RoomCommand::Join {
                session_id,
                character,
                reply,
            } => self.handle_join(session_id, character, reply),
            RoomCommand::Leave { session_id } => self.handle_leave(session_id),
            RoomCommand::Input { session_id, input } => {
                self.sim.apply_input(session_id, input);
                RoomFlow::Continue
            }
            RoomCommand::LoadLevel { level_id } => {
                self.load_level(level_id);
                RoomFlow::Continue
            }
        }
    }

    fn handle_join(
        &mut self,
        session_id: Uuid,
        character: Option<String>,
        reply: oneshot::Sender<Result<JoinAccepted, JoinError>>,
    ) -> RoomFlow {
        if self.sim.player(session_id).is_some() {
            let _ = reply.send(Err(JoinError::AlreadyInRoom));
            return RoomFlow::Continue;
        }

        if self.sim.player_count() >= self.capacity {
            let _ = reply.send(Err(JoinError::RoomFull {
                capacity: self.capacity,
            }));
            return RoomFlow::Continue;
        }

        let player_index = self.sim.next_player_index();
        self.sim.add_player(session_id, player_index, character);
        self.sync_player_count();

        let accepted = JoinAccepted {
            player_index,
            max_players: self.capacity,
            game_state: build_snapshot(&self.sim),
            config: self.sim.config,
            events: self.broadcast_tx.subscribe(),
        };

        if reply.send(Ok(accepted)).is_err() {
            // Joiner went away before hearing back
            debug!(room_id = %self.id, session_id = %session_id, "Join abandoned");
            return self.handle_leave(session_id);
        }

        info!(
            room_id = %self.id,
            session_id = %session_id,
            player_index,
            player_count = self.sim.player_count(),
            "Player joined room"
        );

        let _ = self.broadcast_tx.send(ServerMsg::PlayerJoined {
            total_players: self.sim.player_count(),
            max_players: self.capacity,
        });

        RoomFlow::Continue
    }

    fn handle_leave(&mut self, session_id: Uuid) -> RoomFlow {
        let Some(player) = self.sim.remove_player(session_id) else {
            return RoomFlow::Continue;
        };
        self.sync_player_count();

        info!(
            room_id = %self.id,
            session_id = %session_id,
            player_index = player.index,
            player_count = self.sim.player_count(),
            "Player left room"
        );

        if self.sim.player_count() == 0 {
            info!(room_id = %self.id, "Last player left, closing room");
            return RoomFlow::Close;
        }

        let _ = self.broadcast_tx.send(ServerMsg::PlayerLeft {
            total_players: self.sim.player_count(),
        });

        RoomFlow::Continue
    }

    fn run_tick(&mut self) {
        self.sim.advance();

        for event in self.sim.drain_events() {
            match event {
                SimEvent::LevelCompleted { completed } => {
                    let next = self.catalog.next_index(completed, self.settings.wrap_levels);
                    info!(
                        room_id = %self.id,
                        completed_level = completed,
                        next_level = next,
                        "Level complete"
                    );
                    let _ = self.broadcast_tx.send(ServerMsg::LevelComplete {
                        completed_level: completed,
                        next_level: next,
                    });
                    self.load_level(next);
                }
                SimEvent::PlayerRespawned { player_id } => {
                    debug!(room_id = %self.id, session_id = %player_id, "Player respawned");
                }
            }
        }

        if self.snapshot_builder.should_send() {
            let _ = self.broadcast_tx.send(self.snapshot_builder.build(&self.sim));
        }
    }

    /// Load (or reload) a level and tell everyone
    fn load_level(&mut self, level_id: usize) {
        let level = self.catalog.get(level_id);
        match level {
            Some(def) => info!(room_id = %self.id, level_id, name = %def.name, "Loading level"),
            None => warn!(room_id = %self.id, level_id, "No such level, loading empty level"),
        }

        self.sim.load_level(level_id, level);
        self.snapshot_builder.force_next();

        let _ = self.broadcast_tx.send(ServerMsg::LevelLoaded {
            level_id,
            game_state: build_snapshot(&self.sim),
        });
    }

    fn sync_player_count(&self) {
        self.player_count
            .store(self.sim.player_count(), Ordering::Relaxed);
    }
}

/// Owns every live room. A room is created with its first member and torn
/// down by its own task when the last member leaves.
pub struct RoomManager {
    rooms: Arc<DashMap<String, RoomHandle>>,
    catalog: Arc<LevelCatalog>,
    settings: RoomSettings,
    next_generation: AtomicU64,
}

impl RoomManager {
    pub fn new(catalog: Arc<LevelCatalog>, settings: RoomSettings) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            catalog,
            settings,
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    /// Join a room, creating it if needed. `max_players` only applies when
    /// this call creates the room.
    pub async fn join(
        &self,
        room_id: &str,
        session_id: Uuid,
        max_players: Option<usize>,
        character: Option<String>,
    ) -> Result<JoinTicket, JoinError> {
        for attempt in 0..JOIN_ATTEMPTS {
            let handle = self.get_or_create(room_id, max_players);

            let (reply_tx, reply_rx) = oneshot::channel();
            let command = RoomCommand::Join {
                session_id,
                character: character.clone(),
                reply: reply_tx,
            };

            if !handle.send(command).await {
                debug!(room_id = %room_id, attempt, "Room closed before join, retrying");
                self.forget(&handle);
                continue;
            }

            match reply_rx.await {
                Ok(Ok(accepted)) => {
                    return Ok(JoinTicket {
                        room: handle,
                        player_index: accepted.player_index,
                        max_players: accepted.max_players,
                        game_state: accepted.game_state,
                        config: accepted.config,
                        events: accepted.events,
                    });
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(room_id = %room_id, attempt, "Room closed during join, retrying");
                    self.forget(&handle);
                }
            }
        }

        warn!(room_id = %room_id, session_id = %session_id, "Giving up on join");
        Err(JoinError::RoomUnavailable)
    }

    /// Leave a room; unknown rooms are ignored
    pub async fn leave(&self, room_id: &str, session_id: Uuid) {
        if let Some(handle) = self.get(room_id) {
            handle.leave(session_id).await;
        }
    }

    fn get_or_create(&self, room_id: &str, max_players: Option<usize>) -> RoomHandle {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| self.spawn_room(room_id, max_players))
            .value()
            .clone()
    }

    fn spawn_room(&self, room_id: &str, max_players: Option<usize>) -> RoomHandle {
        let (commands_tx, commands_rx) = mpsc::channel(256);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let capacity = self.settings.capacity_for(max_players);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            id: room_id.to_string(),
            generation,
            commands: commands_tx,
            player_count: player_count.clone(),
        };

        let room = Room::new(
            room_id.to_string(),
            capacity,
            self.catalog.clone(),
            self.settings,
            player_count,
        );

        let rooms = self.rooms.clone();
        let id = room_id.to_string();
        tokio::spawn(async move {
            room.run(commands_rx).await;

            // Only drop our own entry; a newer room may already use this id
            rooms.remove_if(&id, |_, h| h.generation == generation);
            info!(room_id = %id, "Room removed from registry");
        });

        handle
    }

    fn forget(&self, handle: &RoomHandle) {
        self.rooms
            .remove_if(&handle.id, |_, h| h.generation == handle.generation);
    }
}
