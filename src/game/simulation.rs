//! Authoritative room simulation: one fixed step per tick

use uuid::Uuid;

use super::entity::{Button, EntityRef, Gate, InputState, MoveableBlock, Player};
use super::geometry::{overlaps, resolve_collision, Rect, Resolution};
use super::level::LevelDefinition;
use super::physics::{GameConfig, PhysicsSystem, RESPAWN_POINT};

/// Things that happened during a tick which the owning room reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// Every player reached the finish line; the level index has advanced
    LevelCompleted { completed: usize },
    /// A player fell out of the field and was put back at the respawn point
    PlayerRespawned { player_id: Uuid },
}

/// Live state of one room's level (owned by the room task)
#[derive(Debug, Clone)]
pub struct Simulation {
    pub config: GameConfig,
    pub level_index: usize,
    pub platforms: Vec<Rect>,
    pub buttons: Vec<Button>,
    pub gates: Vec<Gate>,
    pub blocks: Vec<MoveableBlock>,
    pub finish_line: Option<Rect>,
    /// In join order
    pub players: Vec<Player>,
    pub running: bool,
    /// Never toggled; a paused simulation does not advance
    pub paused: bool,
    pub tick: u64,
    events: Vec<SimEvent>,
}

impl Simulation {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            level_index: 0,
            platforms: Vec::new(),
            buttons: Vec::new(),
            gates: Vec::new(),
            blocks: Vec::new(),
            finish_line: None,
            players: Vec::new(),
            running: false,
            paused: false,
            tick: 0,
            events: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Membership and input
    // ------------------------------------------------------------------

    /// Lowest seat not taken by a connected player
    pub fn next_player_index(&self) -> usize {
        (0..)
            .find(|i| !self.players.iter().any(|p| p.index == *i))
            .unwrap_or(self.players.len())
    }

    /// Seat a player. Capacity checks are the caller's job.
    pub fn add_player(&mut self, id: Uuid, index: usize, character: Option<String>) -> &Player {
        if let Some(pos) = self.players.iter().position(|p| p.id == id) {
            return &self.players[pos];
        }

        self.players
            .push(Player::new(id, index, character, &self.config));
        self.running = true;
        &self.players[self.players.len() - 1]
    }

    /// Remove a player and prune references to it from everyone else
    pub fn remove_player(&mut self, id: Uuid) -> Option<Player> {
        let pos = self.players.iter().position(|p| p.id == id)?;
        let removed = self.players.remove(pos);

        let gone = EntityRef::Player(id);
        for player in &mut self.players {
            player.supporting.retain(|s| *s != id);
            if player.standing_on.as_ref() == Some(&gone) {
                player.standing_on = None;
            }
        }

        Some(removed)
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Replace a player's pending input. Jump fires here, not on the tick.
    pub fn apply_input(&mut self, id: Uuid, input: InputState) {
        let config = self.config;
        let Some(player) = self.player_mut(id) else {
            return;
        };

        let was_pressed = player.input.jump;
        player.input = input;
        PhysicsSystem::try_jump(player, was_pressed, &config);
    }

    // ------------------------------------------------------------------
    // Level lifecycle
    // ------------------------------------------------------------------

    /// Replace every level collection and put players back at the start.
    /// A missing definition yields an empty level.
    pub fn load_level(&mut self, index: usize, level: Option<&LevelDefinition>) {
        self.level_index = index;

        match level {
            Some(level) => {
                self.platforms = level.platforms.clone();
                self.buttons = level
                    .buttons
                    .iter()
                    .map(|b| Button {
                        id: b.id.clone(),
                        rect: b.rect,
                        active: false,
                    })
                    .collect();
                self.gates = level
                    .gates
                    .iter()
                    .map(|g| Gate {
                        id: g.id.clone(),
                        rect: g.rect,
                        button_id: g.button_id.clone(),
                        is_open: false,
                    })
                    .collect();
                self.blocks = level
                    .moveable_blocks
                    .iter()
                    .map(|b| MoveableBlock::new(b.id.clone(), b.rect, b.weight))
                    .collect();
                self.finish_line = level.finish_line;
            }
            None => {
                self.platforms.clear();
                self.buttons.clear();
                self.gates.clear();
                self.blocks.clear();
                self.finish_line = None;
            }
        }

        self.reset_players();
    }

    /// Players to the level-start baseline, in join order
    pub fn reset_players(&mut self) {
        for (order, player) in self.players.iter_mut().enumerate() {
            let (x, y) = self.config.level_start_position(order);
            player.reset_to(x, y);
        }
    }

    /// Events recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance every entity by one fixed step. Step order matters.
    pub fn advance(&mut self) {
        if !self.running || self.paused {
            return;
        }

        self.tick += 1;

        self.integrate_players();
        self.resolve_platform_collisions();
        self.resolve_player_stacking();
        self.update_blocks();
        self.clamp_to_field();
        self.respawn_fallen();
        self.update_buttons();
        self.check_win_condition();
    }

    fn integrate_players(&mut self) {
        for player in &mut self.players {
            PhysicsSystem::integrate_player(player, &self.config);
        }
    }

    /// Platform list order; a later platform overwrites an earlier snap
    fn resolve_platform_collisions(&mut self) {
        for player in &mut self.players {
            for platform in &self.platforms {
                if let Some(res) = resolve_collision(&player.rect(), platform) {
                    snap_player_to_solid(player, platform, &res);
                }
            }
        }
    }

    fn resolve_player_stacking(&mut self) {
        let n = self.players.len();
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }

                let other = self.players[j].rect();
                let other_id = self.players[j].id;
                let player = &mut self.players[i];

                let Some(res) = resolve_collision(&player.rect(), &other) else {
                    continue;
                };

                if res.from_above() && player.vy >= 0.0 {
                    player.land(other.y, Some(EntityRef::Player(other_id)));
                    let upper_id = player.id;

                    // Append-only: walking off does not prune this list
                    let lower = &mut self.players[j];
                    if !lower.supporting.contains(&upper_id) {
                        lower.supporting.push(upper_id);
                    }
                } else if res.from_left() {
                    // Horizontal contact keeps momentum
                    player.x = other.x - player.width;
                } else if res.from_right() {
                    player.x = other.right();
                }
            }
        }
    }

    fn update_blocks(&mut self) {
        for block in self.blocks.iter_mut().filter(|b| b.active) {
            PhysicsSystem::integrate_block(block, &self.config);

            for platform in &self.platforms {
                if let Some(res) = resolve_collision(&block.rect, platform) {
                    snap_block_to_solid(block, platform, &res);
                }
            }

            for player in &mut self.players {
                let Some(res) = resolve_collision(&player.rect(), &block.rect) else {
                    continue;
                };

                if res.from_above() && player.vy >= 0.0 {
                    player.land(block.rect.y, Some(EntityRef::Block(block.id.clone())));
                } else if res.from_below() {
                    player.y = block.rect.bottom();
                    player.vy = 0.0;
                } else if res.from_left() {
                    player.x = block.rect.x - player.width;
                    player.vx = 0.0;
                } else if res.from_right() {
                    player.x = block.rect.right();
                    player.vx = 0.0;
                }
            }
        }
    }

    /// Horizontal only; the bottom is handled by respawn
    fn clamp_to_field(&mut self) {
        let width = self.config.canvas_width;
        for player in &mut self.players {
            if player.x < 0.0 {
                player.x = 0.0;
            }
            if player.x + player.width > width {
                player.x = width - player.width;
            }
        }
    }

    fn respawn_fallen(&mut self) {
        let height = self.config.canvas_height;
        for player in &mut self.players {
            if player.y > height {
                let (x, y) = RESPAWN_POINT;
                player.reset_to(x, y);
                self.events.push(SimEvent::PlayerRespawned {
                    player_id: player.id,
                });
            }
        }
    }

    fn update_buttons(&mut self) {
        for button in &mut self.buttons {
            button.active = self
                .players
                .iter()
                .any(|p| overlaps(&p.rect(), &button.rect));
        }

        for gate in &mut self.gates {
            gate.is_open = self
                .buttons
                .iter()
                .find(|b| b.id == gate.button_id)
                .is_some_and(|b| b.active);
        }
    }

    fn check_win_condition(&mut self) {
        let Some(finish) = self.finish_line else {
            return;
        };

        if self.players.is_empty() {
            return;
        }

        if !self.players.iter().all(|p| overlaps(&p.rect(), &finish)) {
            return;
        }

        let completed = self.level_index;
        self.level_index += 1;
        self.reset_players();
        self.events.push(SimEvent::LevelCompleted { completed });
    }
}

/// Push a player out of static geometry, zeroing velocity on that axis
fn snap_player_to_solid(player: &mut Player, solid: &Rect, res: &Resolution) {
    if res.from_above() {
        player.land(solid.y, None);
    } else if res.from_below() {
        player.y = solid.bottom();
        player.vy = 0.0;
    }

    if res.from_left() {
        player.x = solid.x - player.width;
        player.vx = 0.0;
    } else if res.from_right() {
        player.x = solid.right();
        player.vx = 0.0;
    }
}

fn snap_block_to_solid(block: &mut MoveableBlock, solid: &Rect, res: &Resolution) {
    if res.from_above() {
        block.rect.y = solid.y - block.rect.height;
        block.vy = 0.0;
    } else if res.from_below() {
        block.rect.y = solid.bottom();
        block.vy = 0.0;
    }

    if res.from_left() {
        block.rect.x = solid.x - block.rect.width;
        block.vx = 0.0;
    } else if res.from_right() {
        block.rect.x = solid.right();
        block.vx = 0.0;
    }
}
