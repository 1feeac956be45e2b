//! World constants and per-tick integration

use serde::{Deserialize, Serialize};

use super::entity::{InputState, MoveableBlock, Player};

/// Fixed world and movement constants, shared with clients on join
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Play-field width
    pub canvas_width: f32,
    /// Play-field height; falling past it respawns the player
    pub canvas_height: f32,
    /// Added to vertical velocity every tick
    pub gravity: f32,
    /// Horizontal velocity multiplier when no direction is held
    pub friction: f32,
    /// Horizontal velocity change per tick while a direction is held
    pub acceleration: f32,
    /// Maximum horizontal speed
    pub player_speed: f32,
    /// Upward impulse applied on jump
    pub player_jump_strength: f32,
    pub player_width: f32,
    pub player_height: f32,
    /// Simulation ticks per second
    pub tick_rate: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1200.0,
            canvas_height: 600.0,
            gravity: 0.6,
            friction: 0.9,
            acceleration: 0.5,
            player_speed: 5.0,
            player_jump_strength: 12.0,
            player_width: 32.0,
            player_height: 32.0,
            tick_rate: 60,
        }
    }
}

/// Where a fallen player reappears
pub const RESPAWN_POINT: (f32, f32) = (50.0, 100.0);

/// Level-start baseline: first player x, spacing between players, and y
const LEVEL_START_X: f32 = 50.0;
const LEVEL_START_SPACING: f32 = 60.0;
const LEVEL_START_Y: f32 = 100.0;

impl GameConfig {
    /// Join position for a seat: spread across the field, airborne in the
    /// lower third so gravity settles the player
    pub fn spawn_position(&self, index: usize) -> (f32, f32) {
        let spacing = self.canvas_width / 7.0;
        let x = spacing + index as f32 * spacing;
        let x = x.min(self.canvas_width - 50.0).max(10.0);
        (x, self.canvas_height - 150.0)
    }

    /// Position on the level-start baseline for the n-th player by join order
    pub fn level_start_position(&self, order: usize) -> (f32, f32) {
        (LEVEL_START_X + order as f32 * LEVEL_START_SPACING, LEVEL_START_Y)
    }
}

/// Physics system for integrating players and blocks
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Accelerate towards the held direction or decay towards zero
    pub fn horizontal_velocity(vx: f32, input: &InputState, config: &GameConfig) -> f32 {
        if input.left {
            (vx - config.acceleration).max(-config.player_speed)
        } else if input.right {
            (vx + config.acceleration).min(config.player_speed)
        } else {
            vx * config.friction
        }
    }

    /// Gravity, input-driven horizontal movement, position update.
    /// Clears the grounded flag; collision resolution re-derives it.
    pub fn integrate_player(player: &mut Player, config: &GameConfig) {
        player.vy += config.gravity;
        player.vx = Self::horizontal_velocity(player.vx, &player.input, config);

        player.x += player.vx;
        player.y += player.vy;

        player.is_grounded = false;
    }

    /// Gravity and friction for a block. Weight plays no part.
    pub fn integrate_block(block: &mut MoveableBlock, config: &GameConfig) {
        block.vy += config.gravity;
        block.rect.x += block.vx;
        block.rect.y += block.vy;
        block.vx *= config.friction;
    }

    /// Jump on the rising edge of the jump input while grounded.
    /// Returns true if the jump fired.
    pub fn try_jump(player: &mut Player, was_pressed: bool, config: &GameConfig) -> bool {
        let rising_edge = player.input.jump && !was_pressed;
        if !rising_edge || !player.is_grounded || player.is_jumping {
            return false;
        }

        player.vy = -config.player_jump_strength;
        player.is_jumping = true;
        player.is_grounded = false;
        player.standing_on = None;
        true
    }
}
