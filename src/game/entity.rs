//! Live entity records owned by a simulation

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::Rect;
use super::physics::GameConfig;

/// Display colors by seat index
pub const PLAYER_COLORS: [&str; 6] = [
    "#FF0000", "#0000FF", "#00FF00", "#FFFF00", "#FF00FF", "#00FFFF",
];

/// Sprite used when the client does not pick one
pub const DEFAULT_CHARACTER: &str = "bodybuilder.png";

/// Latest known input for a player, replaced wholesale on every update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub jump: bool,
}

/// Weak reference to something a player can stand on.
/// The target may be gone; resolve it by id before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Player(Uuid),
    Block(String),
}

/// Authoritative player state
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    /// Seat number, fixed for the lifetime of the connection
    pub index: usize,

    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub width: f32,
    pub height: f32,

    pub is_jumping: bool,
    pub is_grounded: bool,

    pub standing_on: Option<EntityRef>,
    /// Players stacked on top of this one. Informational only.
    pub supporting: Vec<Uuid>,

    pub input: InputState,

    pub color: &'static str,
    pub character: String,
}

impl Player {
    pub fn new(id: Uuid, index: usize, character: Option<String>, config: &GameConfig) -> Self {
        let (x, y) = config.spawn_position(index);
        Self {
            id,
            index,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            width: config.player_width,
            height: config.player_height,
            is_jumping: false,
            is_grounded: false,
            standing_on: None,
            supporting: Vec::new(),
            input: InputState::default(),
            color: PLAYER_COLORS[index % PLAYER_COLORS.len()],
            character: character.unwrap_or_else(|| DEFAULT_CHARACTER.to_string()),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Put the player at rest at a position with all contact state cleared
    pub fn reset_to(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.vx = 0.0;
        self.vy = 0.0;
        self.is_jumping = false;
        self.is_grounded = false;
        self.clear_stacking();
    }

    pub fn clear_stacking(&mut self) {
        self.standing_on = None;
        self.supporting.clear();
    }

    /// Come to rest on top of something
    pub(crate) fn land(&mut self, top: f32, on: Option<EntityRef>) {
        self.y = top - self.height;
        self.vy = 0.0;
        self.is_grounded = true;
        self.is_jumping = false;
        self.standing_on = on;
    }
}

/// Block that falls and collides like a player but is never pushed
#[derive(Debug, Clone)]
pub struct MoveableBlock {
    pub id: String,
    pub rect: Rect,
    pub vx: f32,
    pub vy: f32,
    /// Players needed to push it. Stored, never enforced.
    pub weight: u32,
    pub active: bool,
}

impl MoveableBlock {
    pub fn new(id: String, rect: Rect, weight: u32) -> Self {
        Self {
            id,
            rect,
            vx: 0.0,
            vy: 0.0,
            weight,
            active: true,
        }
    }
}

/// Pressure plate, active while any player overlaps it
#[derive(Debug, Clone)]
pub struct Button {
    pub id: String,
    pub rect: Rect,
    pub active: bool,
}

/// Door driven by a button. Does not block movement.
#[derive(Debug, Clone)]
pub struct Gate {
    pub id: String,
    pub rect: Rect,
    pub button_id: String,
    pub is_open: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_takes_seat_color_and_default_character() {
        let config = GameConfig::default();
        let player = Player::new(Uuid::new_v4(), 2, None, &config);

        assert_eq!(player.color, "#00FF00");
        assert_eq!(player.character, DEFAULT_CHARACTER);
        assert!(!player.is_grounded);
        assert_eq!(player.width, config.player_width);
    }

    #[test]
    fn reset_clears_motion_and_stacking() {
        let config = GameConfig::default();
        let mut player = Player::new(Uuid::new_v4(), 0, Some("fencer.png".into()), &config);
        player.vx = 3.0;
        player.vy = -4.0;
        player.is_grounded = true;
        player.standing_on = Some(EntityRef::Block("block1".into()));
        player.supporting.push(Uuid::new_v4());

        player.reset_to(10.0, 20.0);

        assert_eq!((player.x, player.y, player.vx, player.vy), (10.0, 20.0, 0.0, 0.0));
        assert!(!player.is_grounded);
        assert!(player.standing_on.is_none());
        assert!(player.supporting.is_empty());
        assert_eq!(player.character, "fencer.png");
    }

    #[test]
    fn input_fields_default_when_missing() {
        let input: InputState = serde_json::from_str(r#"{"left":true}"#).unwrap();
        assert_eq!(
            input,
            InputState {
                left: true,
                right: false,
                jump: false
            }
        );
    }
}
