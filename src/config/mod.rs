//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::game::entity::PLAYER_COLORS;
use crate::game::physics::GameConfig;
use crate::util::time::DEFAULT_TICK_RATE;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated, `*` for any)
    pub client_origin: String,
    /// Directory with the browser client, served as a fallback
    pub static_dir: Option<PathBuf>,
    /// Level catalog override; the built-in levels are used when unset
    pub levels_path: Option<PathBuf>,

    /// Per-room settings
    pub rooms: RoomSettings,
}

/// Settings shared by every room
#[derive(Clone, Copy, Debug)]
pub struct RoomSettings {
    /// World constants and tick rate
    pub game: GameConfig,
    /// Broadcast a state update every N ticks
    pub snapshot_interval_ticks: u32,
    /// Capacity when the creating client does not ask for one
    pub default_capacity: usize,
    /// Upper bound for any room's capacity
    pub max_players_per_room: usize,
    /// Wrap back to the first level after the last one
    pub wrap_levels: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            snapshot_interval_ticks: 1,
            default_capacity: 4,
            max_players_per_room: PLAYER_COLORS.len(),
            wrap_levels: false,
        }
    }
}

impl RoomSettings {
    /// Capacity for a new room, clamped to `1..=max_players_per_room`
    pub fn capacity_for(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_capacity)
            .clamp(1, self.max_players_per_room)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: "info".to_string(),
            client_origin: "*".to_string(),
            static_dir: None,
            levels_path: None,
            rooms: RoomSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let defaults = RoomSettings::default();
        let mut game = GameConfig::default();
        game.tick_rate = parse_var("TICK_RATE", DEFAULT_TICK_RATE)?;
        if game.tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        let max_players_per_room: usize =
            parse_var("MAX_PLAYERS_PER_ROOM", defaults.max_players_per_room)?;
        if max_players_per_room == 0 || max_players_per_room > PLAYER_COLORS.len() {
            return Err(ConfigError::Invalid("MAX_PLAYERS_PER_ROOM"));
        }

        let rooms = RoomSettings {
            game,
            snapshot_interval_ticks: parse_var(
                "SNAPSHOT_INTERVAL_TICKS",
                defaults.snapshot_interval_ticks,
            )?,
            default_capacity: parse_var("DEFAULT_ROOM_CAPACITY", defaults.default_capacity)?,
            max_players_per_room,
            wrap_levels: parse_var("WRAP_LEVELS", defaults.wrap_levels)?,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            static_dir: env::var("STATIC_DIR").ok().map(PathBuf::from),
            levels_path: env::var("LEVELS_PATH").ok().map(PathBuf::from),

            rooms,
        })
    }
}

/// Parse an optional variable, falling back to a default when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_clamped_to_palette() {
        let settings = RoomSettings::default();

        assert_eq!(settings.capacity_for(None), 4);
        assert_eq!(settings.capacity_for(Some(2)), 2);
        assert_eq!(settings.capacity_for(Some(0)), 1);
        assert_eq!(settings.capacity_for(Some(50)), 6);
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u32 = parse_var("COOP_PLATFORMER_TEST_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}
