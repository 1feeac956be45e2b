//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::level::LevelCatalog;
use crate::game::room::RoomManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<LevelCatalog>,
    pub rooms: Arc<RoomManager>,
}

impl AppState {
    pub fn new(config: Config, catalog: Arc<LevelCatalog>) -> Self {
        let config = Arc::new(config);
        let rooms = Arc::new(RoomManager::new(catalog.clone(), config.rooms));

        Self {
            config,
            catalog,
            rooms,
        }
    }
}
