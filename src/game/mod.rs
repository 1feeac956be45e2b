//! Game simulation modules

pub mod entity;
pub mod geometry;
pub mod level;
pub mod physics;
pub mod room;
pub mod simulation;
pub mod snapshot;

pub use level::LevelCatalog;
