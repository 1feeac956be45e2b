//! Static level catalog

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::geometry::Rect;

const BUILTIN_LEVELS: &str = include_str!("../../levels/builtin.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonDef {
    pub id: String,
    #[serde(flatten)]
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDef {
    pub id: String,
    #[serde(flatten)]
    pub rect: Rect,
    pub button_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    pub id: String,
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Read-only level layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub platforms: Vec<Rect>,
    #[serde(default)]
    pub buttons: Vec<ButtonDef>,
    #[serde(default)]
    pub gates: Vec<GateDef>,
    #[serde(default)]
    pub moveable_blocks: Vec<BlockDef>,
    #[serde(default)]
    pub finish_line: Option<Rect>,
}

/// Levels keyed by index
#[derive(Debug, Clone, Default)]
pub struct LevelCatalog {
    levels: Vec<LevelDefinition>,
}

impl LevelCatalog {
    pub fn new(levels: Vec<LevelDefinition>) -> Self {
        Self { levels }
    }

    /// The levels shipped with the server
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_LEVELS)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let levels: Vec<LevelDefinition> = serde_json::from_str(json)?;
        Ok(Self::new(levels))
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn get(&self, index: usize) -> Option<&LevelDefinition> {
        self.levels.get(index)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LevelDefinition> {
        self.levels.iter()
    }

    /// Index to load after completing `completed`. Without wrapping the index
    /// keeps growing past the catalog end and resolves to an empty level.
    pub fn next_index(&self, completed: usize, wrap: bool) -> usize {
        let next = completed + 1;
        if wrap && !self.levels.is_empty() {
            next % self.levels.len()
        } else {
            next
        }
    }
}

/// Level catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read level catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid level catalog: {0}")]
    Parse(#[from] serde_json::Error),
}
