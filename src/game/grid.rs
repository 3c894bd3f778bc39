//! Tile grid, map documents and spawn placement

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Size of one tile in world units
pub const TILE_SIZE: f32 = 20.0;
/// Fallback grid dimensions when no map is supplied
pub const DEFAULT_GRID_WIDTH: usize = 40;
pub const DEFAULT_GRID_HEIGHT: usize = 30;

/// Tile types as stored in map files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TileType {
    Floor = 0,
    Wall = 1,
    CopSpawn = 2,
    Cover = 3,
    CriminalSpawn = 4,
}

impl TileType {
    /// Unknown codes are treated as floor
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => TileType::Wall,
            2 => TileType::CopSpawn,
            3 => TileType::Cover,
            4 => TileType::CriminalSpawn,
            _ => TileType::Floor,
        }
    }
}

/// Tile coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePoint {
    pub x: i32,
    pub y: i32,
}

impl TilePoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// World position of the tile centre
    pub fn to_world(self) -> (f32, f32) {
        (
            self.x as f32 * TILE_SIZE + TILE_SIZE / 2.0,
            self.y as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        )
    }
}

/// Playable rectangle in world units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    /// Clamp a point into the rectangle shrunk by `margin` on every side
    pub fn clamp(&self, x: f32, y: f32, margin: f32) -> (f32, f32) {
        let max_x = (self.width - margin).max(margin);
        let max_y = (self.height - margin).max(margin);
        (x.clamp(margin, max_x), y.clamp(margin, max_y))
    }
}

/// Authoritative tile grid for one match
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    tiles: Vec<Vec<u8>>,
}

impl TileGrid {
    pub fn new(tiles: Vec<Vec<u8>>) -> Self {
        Self { tiles }
    }

    /// All-floor grid
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            tiles: vec![vec![TileType::Floor as u8; width]; height],
        }
    }

    pub fn width(&self) -> usize {
        self.tiles.first().map(|row| row.len()).unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.tiles.len()
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            width: self.width() as f32 * TILE_SIZE,
            height: self.height() as f32 * TILE_SIZE,
        }
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<TileType> {
        if x < 0 || y < 0 {
            return None;
        }
        self.tiles
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .map(|code| TileType::from_code(*code))
    }

    pub fn set(&mut self, x: usize, y: usize, tile: TileType) {
        if let Some(cell) = self.tiles.get_mut(y).and_then(|row| row.get_mut(x)) {
            *cell = tile as u8;
        }
    }

    /// Whether the world-space point lies on a wall tile. Points outside the
    /// grid are open.
    pub fn is_wall_at(&self, x: f32, y: f32) -> bool {
        let gx = (x / TILE_SIZE).floor() as i32;
        let gy = (y / TILE_SIZE).floor() as i32;
        self.tile(gx, gy) == Some(TileType::Wall)
    }

    /// Every tile of the given type, row-major
    pub fn tiles_of(&self, kind: TileType) -> Vec<TilePoint> {
        let mut points = Vec::new();
        for (y, row) in self.tiles.iter().enumerate() {
            for (x, code) in row.iter().enumerate() {
                if TileType::from_code(*code) == kind {
                    points.push(TilePoint::new(x as i32, y as i32));
                }
            }
        }
        points
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::empty(DEFAULT_GRID_WIDTH, DEFAULT_GRID_HEIGHT)
    }
}

/// Exported map document as produced by the level editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: Option<MapMetadata>,
    #[serde(default)]
    pub settings: Option<MapSettings>,
    pub grid: Vec<Vec<u8>>,
    #[serde(default)]
    pub spawn: Option<TilePoint>,
    #[serde(default)]
    pub entities: MapEntities,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSettings {
    #[serde(default)]
    pub grid_width: usize,
    #[serde(default)]
    pub grid_height: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapEntities {
    #[serde(default)]
    pub enemies: Vec<TilePoint>,
    #[serde(default)]
    pub civilians: Vec<TilePoint>,
    #[serde(default)]
    pub doors: Vec<TilePoint>,
}

/// Map loading errors
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Failed to read map file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid map document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Map grid is empty")]
    EmptyGrid,
}

impl MapDocument {
    pub fn from_json(json: &str) -> Result<Self, MapError> {
        let doc: MapDocument = serde_json::from_str(json)?;
        if doc.grid.is_empty() {
            return Err(MapError::EmptyGrid);
        }
        Ok(doc)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn name(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("Untitled Map")
    }
}

/// Grid plus entity placement handed to every match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapLayout {
    pub name: String,
    pub grid: TileGrid,
    pub entities: MapEntities,
}

impl MapLayout {
    pub fn from_document(doc: MapDocument) -> Self {
        Self {
            name: doc.name().to_string(),
            grid: TileGrid::new(doc.grid),
            entities: doc.entities,
        }
    }

    /// Load the configured map, falling back to an open default grid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("No map configured, using default open grid");
            return Self::default();
        };

        match MapDocument::load(path) {
            Ok(doc) => {
                let layout = Self::from_document(doc);
                info!(
                    map = %layout.name,
                    width = layout.grid.width(),
                    height = layout.grid.height(),
                    "Map loaded"
                );
                layout
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load map, using default grid");
                Self::default()
            }
        }
    }
}

/// Spawn tiles per side plus the civilian pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnPoints {
    pub cops: Vec<TilePoint>,
    pub criminals: Vec<TilePoint>,
    pub civilians: Vec<TilePoint>,
}

impl SpawnPoints {
    /// Spawn tiles from the grid and civilian placements from the entity
    /// list; any empty list falls back to the default layout.
    pub fn from_map<R: rand::Rng>(grid: &TileGrid, entities: &MapEntities, rng: &mut R) -> Self {
        let defaults = Self::defaults(grid.width(), grid.height(), rng);

        let cops = grid.tiles_of(TileType::CopSpawn);
        let criminals = grid.tiles_of(TileType::CriminalSpawn);
        let civilians = entities.civilians.clone();

        Self {
            cops: if cops.is_empty() { defaults.cops } else { cops },
            criminals: if criminals.is_empty() {
                defaults.criminals
            } else {
                criminals
            },
            civilians: if civilians.is_empty() {
                defaults.civilians
            } else {
                civilians
            },
        }
    }

    /// Cops bottom-left, criminals top-right, civilians scattered in the middle
    pub fn defaults<R: rand::Rng>(width: usize, height: usize, rng: &mut R) -> Self {
        let width = width as i32;
        let height = height as i32;

        let cops = (0..5)
            .map(|i| TilePoint::new(3 + i % 3, (height - 5 + i / 3).max(0)))
            .collect();
        let criminals = (0..5)
            .map(|i| TilePoint::new((width - 6 + i % 3).max(0), 3 + i / 3))
            .collect();

        let span_x = (width - 20).max(1);
        let span_y = (height - 20).max(1);
        let civilians = (0..10)
            .map(|_| TilePoint::new(10 + rng.gen_range(0..span_x), 10 + rng.gen_range(0..span_y)))
            .collect();

        Self {
            cops,
            criminals,
            civilians,
        }
    }
}
