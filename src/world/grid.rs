use std::fmt;

use serde_json::{Value, json};

use super::tile::{Tile, TileDecodeError, TileRegistry};

/// A logical grid position. May lie outside the grid; out-of-bounds
/// queries resolve through the border/exterior fill policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    pub fn new(x: i32, y: i32) -> Self {
        Pos { x, y }
    }
}

/// Rectangular, row-major store of tiles.
///
/// `border_tile` fills queries on the one-cell ring immediately
/// surrounding the grid; `exterior_tile` fills everything further out.
/// Either may be unset, in which case the query returns `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
    pub border_tile: Option<Tile>,
    pub exterior_tile: Option<Tile>,
}

/// Errors from decoding a serialized grid.
#[derive(Debug, Clone, PartialEq)]
pub enum GridDecodeError {
    Tile(TileDecodeError),
    Malformed(String),
    SizeMismatch { expected: usize, actual: usize },
}

impl fmt::Display for GridDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridDecodeError::Tile(e) => write!(f, "{}", e),
            GridDecodeError::Malformed(msg) => write!(f, "Malformed grid data: {}", msg),
            GridDecodeError::SizeMismatch { expected, actual } => write!(
                f,
                "Grid tile count mismatch: expected {}, got {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for GridDecodeError {}

impl From<TileDecodeError> for GridDecodeError {
    fn from(e: TileDecodeError) -> Self {
        GridDecodeError::Tile(e)
    }
}

impl Grid {
    /// Build a grid from a row-major tile sequence.
    ///
    /// `tiles.len()` must equal `width * height` and both dimensions must
    /// be positive; this is the only place a grid's shape is established.
    pub fn new(width: i32, height: i32, tiles: Vec<Tile>) -> Self {
        assert!(width > 0 && height > 0, "grid dimensions must be positive");
        assert_eq!(
            tiles.len(),
            (width as usize) * (height as usize),
            "tile count must match grid dimensions"
        );
        Grid {
            width,
            height,
            tiles,
            border_tile: None,
            exterior_tile: None,
        }
    }

    /// Grid of the given size filled with one tile.
    pub fn filled(width: i32, height: i32, tile: Tile) -> Self {
        let count = (width as usize) * (height as usize);
        Grid::new(width, height, vec![tile; count])
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    /// True iff `pos` lies on the one-cell ring immediately surrounding
    /// the grid, corners included.
    pub fn is_on_border(&self, pos: Pos) -> bool {
        let in_ring_bounds = pos.x >= -1
            && pos.x <= self.width
            && pos.y >= -1
            && pos.y <= self.height;
        let on_rim =
            pos.x == -1 || pos.x == self.width || pos.y == -1 || pos.y == self.height;
        in_ring_bounds && on_rim && !self.contains(pos)
    }

    pub fn tile_index(&self, pos: Pos) -> usize {
        (pos.x + pos.y * self.width) as usize
    }

    /// Look up the tile at `pos`, resolving out-of-bounds positions
    /// through the configured fill tiles.
    pub fn get(&self, pos: Pos) -> Option<&Tile> {
        if self.contains(pos) {
            Some(&self.tiles[self.tile_index(pos)])
        } else if self.border_tile.is_some() && self.is_on_border(pos) {
            self.border_tile.as_ref()
        } else {
            self.exterior_tile.as_ref()
        }
    }

    /// Replace one in-bounds cell. Returns false if `pos` is outside the
    /// grid; fill tiles are not writable.
    pub fn set(&mut self, pos: Pos, tile: Tile) -> bool {
        if !self.contains(pos) {
            return false;
        }
        let index = self.tile_index(pos);
        self.tiles[index] = tile;
        true
    }

    /// Build a new `width` x `height` grid from the tiles at every offset
    /// from `origin`.
    ///
    /// The caller must configure border/exterior fills whenever the
    /// region can cross a grid boundary; an unfilled out-of-bounds cell
    /// has no tile to store and panics.
    pub fn extract_region(&self, origin: Pos, width: i32, height: i32) -> Grid {
        let mut tiles = Vec::with_capacity((width as usize) * (height as usize));
        for offset_y in 0..height {
            for offset_x in 0..width {
                let pos = Pos::new(origin.x + offset_x, origin.y + offset_y);
                match self.get(pos) {
                    Some(tile) => tiles.push(tile.clone()),
                    None => panic!(
                        "extract_region crossed an unfilled boundary at ({}, {})",
                        pos.x, pos.y
                    ),
                }
            }
        }
        Grid::new(width, height, tiles)
    }

    pub fn to_db_json(&self) -> Value {
        json!({
            "width": self.width,
            "height": self.height,
            "tiles": self.tiles.iter().map(Tile::to_db_json).collect::<Vec<_>>(),
        })
    }

    pub fn to_client_json(&self) -> Value {
        json!({
            "width": self.width,
            "height": self.height,
            "tiles": self.tiles.iter().map(Tile::to_client_json).collect::<Vec<_>>(),
        })
    }

    pub fn from_db_json(data: &Value, registry: &TileRegistry) -> Result<Grid, GridDecodeError> {
        Self::decode(data, |value| registry.decode_db(value))
    }

    pub fn from_client_json(
        data: &Value,
        registry: &TileRegistry,
    ) -> Result<Grid, GridDecodeError> {
        Self::decode(data, |value| registry.decode_client(value))
    }

    fn decode(
        data: &Value,
        decode_tile: impl Fn(&Value) -> Result<Tile, TileDecodeError>,
    ) -> Result<Grid, GridDecodeError> {
        let width = read_dimension(data, "width")?;
        let height = read_dimension(data, "height")?;
        let raw_tiles = data
            .get("tiles")
            .and_then(Value::as_array)
            .ok_or_else(|| GridDecodeError::Malformed("missing tiles array".to_string()))?;

        let expected = (width as usize) * (height as usize);
        if raw_tiles.len() != expected {
            return Err(GridDecodeError::SizeMismatch {
                expected,
                actual: raw_tiles.len(),
            });
        }

        let mut tiles = Vec::with_capacity(expected);
        for raw in raw_tiles {
            tiles.push(decode_tile(raw)?);
        }
        Ok(Grid::new(width, height, tiles))
    }
}

fn read_dimension(data: &Value, key: &str) -> Result<i32, GridDecodeError> {
    let value = data
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| GridDecodeError::Malformed(format!("missing {}", key)))?;
    if value <= 0 || value > i32::MAX as i64 {
        return Err(GridDecodeError::Malformed(format!(
            "{} must be a positive integer, got {}",
            key, value
        )));
    }
    Ok(value as i32)
}
