use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::{Value, json};

use crate::world::grid::{Grid, GridDecodeError};
use crate::world::tile::TileRegistry;

/// Errors from reading or writing the world file.
#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Decode(GridDecodeError),
    Malformed(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::Decode(e) => write!(f, "World decode error: {}", e),
            StoreError::Malformed(msg) => write!(f, "Malformed world file: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<GridDecodeError> for StoreError {
    fn from(e: GridDecodeError) -> Self {
        StoreError::Decode(e)
    }
}

/// Save a grid as `{"grid": {width, height, tiles}}` using atomic write.
///
/// Writes to a temporary file first, then renames to the final path, so
/// a partial write never corrupts an existing world file.
pub fn save_world(grid: &Grid, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let document = json!({ "grid": grid.to_db_json() });
    let encoded = document.to_string();

    let tmp = tmp_path(path);
    if let Err(e) = fs::write(&tmp, encoded.as_bytes()) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io(e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io(e));
    }
    Ok(())
}

/// Load a grid from a world file, decoding every tile via the registry.
pub fn load_world(path: &Path, registry: &TileRegistry) -> Result<Grid, StoreError> {
    let content = fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&content)
        .map_err(|e| StoreError::Malformed(format!("{}: {}", path.display(), e)))?;
    let grid_data = document
        .get("grid")
        .ok_or_else(|| StoreError::Malformed(format!("{}: missing grid", path.display())))?;
    let grid = Grid::from_db_json(grid_data, registry)?;
    Ok(grid)
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("world.json");
    path.with_file_name(format!(".{}.tmp", name))
}
