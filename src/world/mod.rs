pub mod generation;
pub mod grid;
pub mod tile;

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::info;

use crate::config::generation::GenerationParams;
use crate::persistence::{self, StoreError};

pub use grid::{Grid, Pos};
pub use tile::{Tile, TileRegistry};

/// Default integrity of the wall ring surrounding the world.
const BORDER_WALL_INTEGRITY: u32 = 100;

/// The one persistent world a server process owns: a grid plus the path
/// it is saved to.
#[derive(Debug)]
pub struct World {
    pub file_path: PathBuf,
    pub grid: Grid,
}

impl World {
    /// Load the world from its file if present, otherwise generate a
    /// fresh one. Either way the grid comes back with the wall border
    /// and empty exterior configured.
    pub fn load_or_generate(
        file_path: &Path,
        registry: &TileRegistry,
        params: &GenerationParams,
    ) -> Result<World, StoreError> {
        let mut grid = if file_path.exists() {
            info!(path = %file_path.display(), "Loading world");
            persistence::load_world(file_path, registry)?
        } else {
            info!(path = %file_path.display(), "No world file, generating");
            generation::generate_grid(params)
        };
        grid.border_tile = Some(Tile::Wall {
            integrity: BORDER_WALL_INTEGRITY,
        });
        grid.exterior_tile = Some(Tile::Empty);
        Ok(World {
            file_path: file_path.to_path_buf(),
            grid,
        })
    }

    pub fn save(&self) -> Result<(), StoreError> {
        persistence::save_world(&self.grid, &self.file_path)
    }

    /// Center of the grid; the default anchor for a fresh session.
    pub fn center(&self) -> Pos {
        Pos::new(self.grid.width() / 2, self.grid.height() / 2)
    }
}

/// Handle to the process-wide world instance.
///
/// Every read or write runs under the lock for the whole logical
/// operation, so concurrent sessions never observe a partially updated
/// grid. Read volume (region extraction) dominates writes, hence the
/// reader/writer split.
#[derive(Clone)]
pub struct SharedWorld {
    inner: Arc<RwLock<World>>,
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        SharedWorld {
            inner: Arc::new(RwLock::new(world)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, World> {
        // A panicked writer cannot leave the grid half-resized, so a
        // poisoned lock is still safe to read through.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Extract the region at `origin` and return its client encoding.
    pub fn client_region_json(&self, origin: Pos, width: i32, height: i32) -> Value {
        let world = self.read();
        world.grid.extract_region(origin, width, height).to_client_json()
    }

    /// Replace one in-bounds cell. Returns false for out-of-bounds.
    pub fn set_tile(&self, pos: Pos, tile: Tile) -> bool {
        self.write().grid.set(pos, tile)
    }

    pub fn center(&self) -> Pos {
        self.read().center()
    }

    /// Flush the world to its file. Holds the write lock for the whole
    /// serialization so no session mutates the grid mid-save.
    pub fn save(&self) -> Result<(), StoreError> {
        self.write().save()
    }

    /// Run a closure against the grid under the read lock.
    pub fn with_grid<R>(&self, f: impl FnOnce(&Grid) -> R) -> R {
        f(&self.read().grid)
    }
}
