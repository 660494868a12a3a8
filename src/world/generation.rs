use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::generation::GenerationParams;

use super::grid::Grid;
use super::tile::Tile;

/// Procedurally generate a fresh world grid.
///
/// If `params.seed` is 0, a random seed is chosen and logged so a run
/// can be reproduced.
pub fn generate_grid(params: &GenerationParams) -> Grid {
    let seed = if params.seed == 0 {
        rand::thread_rng().r#gen()
    } else {
        params.seed
    };
    info!(seed, size = params.world_size, "Generating world grid");

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let size = params.world_size as i32;
    let count = (size as usize) * (size as usize);

    let mut tiles = Vec::with_capacity(count);
    for _ in 0..count {
        let tile = if rng.r#gen::<f64>() < params.resource_probability {
            if rng.r#gen::<bool>() {
                Tile::Matterite
            } else {
                Tile::Energite
            }
        } else {
            Tile::Empty
        };
        tiles.push(tile);
    }

    Grid::new(size, size, tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(seed: u64, size: u32, probability: f64) -> GenerationParams {
        GenerationParams {
            seed,
            world_size: size,
            resource_probability: probability,
        }
    }

    #[test]
    fn generated_grid_has_requested_dimensions() {
        let grid = generate_grid(&params(1, 32, 0.1));
        assert_eq!(grid.width(), 32);
        assert_eq!(grid.height(), 32);
        assert_eq!(grid.tiles().len(), 32 * 32);
    }

    #[test]
    fn same_seed_generates_same_grid() {
        let a = generate_grid(&params(99, 20, 0.3));
        let b = generate_grid(&params(99, 20, 0.3));
        assert_eq!(a.tiles(), b.tiles());
    }

    #[test]
    fn different_seeds_generate_different_grids() {
        let a = generate_grid(&params(1, 20, 0.5));
        let b = generate_grid(&params(2, 20, 0.5));
        assert_ne!(a.tiles(), b.tiles());
    }

    #[test]
    fn zero_probability_generates_only_empty() {
        let grid = generate_grid(&params(5, 16, 0.0));
        assert!(grid.tiles().iter().all(|t| *t == Tile::Empty));
    }

    #[test]
    fn full_probability_generates_only_resources() {
        let grid = generate_grid(&params(5, 16, 1.0));
        assert!(grid
            .tiles()
            .iter()
            .all(|t| matches!(t, Tile::Matterite | Tile::Energite)));
        // Both resource kinds should show up at this sample size.
        assert!(grid.tiles().contains(&Tile::Matterite));
        assert!(grid.tiles().contains(&Tile::Energite));
    }

    #[test]
    fn resource_density_roughly_matches_probability() {
        let grid = generate_grid(&params(42, 100, 0.1));
        let resources = grid
            .tiles()
            .iter()
            .filter(|t| matches!(t, Tile::Matterite | Tile::Energite))
            .count();
        let ratio = resources as f64 / grid.tiles().len() as f64;
        assert!(ratio > 0.05 && ratio < 0.15, "ratio was {}", ratio);
    }
}
