use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::client::{SyncClient, run_sync_loop};
use crate::config::generation::GenerationParams;
use crate::config::server::ServerConfig;
use crate::persistence;
use crate::protocol::{Command, names};
use crate::server::session::GuestOnlyLookup;
use crate::server::{ServerState, start_server};
use crate::world::{SharedWorld, Tile, TileRegistry, World};

/// Run the world server: load or generate the world, accept sessions,
/// autosave periodically, and flush the world on shutdown.
pub async fn run_server(config: &ServerConfig, world_path: Option<&str>) -> Result<(), String> {
    let registry = TileRegistry::standard();
    let path = world_path.unwrap_or(&config.world_path);
    let world = World::load_or_generate(Path::new(path), &registry, &GenerationParams::default())
        .map_err(|e| format!("Failed to load world: {}", e))?;
    info!(
        width = world.grid.width(),
        height = world.grid.height(),
        "World ready"
    );

    let shared = SharedWorld::new(world);
    let state = Arc::new(ServerState::new(
        shared.clone(),
        Arc::new(GuestOnlyLookup),
        config,
    ));

    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .map_err(|e| format!("Invalid bind address: {}", e))?;
    tokio::spawn(async move {
        if let Err(e) = start_server(state, addr).await {
            error!("Server error: {}", e);
        }
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if config.autosave_interval_secs > 0 {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.autosave_interval_secs));
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match shared.save() {
                        Ok(()) => info!("World autosaved"),
                        Err(e) => warn!("Autosave failed: {}", e),
                    }
                }
                _ = &mut shutdown => break,
            }
        }
    } else {
        let _ = (&mut shutdown).await;
    }

    info!("Shutting down, saving world");
    shared
        .save()
        .map_err(|e| format!("Final world save failed: {}", e))?;
    Ok(())
}

/// Generate a fresh world file from generation parameters.
pub fn generate(worldgen: Option<&str>, output: &str) -> Result<(), String> {
    let params = match worldgen {
        Some(path) => GenerationParams::from_file(Path::new(path))?,
        None => GenerationParams::default(),
    };
    let grid = crate::world::generation::generate_grid(&params);
    persistence::save_world(&grid, Path::new(output))
        .map_err(|e| format!("Cannot save world: {}", e))?;
    println!(
        "World saved to {} ({}x{}, {} tiles)",
        output,
        grid.width(),
        grid.height(),
        grid.tiles().len()
    );
    Ok(())
}

/// Print a summary of a world file.
pub fn inspect(world_path: &str) -> Result<(), String> {
    let registry = TileRegistry::standard();
    let grid = persistence::load_world(Path::new(world_path), &registry)
        .map_err(|e| format!("Failed to load world: {}", e))?;

    println!("=== World: {} ===", world_path);
    println!("Size: {}x{}", grid.width(), grid.height());

    let mut counts: HashMap<u64, u64> = HashMap::new();
    for tile in grid.tiles() {
        *counts.entry(tile.type_id()).or_default() += 1;
    }
    let total = grid.tiles().len() as f64;
    let mut sorted: Vec<_> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));

    println!("--- Tile Distribution ---");
    for (type_id, count) in &sorted {
        let label = match *type_id {
            0 => "empty",
            1 => "matterite",
            2 => "energite",
            3 => "wall",
            _ => "other",
        };
        println!(
            "  {} ({}): {} ({:.1}%)",
            label,
            type_id,
            count,
            (*count as f64 / total) * 100.0
        );
    }
    Ok(())
}

/// Connect a sync client to a running server and report what it sees.
pub async fn watch(url: &str) -> Result<(), String> {
    let mut client = SyncClient::new();
    client.enqueue(Command::bare(names::GET_INIT_STATE));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        result = run_sync_loop(url, &mut client) => {
            result.map_err(|e| e.to_string())?;
        }
        _ = &mut shutdown => {
            info!("Interrupted");
        }
    }

    match (&client.view.username, &client.view.nearby) {
        (Some(name), Some(grid)) => {
            println!(
                "Synced as {} ({}), last region {}x{}",
                name,
                if client.view.is_guest { "guest" } else { "account" },
                grid.width(),
                grid.height()
            );
            let resources = grid
                .tiles()
                .iter()
                .filter(|t| matches!(t, Tile::Matterite | Tile::Energite))
                .count();
            println!("Resource tiles in view: {}", resources);
        }
        _ => println!("Connection ended before the first full sync"),
    }
    Ok(())
}
