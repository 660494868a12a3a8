use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use gridplex::cli::commands;
use gridplex::config::server::ServerConfig;

#[derive(Parser)]
#[command(name = "gridplex")]
#[command(about = "A persistent shared-world server that syncs a tile grid to clients")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new world file from procedural parameters
    Generate {
        /// Path to world generation config file (defaults are used if omitted)
        #[arg(short, long)]
        worldgen: Option<String>,

        /// Output world file
        #[arg(short, long, default_value = "./data/world.json")]
        output: String,
    },

    /// Start the world server
    Run {
        /// Path to a specific world file to load
        #[arg(short, long)]
        world: Option<String>,
    },

    /// Summarize a world file
    Inspect {
        /// Path to the world file
        #[arg(short, long, default_value = "./data/world.json")]
        world: String,
    },

    /// Connect a sync client to a running server
    Watch {
        /// WebSocket URL of the server
        #[arg(short, long, default_value = "ws://127.0.0.1:8040")]
        url: String,
    },
}

fn load_config(path: &str) -> ServerConfig {
    if Path::new(path).exists() {
        match ServerConfig::from_file(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        ServerConfig::default()
    }
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Generate { worldgen, output } => {
            if let Err(e) = commands::generate(worldgen.as_deref(), &output) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Run { world } => {
            if let Err(e) = commands::run_server(&config, world.as_deref()).await {
                eprintln!("Server error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Inspect { world } => {
            if let Err(e) = commands::inspect(&world) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Watch { url } => {
            if let Err(e) = commands::watch(&url).await {
                eprintln!("Client error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
