use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::protocol::{Command, ProtocolError, decode_batch, encode_batch, names};
use crate::world::grid::{Grid, GridDecodeError, Pos};
use crate::world::tile::{Tile, TileRegistry};

/// How often the sync loop wakes up to consider sending.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);
/// Minimum spacing between two sends.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(250);

/// Errors that end the client sync loop.
#[derive(Debug)]
pub enum ClientError {
    Protocol(ProtocolError),
    Grid(GridDecodeError),
    Transport(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Protocol(e) => write!(f, "{}", e),
            ClientError::Grid(e) => write!(f, "{}", e),
            ClientError::Transport(msg) => write!(f, "Transport failure: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        ClientError::Protocol(e)
    }
}

impl From<GridDecodeError> for ClientError {
    fn from(e: GridDecodeError) -> Self {
        ClientError::Grid(e)
    }
}

/// Client-side picture of the world, filled in by reply handlers. The
/// renderer reads tiles from `nearby`; drawing itself is not this
/// crate's concern.
pub struct ClientView {
    pub username: Option<String>,
    pub is_guest: bool,
    pub nearby: Option<Grid>,
    registry: TileRegistry,
}

impl ClientView {
    fn new(registry: TileRegistry) -> Self {
        ClientView {
            username: None,
            is_guest: true,
            nearby: None,
            registry,
        }
    }

    /// Hand every tile of the synced region to a renderer, cell by cell.
    pub fn render(&self, renderer: &mut dyn TileRenderer) {
        let Some(grid) = &self.nearby else {
            return;
        };
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                let pos = Pos::new(x, y);
                if let Some(tile) = grid.get(pos) {
                    renderer.render_tile_at(tile, pos);
                }
            }
        }
    }
}

/// Collaborator contract for drawing. This core only supplies which
/// tile occupies which logical position; rasterization is the
/// renderer's business.
pub trait TileRenderer {
    fn render_tile_at(&mut self, tile: &Tile, pos: Pos);
}

/// Handler for a reply command; returns commands to enqueue for the
/// next outgoing batch.
pub type ClientHandler = fn(&mut ClientView, &Command) -> Result<Vec<Command>, ClientError>;

/// Invoked for a previously sent command that got no acknowledging
/// reply; returns commands that re-assert the intent. Repeaters must
/// not rely on handler state from the current cycle.
pub type Repeater = fn(&ClientView, &Command) -> Vec<Command>;

/// Where the sync state machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    AwaitingResponse,
}

/// Pacing/retry state machine for one connection.
///
/// Single-timeline by construction: `poll_send` and `handle_reply` are
/// never called concurrently, so the `expecting_response` flag is the
/// only guard needed.
pub struct SyncClient {
    pub view: ClientView,
    handlers: HashMap<String, ClientHandler>,
    repeaters: HashMap<String, Repeater>,
    outbound: Vec<Command>,
    awaiting_ack: Vec<Command>,
    last_send: Option<Instant>,
    expecting_response: bool,
    min_send_interval: Duration,
}

impl SyncClient {
    pub fn new() -> Self {
        let mut client = SyncClient {
            view: ClientView::new(TileRegistry::standard()),
            handlers: HashMap::new(),
            repeaters: HashMap::new(),
            outbound: Vec::new(),
            awaiting_ack: Vec::new(),
            last_send: None,
            expecting_response: false,
            min_send_interval: MIN_SEND_INTERVAL,
        };
        client.add_handler(names::INIT_STATE, handle_init_state);
        client.add_handler(names::NEARBY_TILES, handle_nearby_tiles);
        client
    }

    pub fn add_handler(&mut self, name: &str, handler: ClientHandler) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn add_repeater(&mut self, name: &str, repeater: Repeater) {
        self.repeaters.insert(name.to_string(), repeater);
    }

    /// Queue a command for the next outgoing batch.
    pub fn enqueue(&mut self, command: Command) {
        self.outbound.push(command);
    }

    pub fn phase(&self) -> SyncPhase {
        if self.expecting_response {
            SyncPhase::AwaitingResponse
        } else {
            SyncPhase::Idle
        }
    }

    /// Commands sent in the last batch that have not been acknowledged.
    pub fn awaiting_ack(&self) -> &[Command] {
        &self.awaiting_ack
    }

    /// Called on every tick. Returns the batch to send, or `None` when a
    /// guard holds: a response is still outstanding, or the minimum send
    /// interval has not yet elapsed.
    pub fn poll_send(&mut self, now: Instant) -> Option<Vec<Command>> {
        if self.expecting_response {
            return None;
        }
        if let Some(last) = self.last_send {
            if now.duration_since(last) < self.min_send_interval {
                return None;
            }
        }

        // Every batch carries a pull-updates request.
        self.outbound.push(Command::bare(names::GET_UPDATES));
        let batch = std::mem::take(&mut self.outbound);
        self.awaiting_ack = batch.clone();
        self.expecting_response = true;
        self.last_send = Some(now);
        Some(batch)
    }

    /// Dispatch one reply batch, then run repeaters for every command of
    /// the previous send, clearing the acknowledgment set and the
    /// expecting-response gate.
    pub fn handle_reply(&mut self, batch: &[Command]) -> Result<(), ClientError> {
        for command in batch {
            let handler = *self
                .handlers
                .get(&command.name)
                .ok_or_else(|| ProtocolError::UnknownCommand(command.name.clone()))?;
            let followups = handler(&mut self.view, command)?;
            self.outbound.extend(followups);
        }

        for command in std::mem::take(&mut self.awaiting_ack) {
            if let Some(repeater) = self.repeaters.get(&command.name) {
                let repeats = repeater(&self.view, &command);
                self.outbound.extend(repeats);
            }
        }
        self.expecting_response = false;
        Ok(())
    }
}

impl Default for SyncClient {
    fn default() -> Self {
        SyncClient::new()
    }
}

fn handle_init_state(view: &mut ClientView, command: &Command) -> Result<Vec<Command>, ClientError> {
    view.username = command
        .field("username")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    view.is_guest = command
        .field("isGuest")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    Ok(Vec::new())
}

fn handle_nearby_tiles(
    view: &mut ClientView,
    command: &Command,
) -> Result<Vec<Command>, ClientError> {
    let data = command.field("grid").ok_or_else(|| {
        ProtocolError::MalformedMessage("nearbyTiles is missing grid".to_string())
    })?;
    view.nearby = Some(Grid::from_client_json(data, &view.registry)?);
    Ok(Vec::new())
}

/// Drive a sync client over a live WebSocket connection.
///
/// Runs until the server closes the connection or a fatal error occurs.
/// The periodic tick lives inside this future, so dropping it (or
/// returning) cancels the timer along with the transport.
pub async fn run_sync_loop(url: &str, client: &mut SyncClient) -> Result<(), ClientError> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    info!(url, "Connected");
    let (mut write, mut read) = ws.split();

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(batch) = client.poll_send(Instant::now()) {
                    debug!(commands = batch.len(), "Sending batch");
                    write
                        .send(Message::Text(encode_batch(&batch).into()))
                        .await
                        .map_err(|e| ClientError::Transport(e.to_string()))?;
                }
            }
            message = read.next() => {
                match message {
                    None | Some(Ok(Message::Close(_))) => {
                        info!("Server closed the connection");
                        return Ok(());
                    }
                    Some(Ok(Message::Text(text))) => {
                        let batch = decode_batch(text.as_str())?;
                        client.handle_reply(&batch)?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
                }
            }
        }
    }
}


#[cfg(test)]
mod loop_tests {
    use super::*;
    use crate::config::generation::GenerationParams;
    use crate::config::server::ServerConfig;
    use crate::server::session::GuestOnlyLookup;
    use crate::server::{ServerState, handle_connection};
    use crate::world::{SharedWorld, TileRegistry, World};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    async fn spawn_server(dir: &TempDir) -> String {
        let params = GenerationParams {
            seed: 21,
            world_size: 24,
            resource_probability: 0.15,
        };
        let registry = TileRegistry::standard();
        let world =
            World::load_or_generate(&dir.path().join("world.json"), &registry, &params).unwrap();
        let state = Arc::new(ServerState::new(
            SharedWorld::new(world),
            Arc::new(GuestOnlyLookup),
            &ServerConfig::default(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, peer, state).await;
                });
            }
        });
        format!("ws://127.0.0.1:{}", addr.port())
    }

    #[tokio::test]
    async fn end_to_end_sync_against_live_server() {
        let dir = TempDir::new().unwrap();
        let url = spawn_server(&dir).await;

        let mut client = SyncClient::new();
        client.enqueue(Command::bare("getInitState"));

        // Let the loop run a few cycles, then abandon it; the interval
        // dies with the future.
        let _ = tokio::time::timeout(
            Duration::from_millis(800),
            run_sync_loop(&url, &mut client),
        )
        .await;

        assert!(client.view.username.is_some());
        assert!(client.view.is_guest);
        let grid = client.view.nearby.as_ref().expect("nearby grid synced");
        assert_eq!(grid.width(), 10);
        assert_eq!(grid.height(), 10);
        // Acknowledged commands do not linger.
        assert!(client.phase() == SyncPhase::Idle || client.phase() == SyncPhase::AwaitingResponse);
    }

    #[tokio::test]
    async fn sync_loop_fails_fast_on_dead_endpoint() {
        let mut client = SyncClient::new();
        let result = run_sync_loop("ws://127.0.0.1:1", &mut client).await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }
}
