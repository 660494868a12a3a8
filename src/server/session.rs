use std::collections::HashMap;

use serde_json::json;

use crate::protocol::{Command, ProtocolError, names};
use crate::world::{Pos, SharedWorld};

/// The authenticated identity behind a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub username: String,
    pub is_guest: bool,
}

impl SessionIdentity {
    pub fn guest(n: u64) -> Self {
        SessionIdentity {
            username: format!("guest-{}", n),
            is_guest: true,
        }
    }
}

/// Collaborator contract for resolving a session token to an identity.
/// Account storage lives behind this trait and is not this crate's
/// concern; an unresolvable token falls back to a guest identity.
pub trait IdentityLookup: Send + Sync {
    fn lookup(&self, token: &str) -> Option<SessionIdentity>;
}

/// Lookup that knows no tokens; every connection becomes a guest.
pub struct GuestOnlyLookup;

impl IdentityLookup for GuestOnlyLookup {
    fn lookup(&self, _token: &str) -> Option<SessionIdentity> {
        None
    }
}

/// Fixed token table, mainly for tests and local setups.
pub struct StaticLookup {
    accounts: HashMap<String, SessionIdentity>,
}

impl StaticLookup {
    pub fn new(accounts: HashMap<String, SessionIdentity>) -> Self {
        StaticLookup { accounts }
    }
}

impl IdentityLookup for StaticLookup {
    fn lookup(&self, token: &str) -> Option<SessionIdentity> {
        self.accounts.get(token).cloned()
    }
}

/// Size of the tile region sent in `nearbyTiles` responses.
#[derive(Debug, Clone, Copy)]
pub struct RegionSpec {
    pub width: i32,
    pub height: i32,
}

pub type Handler = fn(&mut Session, &Command) -> Result<(), ProtocolError>;

/// Server-side per-connection state: identity, position, the handler
/// registry, and the outbound buffer for the current processing cycle.
pub struct Session {
    pub identity: SessionIdentity,
    pub pos: Pos,
    world: SharedWorld,
    region: RegionSpec,
    handlers: HashMap<String, Handler>,
    outbound: Vec<Command>,
}

impl Session {
    pub fn new(world: SharedWorld, identity: SessionIdentity, region: RegionSpec) -> Self {
        // TODO: restore the account's saved position once movement
        // commands exist; until then every session anchors at the center.
        let pos = world.center();
        let mut session = Session {
            identity,
            pos,
            world,
            region,
            handlers: HashMap::new(),
            outbound: Vec::new(),
        };
        session.add_handler(names::GET_INIT_STATE, handle_get_init_state);
        session.add_handler(names::GET_UPDATES, handle_get_updates);
        session
    }

    pub fn add_handler(&mut self, name: &str, handler: Handler) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Queue a command for the reply batch of the current cycle.
    pub fn send(&mut self, command: Command) {
        self.outbound.push(command);
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    /// Dispatch one inbound batch and return the accumulated replies.
    ///
    /// The outbound buffer is reset at the start of each cycle. An
    /// unregistered command name aborts the batch; the caller tears the
    /// connection down.
    pub fn handle_batch(&mut self, batch: &[Command]) -> Result<Vec<Command>, ProtocolError> {
        self.outbound.clear();
        for command in batch {
            let handler = *self
                .handlers
                .get(&command.name)
                .ok_or_else(|| ProtocolError::UnknownCommand(command.name.clone()))?;
            handler(self, command)?;
        }
        Ok(std::mem::take(&mut self.outbound))
    }
}

/// One-time bootstrap data for a freshly connected client, scoped to the
/// session identity.
fn handle_get_init_state(session: &mut Session, _command: &Command) -> Result<(), ProtocolError> {
    let reply = Command::bare(names::INIT_STATE)
        .with("username", json!(session.identity.username))
        .with("isGuest", json!(session.identity.is_guest));
    session.send(reply);
    Ok(())
}

/// Reply with the tile region centered on the session's position.
fn handle_get_updates(session: &mut Session, _command: &Command) -> Result<(), ProtocolError> {
    let origin = Pos::new(
        session.pos.x - session.region.width / 2,
        session.pos.y - session.region.height / 2,
    );
    let grid = session
        .world
        .client_region_json(origin, session.region.width, session.region.height);
    session.send(Command::bare(names::NEARBY_TILES).with("grid", grid));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::generation::GenerationParams;
    use crate::world::{Grid, Tile, TileRegistry, World};
    use tempfile::TempDir;

    fn make_world(dir: &TempDir) -> SharedWorld {
        let params = GenerationParams {
            seed: 3,
            world_size: 20,
            resource_probability: 0.2,
        };
        let registry = TileRegistry::standard();
        let world =
            World::load_or_generate(&dir.path().join("world.json"), &registry, &params).unwrap();
        SharedWorld::new(world)
    }

    fn make_session(world: SharedWorld) -> Session {
        Session::new(
            world,
            SessionIdentity::guest(1),
            RegionSpec {
                width: 10,
                height: 10,
            },
        )
    }

    #[test]
    fn unknown_command_aborts_batch() {
        let dir = TempDir::new().unwrap();
        let mut session = make_session(make_world(&dir));

        let batch = vec![Command::bare("getUpdates"), Command::bare("teleport")];
        let err = session.handle_batch(&batch).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownCommand("teleport".to_string()));
    }

    #[test]
    fn known_commands_never_abort() {
        let dir = TempDir::new().unwrap();
        let mut session = make_session(make_world(&dir));

        let batch = vec![
            Command::bare("getInitState"),
            Command::bare("getUpdates"),
            Command::bare("getUpdates"),
        ];
        let replies = session.handle_batch(&batch).unwrap();
        assert_eq!(replies.len(), 3);
    }

    #[test]
    fn get_init_state_returns_identity() {
        let dir = TempDir::new().unwrap();
        let mut session = make_session(make_world(&dir));
        session.identity = SessionIdentity {
            username: "ada".to_string(),
            is_guest: false,
        };

        let replies = session
            .handle_batch(&[Command::bare("getInitState")])
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].name, "initState");
        assert_eq!(replies[0].field("username"), Some(&json!("ada")));
        assert_eq!(replies[0].field("isGuest"), Some(&json!(false)));
    }

    #[test]
    fn get_updates_returns_region_centered_on_position() {
        let dir = TempDir::new().unwrap();
        let world = make_world(&dir);
        // Plant a marker where the region's top-left corner should land:
        // pos (10,10) with a 10x10 region gives origin (5,5).
        world.set_tile(Pos::new(5, 5), Tile::Wall { integrity: 77 });
        let mut session = make_session(world);

        let replies = session.handle_batch(&[Command::bare("getUpdates")]).unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].name, "nearbyTiles");

        let registry = TileRegistry::standard();
        let grid =
            Grid::from_client_json(replies[0].field("grid").unwrap(), &registry).unwrap();
        assert_eq!(grid.width(), 10);
        assert_eq!(grid.height(), 10);
        assert_eq!(grid.get(Pos::new(0, 0)), Some(&Tile::Wall { integrity: 77 }));
    }

    #[test]
    fn region_near_edge_is_filled_by_border_and_exterior() {
        let dir = TempDir::new().unwrap();
        let world = make_world(&dir);
        let mut session = make_session(world);
        session.pos = Pos::new(0, 0);

        let replies = session.handle_batch(&[Command::bare("getUpdates")]).unwrap();
        let registry = TileRegistry::standard();
        let grid =
            Grid::from_client_json(replies[0].field("grid").unwrap(), &registry).unwrap();
        // Origin (-5,-5): far corner is exterior, the wall ring shows up
        // one cell outside the world.
        assert_eq!(grid.get(Pos::new(0, 0)), Some(&Tile::Empty));
        assert_eq!(grid.get(Pos::new(4, 4)), Some(&Tile::Wall { integrity: 100 }));
    }

    #[test]
    fn outbound_buffer_resets_each_cycle() {
        let dir = TempDir::new().unwrap();
        let mut session = make_session(make_world(&dir));

        let first = session.handle_batch(&[Command::bare("getUpdates")]).unwrap();
        assert_eq!(first.len(), 1);
        let second = session.handle_batch(&[Command::bare("getInitState")]).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "initState");
    }

    #[test]
    fn empty_batch_yields_empty_reply() {
        let dir = TempDir::new().unwrap();
        let mut session = make_session(make_world(&dir));
        assert!(session.handle_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn custom_handler_registration() {
        let dir = TempDir::new().unwrap();
        let mut session = make_session(make_world(&dir));
        session.add_handler("ping", |session, _command| {
            session.send(Command::bare("pong"));
            Ok(())
        });

        let replies = session.handle_batch(&[Command::bare("ping")]).unwrap();
        assert_eq!(replies[0].name, "pong");
    }

    #[test]
    fn static_lookup_resolves_known_tokens() {
        let mut accounts = HashMap::new();
        accounts.insert(
            "tok-1".to_string(),
            SessionIdentity {
                username: "ada".to_string(),
                is_guest: false,
            },
        );
        let lookup = StaticLookup::new(accounts);
        assert_eq!(lookup.lookup("tok-1").unwrap().username, "ada");
        assert!(lookup.lookup("tok-2").is_none());
        assert!(GuestOnlyLookup.lookup("anything").is_none());
    }
}
