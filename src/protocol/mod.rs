use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command names used by the core sync protocol.
pub mod names {
    pub const GET_INIT_STATE: &str = "getInitState";
    pub const GET_UPDATES: &str = "getUpdates";
    pub const INIT_STATE: &str = "initState";
    pub const NEARBY_TILES: &str = "nearbyTiles";
}

/// A named message, the atomic unit of the client-server protocol.
///
/// The `name` selects the variant; everything else in the wire object is
/// carried as-is in `fields`. Commands always travel in ordered batches,
/// never alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Command {
    /// Command with no payload.
    pub fn bare(name: &str) -> Self {
        Command {
            name: name.to_string(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Protocol contract violations. Both are fatal to the exchange: the
/// owning loop tears the connection down rather than retrying.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    UnknownCommand(String),
    MalformedMessage(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownCommand(name) => {
                write!(f, "Unknown command name \"{}\"", name)
            }
            ProtocolError::MalformedMessage(msg) => {
                write!(f, "Malformed message: {}", msg)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Decode one wire frame into an ordered command batch.
pub fn decode_batch(text: &str) -> Result<Vec<Command>, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}

/// Encode a command batch as one wire frame.
pub fn encode_batch(batch: &[Command]) -> String {
    serde_json::to_string(batch).unwrap_or_else(|_| "[]".to_string())
}
