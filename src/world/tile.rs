use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value, json};

/// Stable wire identifiers for tile types. These appear in the world file
/// and in client frames, so they must never be renumbered.
pub mod type_ids {
    pub const EMPTY: u64 = 0;
    pub const MATTERITE: u64 = 1;
    pub const ENERGITE: u64 = 2;
    pub const WALL: u64 = 3;
}

/// One cell's content in the world grid.
///
/// Simple variants (no fields) encode as a bare integer type id on both
/// wire formats. Complex variants encode as `{"typeId": n, ...fields}`.
/// The persistence (db) and client encodings are independent: either may
/// evolve without touching the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tile {
    Empty,
    Matterite,
    Energite,
    Wall { integrity: u32 },
}

impl Tile {
    pub fn type_id(&self) -> u64 {
        match self {
            Tile::Empty => type_ids::EMPTY,
            Tile::Matterite => type_ids::MATTERITE,
            Tile::Energite => type_ids::ENERGITE,
            Tile::Wall { .. } => type_ids::WALL,
        }
    }

    /// Encoding used in the persisted world file. Cannot fail for a
    /// well-formed in-memory tile.
    pub fn to_db_json(&self) -> Value {
        match self {
            Tile::Empty | Tile::Matterite | Tile::Energite => json!(self.type_id()),
            Tile::Wall { integrity } => json!({
                "typeId": self.type_id(),
                "integrity": integrity,
            }),
        }
    }

    /// Encoding sent to clients. Currently shaped like the db encoding,
    /// but rendered through a separate path so the two can diverge.
    pub fn to_client_json(&self) -> Value {
        match self {
            Tile::Empty | Tile::Matterite | Tile::Energite => json!(self.type_id()),
            Tile::Wall { integrity } => json!({
                "typeId": self.type_id(),
                "integrity": integrity,
            }),
        }
    }
}

/// Errors from decoding a tile wire value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileDecodeError {
    /// The type id carries no registered constructor or deserializer.
    UnknownTileType(u64),
    /// The value is neither a bare integer nor an object with a numeric
    /// `typeId`, or a complex record is missing a required field.
    Malformed(String),
}

impl fmt::Display for TileDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileDecodeError::UnknownTileType(id) => write!(f, "Unknown tile type id {}", id),
            TileDecodeError::Malformed(msg) => write!(f, "Malformed tile value: {}", msg),
        }
    }
}

impl std::error::Error for TileDecodeError {}

type ComplexDecoder = fn(&Map<String, Value>) -> Result<Tile, TileDecodeError>;

/// Resolves polymorphic tile wire values back to `Tile` instances.
///
/// Simple variants register a singleton; complex variants register one
/// deserializer per wire format. New tile kinds extend these maps, no
/// decode path branches on a concrete variant.
pub struct TileRegistry {
    simple: HashMap<u64, Tile>,
    complex_db: HashMap<u64, ComplexDecoder>,
    complex_client: HashMap<u64, ComplexDecoder>,
}

impl TileRegistry {
    pub fn empty() -> Self {
        TileRegistry {
            simple: HashMap::new(),
            complex_db: HashMap::new(),
            complex_client: HashMap::new(),
        }
    }

    /// Registry with all built-in tile types.
    pub fn standard() -> Self {
        let mut registry = TileRegistry::empty();
        registry.register_simple(Tile::Empty);
        registry.register_simple(Tile::Matterite);
        registry.register_simple(Tile::Energite);
        registry.register_complex(type_ids::WALL, decode_wall, decode_wall);
        registry
    }

    pub fn register_simple(&mut self, tile: Tile) {
        self.simple.insert(tile.type_id(), tile);
    }

    pub fn register_complex(
        &mut self,
        type_id: u64,
        db_decoder: ComplexDecoder,
        client_decoder: ComplexDecoder,
    ) {
        self.complex_db.insert(type_id, db_decoder);
        self.complex_client.insert(type_id, client_decoder);
    }

    pub fn decode_db(&self, value: &Value) -> Result<Tile, TileDecodeError> {
        self.decode(value, &self.complex_db)
    }

    pub fn decode_client(&self, value: &Value) -> Result<Tile, TileDecodeError> {
        self.decode(value, &self.complex_client)
    }

    fn decode(
        &self,
        value: &Value,
        complex: &HashMap<u64, ComplexDecoder>,
    ) -> Result<Tile, TileDecodeError> {
        match value {
            Value::Number(n) => {
                let id = n
                    .as_u64()
                    .ok_or_else(|| TileDecodeError::Malformed(format!("bad type id {}", n)))?;
                self.simple
                    .get(&id)
                    .cloned()
                    .ok_or(TileDecodeError::UnknownTileType(id))
            }
            Value::Object(fields) => {
                let id = fields.get("typeId").and_then(Value::as_u64).ok_or_else(|| {
                    TileDecodeError::Malformed("record is missing numeric typeId".to_string())
                })?;
                let decoder = complex
                    .get(&id)
                    .ok_or(TileDecodeError::UnknownTileType(id))?;
                decoder(fields)
            }
            other => Err(TileDecodeError::Malformed(format!(
                "expected integer or record, got {}",
                other
            ))),
        }
    }
}

fn decode_wall(fields: &Map<String, Value>) -> Result<Tile, TileDecodeError> {
    let integrity = fields
        .get("integrity")
        .and_then(Value::as_u64)
        .ok_or_else(|| TileDecodeError::Malformed("wall record is missing integrity".to_string()))?;
    Ok(Tile::Wall {
        integrity: integrity as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<Tile> {
        vec![
            Tile::Empty,
            Tile::Matterite,
            Tile::Energite,
            Tile::Wall { integrity: 75 },
        ]
    }

    #[test]
    fn db_encoding_round_trips_every_variant() {
        let registry = TileRegistry::standard();
        for tile in all_variants() {
            let encoded = tile.to_db_json();
            let decoded = registry.decode_db(&encoded).expect("decode");
            assert_eq!(tile, decoded);
        }
    }

    #[test]
    fn client_encoding_round_trips_every_variant() {
        let registry = TileRegistry::standard();
        for tile in all_variants() {
            let encoded = tile.to_client_json();
            let decoded = registry.decode_client(&encoded).expect("decode");
            assert_eq!(tile, decoded);
        }
    }

    #[test]
    fn simple_variants_encode_as_bare_integers() {
        assert_eq!(Tile::Empty.to_db_json(), json!(0));
        assert_eq!(Tile::Matterite.to_db_json(), json!(1));
        assert_eq!(Tile::Energite.to_client_json(), json!(2));
    }

    #[test]
    fn complex_variant_encodes_as_record_with_type_id() {
        let wall = Tile::Wall { integrity: 100 };
        let encoded = wall.to_db_json();
        assert_eq!(encoded["typeId"], 3);
        assert_eq!(encoded["integrity"], 100);
    }

    #[test]
    fn unregistered_simple_id_is_unknown_tile_type() {
        let registry = TileRegistry::standard();
        let err = registry.decode_db(&json!(99)).unwrap_err();
        assert_eq!(err, TileDecodeError::UnknownTileType(99));
    }

    #[test]
    fn unregistered_complex_id_is_unknown_tile_type() {
        let registry = TileRegistry::standard();
        let err = registry
            .decode_client(&json!({"typeId": 42, "x": 1}))
            .unwrap_err();
        assert_eq!(err, TileDecodeError::UnknownTileType(42));
    }

    #[test]
    fn record_without_type_id_is_malformed() {
        let registry = TileRegistry::standard();
        let err = registry.decode_db(&json!({"integrity": 5})).unwrap_err();
        assert!(matches!(err, TileDecodeError::Malformed(_)));
    }

    #[test]
    fn wall_record_without_integrity_is_malformed() {
        let registry = TileRegistry::standard();
        let err = registry.decode_db(&json!({"typeId": 3})).unwrap_err();
        assert!(matches!(err, TileDecodeError::Malformed(_)));
    }

    #[test]
    fn non_integer_non_record_is_malformed() {
        let registry = TileRegistry::standard();
        assert!(matches!(
            registry.decode_db(&json!("matterite")).unwrap_err(),
            TileDecodeError::Malformed(_)
        ));
        assert!(matches!(
            registry.decode_db(&json!(1.5)).unwrap_err(),
            TileDecodeError::Malformed(_)
        ));
    }

    #[test]
    fn empty_registry_knows_nothing() {
        let registry = TileRegistry::empty();
        assert_eq!(
            registry.decode_db(&json!(0)).unwrap_err(),
            TileDecodeError::UnknownTileType(0)
        );
    }

    #[test]
    fn late_registration_extends_decoding() {
        let mut registry = TileRegistry::empty();
        registry.register_simple(Tile::Energite);
        assert_eq!(registry.decode_db(&json!(2)).unwrap(), Tile::Energite);
    }
}
