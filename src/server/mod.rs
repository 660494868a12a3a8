pub mod session;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{info, warn};

use crate::config::server::ServerConfig;
use crate::protocol::{ProtocolError, decode_batch, encode_batch};
use crate::world::SharedWorld;
use self::session::{IdentityLookup, RegionSpec, Session, SessionIdentity};

/// Shared server state: the single world instance plus everything a new
/// session needs at accept time.
pub struct ServerState {
    pub world: SharedWorld,
    identities: Arc<dyn IdentityLookup>,
    idle_timeout: Duration,
    region: RegionSpec,
    next_guest: AtomicU64,
}

impl ServerState {
    pub fn new(world: SharedWorld, identities: Arc<dyn IdentityLookup>, config: &ServerConfig) -> Self {
        ServerState {
            world,
            identities,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            region: RegionSpec {
                width: config.region_width as i32,
                height: config.region_height as i32,
            },
            next_guest: AtomicU64::new(1),
        }
    }

    /// Resolve a session token to an identity, falling back to a fresh
    /// guest when the token is absent or unknown.
    pub fn resolve_identity(&self, token: Option<&str>) -> SessionIdentity {
        token
            .and_then(|t| self.identities.lookup(t))
            .unwrap_or_else(|| {
                SessionIdentity::guest(self.next_guest.fetch_add(1, Ordering::Relaxed))
            })
    }
}

/// How a session ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// No inbound frame within the idle window; a normal close.
    IdleTimeout,
    PeerClosed,
}

/// Why a session was torn down.
#[derive(Debug)]
pub enum SessionError {
    Protocol(ProtocolError),
    Transport(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Protocol(e) => write!(f, "{}", e),
            SessionError::Transport(msg) => write!(f, "Transport failure: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        SessionError::Protocol(e)
    }
}

/// Accept WebSocket connections and run one session task per client.
pub async fn start_server(state: Arc<ServerState>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            match handle_connection(stream, peer, state).await {
                Ok(end) => info!(%peer, ?end, "Session closed"),
                Err(e) => warn!(%peer, "Session error: {}", e),
            }
        });
    }
}

/// Upgrade one TCP connection to WebSocket and run its session loop.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<SessionEnd, SessionError> {
    let mut request_uri = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        request_uri = Some(req.uri().clone());
        Ok(resp)
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))?;

    let token = request_uri.as_ref().and_then(|uri| query_token(uri.query()));
    let identity = state.resolve_identity(token.as_deref());
    info!(%peer, username = %identity.username, "WebSocket connected");

    run_session(ws_stream, identity, &state).await
}

/// Extract `token=...` from a request query string.
fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Per-connection session loop.
///
/// Waits (bounded) for one inbound batch at a time, dispatches it, and
/// replies with the accumulated outbound batch. Exactly one inbound
/// batch is in flight per session; there is no pipelining.
pub async fn run_session(
    ws_stream: WebSocketStream<TcpStream>,
    identity: SessionIdentity,
    state: &ServerState,
) -> Result<SessionEnd, SessionError> {
    let (mut write, mut read) = ws_stream.split();
    let mut session = Session::new(state.world.clone(), identity, state.region);

    let end = loop {
        let message = match tokio::time::timeout(state.idle_timeout, read.next()).await {
            Err(_) => break SessionEnd::IdleTimeout,
            Ok(None) => break SessionEnd::PeerClosed,
            Ok(Some(Err(e))) => return Err(SessionError::Transport(e.to_string())),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let batch = decode_batch(text.as_str())?;
                let outbound = session.handle_batch(&batch)?;
                write
                    .send(Message::Text(encode_batch(&outbound).into()))
                    .await
                    .map_err(|e| SessionError::Transport(e.to_string()))?;
            }
            Message::Binary(_) => {
                return Err(ProtocolError::MalformedMessage(
                    "binary frame on a text protocol".to_string(),
                )
                .into());
            }
            Message::Close(_) => break SessionEnd::PeerClosed,
            // tungstenite answers pings internally; nothing to dispatch.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    };

    let _ = write.send(Message::Close(None)).await;
    Ok(end)
}
