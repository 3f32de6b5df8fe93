//! WebSocket connection hub.
//!
//! SYSTEM CONTEXT
//! ==============
//! A host accepts upgrade requests and hands them to a [`Hub`]. The hub
//! negotiates a subprotocol, runs one read loop per connection, reassembles
//! fragmented frames into messages and dispatches them to receive handlers.
//! Live connections are tracked in a concurrent [`Registry`].
//!
//! [`routes::app`] wires the hub into an axum router; other hosts implement
//! [`transport::UpgradeRequest`] or call [`Hub::run`] directly.

pub mod config;
pub mod connection;
pub mod handler;
pub mod hub;
pub mod negotiate;
pub mod registry;
pub mod routes;
pub mod subprotocol;
pub mod transport;

pub use config::{ConfigError, HandlerMode, HubConfig, ServerConfig};
pub use connection::{Connection, ConnectionId, SendError};
pub use handler::{BroadcastHandler, EchoHandler, HandlerError, HandlerRef, ReceiveHandler};
pub use hub::{CloseKind, ConnectionSummary, HandleError, Hub};
pub use negotiate::{Selection, negotiate, parse_offered, resolve};
pub use registry::{Registry, RegistryStats};
pub use subprotocol::{Subprotocol, SubprotocolError, SubprotocolRef};
