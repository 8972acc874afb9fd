//! Multi-user TCP Chat Relay Library
//!
//! A chat relay where clients register a display name and exchange
//! group-broadcast or private one-to-one messages, built on an explicit
//! tagged, length-prefixed binary frame protocol.
//!
//! # Features
//! - Binary wire codec with strict decode validation
//! - Symmetric connection manager (one reader task, serialized writer)
//! - Server-side client registry with display-name uniqueness
//! - Group and private message routing with roster broadcasts
//! - Client-side session controller (group + lazy private sessions)
//!
//! # Architecture
//! The server uses the Actor pattern with `mpsc` channels:
//! - `RelayServer` is the central actor owning the registry and routing
//! - Each connection has a `handler` task communicating with the relay
//! - No locks on server state - all access goes through message passing
//!
//! The client wraps the same `Connection` type and maps inbound traffic
//! onto sessions, reporting everything the presentation layer needs
//! through a `ClientEvent` channel.
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chat_relay::{handle_connection, RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8000").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(RelayServer::new(ServerConfig::default(), cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, cmd_tx.clone()));
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod packet;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatClient, ClientEvent};
pub use config::{parse_port, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{CloseReason, Connection, ConnectionEvent, ConnectionState};
pub use error::{
    ClientError, ConnectError, DecodeError, RegistrationError, SendError, ValidationError,
};
pub use handler::handle_connection;
pub use packet::Packet;
pub use registry::ClientRegistry;
pub use server::{RelayServer, ServerCommand};
pub use session::{ChatSession, SelectOutcome, SessionController, SessionKind};
pub use types::ConnectionId;
