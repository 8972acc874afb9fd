//! Error types for the chat relay
//!
//! Defines the full error taxonomy: synchronous validation errors,
//! connection establishment errors, send errors, wire decode errors,
//! and registration conflicts. Uses thiserror for ergonomic definitions.
//!
//! A failure on one connection must never propagate to another; every
//! error here is scoped to either the calling task or a single connection.

use thiserror::Error;

/// Input validation errors
///
/// Surfaced synchronously to the caller before any network activity.
/// These are user mistakes, never system faults.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Display name is empty after trimming
    #[error("Display name must not be empty")]
    EmptyName,

    /// Host is empty after trimming
    #[error("Host must not be empty")]
    EmptyHost,

    /// Port field is empty
    #[error("Port must not be empty")]
    EmptyPort,

    /// Port is not a number or outside 1..=65535
    #[error("Port must be an integer in the range 1 to 65535")]
    InvalidPort,
}

/// Connection establishment errors
///
/// The connection was never established; there is no state to clean up.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Host name could not be resolved
    #[error("Unknown host: {host}")]
    Unreachable { host: String },

    /// Host resolved but the connection was not accepted
    #[error("Could not connect to {host}:{port}: {source}")]
    Refused {
        host: String,
        port: u16,
        source: std::io::Error,
    },
}

/// Message send errors
///
/// Returned from `Connection::send`. Callers must not retry automatically;
/// a closed connection stays closed.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection has already been closed
    #[error("Connection is closed")]
    Closed,

    /// Writing the frame failed; the connection is now closed
    #[error("IO failure while sending: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire decode errors
///
/// Fatal to the single connection that produced the frame; all other
/// connections are unaffected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame type byte does not match any known packet variant
    #[error("Unknown packet tag: {0:#04x}")]
    UnknownTag(u8),

    /// Payload ended before a declared field length
    #[error("Truncated payload")]
    Truncated,

    /// A string field was not valid UTF-8
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    /// Payload contains bytes past the last field
    #[error("Trailing bytes after payload")]
    TrailingBytes,
}

/// Server-side registration errors
///
/// A rejected registration has no valid subsequent state; the caller
/// closes the offending connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// Another live connection already holds this display name
    #[error("Display name '{0}' is already taken")]
    NameTaken(String),

    /// Display name is empty after trimming
    #[error("Display name must not be empty")]
    EmptyName,
}

/// Errors surfaced by the client facade
#[derive(Debug, Error)]
pub enum ClientError {
    /// Input validation failed before connecting
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Connection could not be established
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Sending a packet failed
    #[error(transparent)]
    Send(#[from] SendError),

    /// Operation requires an active connection
    #[error("Not connected")]
    NotConnected,

    /// A connection is already active; disconnect first
    #[error("Already connected")]
    AlreadyConnected,
}
