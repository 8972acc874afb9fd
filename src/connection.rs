//! Connection manager
//!
//! Owns one TCP socket, one dedicated reader task and one serialized
//! writer. The same shape is used on both the client and the server side.
//!
//! Lifecycle: `Open → Registered → Closed`. `Closed` is terminal; sends on
//! a closed connection fail with [`SendError::Closed`] and there is no
//! automatic reconnect. The reader task owns the close reason and emits
//! exactly one [`ConnectionEvent::Closed`] from its single exit point, so
//! a voluntary close and an IO failure can never both finalize the
//! connection.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ConnectError, DecodeError, SendError};
use crate::packet::{Packet, FRAME_HEADER_LEN};
use crate::types::ConnectionId;

/// Buffer size for the inbound event channel
const EVENT_BUFFER_SIZE: usize = 32;

const STATE_OPEN: u8 = 0;
const STATE_REGISTERED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket established, no Connect processed yet
    Open,
    /// Display name accepted; eligible for routed traffic
    Registered,
    /// Terminal; socket released
    Closed,
}

/// Why a connection's reader loop terminated
#[derive(Debug)]
pub enum CloseReason {
    /// `close` was called on this end
    Local,
    /// The peer closed the socket at a frame boundary
    PeerClosed,
    /// A read or write failed mid-stream
    Io(std::io::Error),
    /// An inbound frame failed to decode
    Decode(DecodeError),
}

/// Events emitted by a connection's reader task
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A fully decoded inbound packet
    Packet(Packet),
    /// The reader loop terminated; sent exactly once, always last
    Closed(CloseReason),
}

/// A live connection to a peer
///
/// All sends are mutually exclusive through the writer mutex so concurrent
/// writers never interleave partial frames; a half-written frame would
/// corrupt every subsequent read on the stream.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    writer: Mutex<OwnedWriteHalf>,
    reader: std::sync::Mutex<Option<OwnedReadHalf>>,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl Connection {
    /// Establish a client connection to `host:port`
    ///
    /// Resolution failure maps to [`ConnectError::Unreachable`], a failed
    /// connect to [`ConnectError::Refused`]. No timeout is applied; the
    /// call blocks until the OS resolves it.
    pub async fn open(host: &str, port: u16) -> Result<Arc<Self>, ConnectError> {
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|_| ConnectError::Unreachable {
                host: host.to_string(),
            })?;
        let Some(addr) = addrs.next() else {
            return Err(ConnectError::Unreachable {
                host: host.to_string(),
            });
        };

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConnectError::Refused {
                host: host.to_string(),
                port,
                source,
            })?;

        Ok(Self::from_stream(stream))
    }

    /// Wrap an accepted server-side socket
    pub fn accepted(stream: TcpStream) -> Arc<Self> {
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Arc<Self> {
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        Arc::new(Self {
            id: ConnectionId::new(),
            peer,
            writer: Mutex::new(write_half),
            reader: std::sync::Mutex::new(Some(read_half)),
            state: AtomicU8::new(STATE_OPEN),
            cancel: CancellationToken::new(),
        })
    }

    /// Unique identity of this connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address, if known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => ConnectionState::Open,
            STATE_REGISTERED => ConnectionState::Registered,
            _ => ConnectionState::Closed,
        }
    }

    /// Whether the connection has reached its terminal state
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Record a successful Connect handshake
    ///
    /// Only transitions from `Open`; a closed connection stays closed.
    pub fn mark_registered(&self) {
        let _ = self.state.compare_exchange(
            STATE_OPEN,
            STATE_REGISTERED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Returns true on the first transition into `Closed`
    fn mark_closed(&self) -> bool {
        self.state.swap(STATE_CLOSED, Ordering::AcqRel) != STATE_CLOSED
    }

    /// Serialize and write one packet
    ///
    /// Holds the send lock for the duration of the write. An IO failure
    /// transitions the connection to `Closed`; the caller must not retry.
    pub async fn send(&self, packet: &Packet) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        let frame = packet.encode();

        let mut writer = self.writer.lock().await;
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        match writer.write_all(&frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if self.mark_closed() {
                    self.cancel.cancel();
                }
                Err(SendError::Io(err))
            }
        }
    }

    /// Start the dedicated reader loop for this connection
    ///
    /// Emits one [`ConnectionEvent::Packet`] per decoded frame and a final
    /// [`ConnectionEvent::Closed`] when the socket is done, whether by
    /// local close, peer close, IO error or decode failure.
    pub fn start_reading(self: &Arc<Self>) -> mpsc::Receiver<ConnectionEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);

        let taken = self.reader.lock().ok().and_then(|mut half| half.take());
        let Some(mut read_half) = taken else {
            warn!("Reader already started for connection {}", self.id);
            let _ = tx.try_send(ConnectionEvent::Closed(CloseReason::Local));
            return rx;
        };

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let reason = loop {
                let frame = tokio::select! {
                    _ = conn.cancel.cancelled() => break CloseReason::Local,
                    frame = read_frame(&mut read_half) => frame,
                };
                match frame {
                    Ok(Some(packet)) => {
                        if tx.send(ConnectionEvent::Packet(packet)).await.is_err() {
                            // Consumer went away; nothing left to deliver to
                            break CloseReason::Local;
                        }
                    }
                    Ok(None) => break CloseReason::PeerClosed,
                    Err(FrameError::Io(err)) => break CloseReason::Io(err),
                    Err(FrameError::Decode(err)) => break CloseReason::Decode(err),
                }
            };

            if conn.mark_closed() {
                conn.cancel.cancel();
            }
            debug!("Reader ended for connection {}: {:?}", conn.id, reason);
            let _ = tx.send(ConnectionEvent::Closed(reason)).await;
        });

        rx
    }

    /// Close the connection
    ///
    /// Unblocks the reader task, shuts down the write half and releases
    /// the socket. Safe to call on an already failed or closed connection.
    pub async fn close(&self) {
        if self.mark_closed() {
            self.cancel.cancel();
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
    }
}

enum FrameError {
    Io(std::io::Error),
    Decode(DecodeError),
}

/// Read one complete frame
///
/// Returns `Ok(None)` on a clean peer close at a frame boundary. EOF in
/// the middle of a frame is an IO error (torn frame).
async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Option<Packet>, FrameError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(FrameError::Io(err)),
    }

    let tag = header[0];
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(FrameError::Io)?;

    Packet::decode(tag, &payload)
        .map(Some)
        .map_err(FrameError::Decode)
}
