//! Server-side connection handler
//!
//! Drives one accepted socket through its lifetime: the Connect handshake,
//! registration with the relay actor, the packet → command loop, and the
//! write task that drains this client's outbox. A failure here is scoped
//! to this connection only.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionEvent};
use crate::packet::Packet;
use crate::server::ServerCommand;

/// Buffer size for a client's outbox channel
const OUTBOX_BUFFER_SIZE: usize = 64;

/// Handle a newly accepted connection
///
/// The first inbound packet must be `Connect` with a usable display name;
/// anything else closes the connection. A rejected registration is
/// likewise answered by closing the socket; there is no error packet on
/// the wire, the close itself is the signal.
pub async fn handle_connection(stream: TcpStream, cmd_tx: mpsc::Sender<ServerCommand>) {
    let conn = Connection::accepted(stream);
    let peer = conn
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    debug!("New connection {} from {}", conn.id(), peer);

    let mut events = conn.start_reading();

    // Handshake: Connect must come first
    let display_name = match events.recv().await {
        Some(ConnectionEvent::Packet(Packet::Connect { display_name })) => display_name,
        Some(ConnectionEvent::Packet(other)) => {
            warn!(
                "Connection {} sent {:#04x} before Connect, closing",
                conn.id(),
                other.tag()
            );
            conn.close().await;
            return;
        }
        Some(ConnectionEvent::Closed(reason)) => {
            debug!("Connection {} closed before handshake: {:?}", conn.id(), reason);
            return;
        }
        None => return,
    };

    // Register with the relay
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Packet>(OUTBOX_BUFFER_SIZE);
    let (reply_tx, reply_rx) = oneshot::channel();
    let register = ServerCommand::Register {
        id: conn.id(),
        name: display_name.clone(),
        outbox: outbox_tx,
        reply: reply_tx,
    };
    if cmd_tx.send(register).await.is_err() {
        conn.close().await;
        return;
    }
    match reply_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            info!("Connection {} rejected: {}", conn.id(), err);
            conn.close().await;
            return;
        }
        Err(_) => {
            conn.close().await;
            return;
        }
    }
    conn.mark_registered();
    let id = conn.id();
    info!("Client '{}' joined from {}", display_name.trim(), peer);

    // Single write task per connection: drains the outbox in order
    let writer_conn = Arc::clone(&conn);
    tokio::spawn(async move {
        while let Some(packet) = outbox_rx.recv().await {
            if writer_conn.send(&packet).await.is_err() {
                break;
            }
        }
        debug!("Write task ended for connection {}", writer_conn.id());
    });

    // Inbound loop: convert chat packets to routing commands
    loop {
        match events.recv().await {
            Some(ConnectionEvent::Packet(Packet::Disconnect)) => {
                debug!("Connection {} sent Disconnect", id);
                break;
            }
            Some(ConnectionEvent::Packet(Packet::Connect { .. })) => {
                warn!("Connection {} sent Connect while registered, closing", id);
                break;
            }
            Some(ConnectionEvent::Packet(
                packet @ (Packet::GroupMessage { .. } | Packet::PrivateMessage { .. }),
            )) => {
                if cmd_tx.send(ServerCommand::Route { id, packet }).await.is_err() {
                    break;
                }
            }
            Some(ConnectionEvent::Packet(other)) => {
                debug!("Connection {} sent unexpected {:#04x}", id, other.tag());
            }
            Some(ConnectionEvent::Closed(reason)) => {
                debug!("Connection {} reader closed: {:?}", id, reason);
                break;
            }
            None => break,
        }
    }

    // Registry entry must be cleared before the connection fully closes
    let _ = cmd_tx.send(ServerCommand::Disconnect { id }).await;
    conn.close().await;
    info!("Client '{}' left", display_name.trim());
}
