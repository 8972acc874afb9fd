//! RelayServer actor
//!
//! The central actor owning the client registry and all routing decisions.
//! Per-connection handlers talk to it over one mpsc channel, which
//! serializes every register/unregister/route operation: no locks, all
//! state access through message passing.
//!
//! Ordering: commands from a single connection arrive in send order, and
//! each recipient drains its outbox with a single write task, so messages
//! from one sender reach every recipient in the order they were sent. No
//! ordering is guaranteed across different senders.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::RegistrationError;
use crate::packet::Packet;
use crate::registry::ClientRegistry;
use crate::types::ConnectionId;

/// Commands sent from connection handlers to the relay actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Bind a display name to a connection
    ///
    /// The reply carries the registration verdict; on rejection the
    /// handler must close the connection, since a failed registration has
    /// no valid subsequent state.
    Register {
        id: ConnectionId,
        name: String,
        outbox: mpsc::Sender<Packet>,
        reply: oneshot::Sender<Result<(), RegistrationError>>,
    },
    /// Route an inbound chat packet from a registered connection
    Route { id: ConnectionId, packet: Packet },
    /// Connection is gone (voluntary or IO failure); idempotent
    Disconnect { id: ConnectionId },
}

/// The relay actor
pub struct RelayServer {
    registry: ClientRegistry,
    config: ServerConfig,
    receiver: mpsc::Receiver<ServerCommand>,
}

impl RelayServer {
    /// Create a relay with the given routing policy and command receiver
    pub fn new(config: ServerConfig, receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            registry: ClientRegistry::new(),
            config,
            receiver,
        }
    }

    /// Run the relay event loop
    ///
    /// Continuously processes commands until all handler senders drop.
    pub async fn run(mut self) {
        info!("Relay started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Relay shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register {
                id,
                name,
                outbox,
                reply,
            } => {
                self.handle_register(id, &name, outbox, reply).await;
            }
            ServerCommand::Route { id, packet } => {
                self.handle_route(id, packet).await;
            }
            ServerCommand::Disconnect { id } => {
                self.handle_disconnect(id).await;
            }
        }
    }

    /// Handle a registration attempt
    async fn handle_register(
        &mut self,
        id: ConnectionId,
        name: &str,
        outbox: mpsc::Sender<Packet>,
        reply: oneshot::Sender<Result<(), RegistrationError>>,
    ) {
        let result = self.registry.register(id, name, outbox);
        match &result {
            Ok(()) => {
                info!("Connection {} registered as '{}'", id, name.trim());
            }
            Err(err) => {
                info!("Connection {} registration rejected: {}", id, err);
            }
        }
        let registered = result.is_ok();
        let _ = reply.send(result);

        if registered {
            self.broadcast_roster().await;
        }
    }

    /// Route one inbound packet from a registered connection
    ///
    /// The `sender` field of routed messages is rewritten with the name
    /// the registry holds for the connection; the registry is the only
    /// identity authority.
    async fn handle_route(&mut self, id: ConnectionId, packet: Packet) {
        let Some(sender_name) = self.registry.name_of(id).map(str::to_string) else {
            debug!("Dropping packet from unregistered connection {}", id);
            return;
        };

        match packet {
            Packet::GroupMessage { body, .. } => {
                for client in self.registry.clients() {
                    if client.id == id && !self.config.echo_to_sender {
                        continue;
                    }
                    let _ = client
                        .deliver(Packet::GroupMessage {
                            body: body.clone(),
                            sender: sender_name.clone(),
                        })
                        .await;
                }
            }
            Packet::PrivateMessage {
                body, recipient, ..
            } => {
                match self.registry.lookup(&recipient) {
                    Some(client) => {
                        let _ = client
                            .deliver(Packet::PrivateMessage {
                                body,
                                sender: sender_name,
                                recipient,
                            })
                            .await;
                    }
                    None => {
                        // Best-effort: no error packet back to the sender
                        debug!(
                            "Dropping private message from '{}' to unknown '{}'",
                            sender_name, recipient
                        );
                    }
                }
            }
            other => {
                debug!(
                    "Ignoring non-routable packet {:#04x} from '{}'",
                    other.tag(),
                    sender_name
                );
            }
        }
    }

    /// Handle a connection departure
    async fn handle_disconnect(&mut self, id: ConnectionId) {
        if let Some(name) = self.registry.unregister(id) {
            info!("Connection {} ('{}') unregistered", id, name);
            self.broadcast_roster().await;
        }
        debug!("Registered clients: {}", self.registry.len());
    }

    /// Send a fresh roster snapshot to every registered connection
    async fn broadcast_roster(&self) {
        let names = self.registry.roster();
        for client in self.registry.clients() {
            let _ = client
                .deliver(Packet::RosterUpdate {
                    names: names.clone(),
                })
                .await;
        }
    }
}
