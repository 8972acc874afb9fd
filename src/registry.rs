//! Client registry (server side)
//!
//! Authoritative mapping from registered display name to live connection
//! outbox. Owned exclusively by the relay actor, which serializes every
//! register/unregister/route operation, so the struct itself needs no
//! locking.
//!
//! Invariant: at most one entry per display name at any time; the registry
//! holds exactly the connections currently in `Registered` state.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::{RegistrationError, SendError};
use crate::packet::Packet;
use crate::types::ConnectionId;

/// A registered client reachable for routing
///
/// Holds the non-owning delivery handle: packets pushed into `outbox` are
/// drained by the connection's single write task, which preserves
/// per-recipient delivery order.
#[derive(Debug)]
pub struct RegisteredClient {
    /// Identity of the underlying connection
    pub id: ConnectionId,
    /// Server → connection packet channel
    outbox: mpsc::Sender<Packet>,
}

impl RegisteredClient {
    /// Queue a packet for delivery to this client
    ///
    /// Fails with [`SendError::Closed`] if the connection's write task has
    /// already gone away.
    pub async fn deliver(&self, packet: Packet) -> Result<(), SendError> {
        self.outbox
            .send(packet)
            .await
            .map_err(|_| SendError::Closed)
    }
}

/// Display-name → connection mapping
#[derive(Debug, Default)]
pub struct ClientRegistry {
    by_name: HashMap<String, RegisteredClient>,
    name_by_id: HashMap<ConnectionId, String>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a display name
    ///
    /// The name is trimmed first. Fails if it is empty or already bound to
    /// a live connection; a rejected registration leaves no state behind
    /// and the caller must close the connection.
    pub fn register(
        &mut self,
        id: ConnectionId,
        name: &str,
        outbox: mpsc::Sender<Packet>,
    ) -> Result<(), RegistrationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        if self.by_name.contains_key(name) {
            return Err(RegistrationError::NameTaken(name.to_string()));
        }

        self.by_name
            .insert(name.to_string(), RegisteredClient { id, outbox });
        self.name_by_id.insert(id, name.to_string());
        Ok(())
    }

    /// Remove a connection by identity, returning its name if it was
    /// registered. Idempotent.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<String> {
        let name = self.name_by_id.remove(&id)?;
        self.by_name.remove(&name);
        Some(name)
    }

    /// Look up a client by display name
    pub fn lookup(&self, name: &str) -> Option<&RegisteredClient> {
        self.by_name.get(name)
    }

    /// Display name registered for a connection, if any
    pub fn name_of(&self, id: ConnectionId) -> Option<&str> {
        self.name_by_id.get(&id).map(String::as_str)
    }

    /// All registered clients, in no particular order
    pub fn clients(&self) -> impl Iterator<Item = &RegisteredClient> {
        self.by_name.values()
    }

    /// Sorted snapshot of the registered names
    pub fn roster(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no client is registered
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> mpsc::Sender<Packet> {
        let (tx, _rx) = mpsc::channel(8);
        tx
    }

    #[test]
    fn test_distinct_names_register() {
        let mut registry = ClientRegistry::new();
        assert!(registry.register(ConnectionId::new(), "alice", outbox()).is_ok());
        assert!(registry.register(ConnectionId::new(), "bob", outbox()).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ClientRegistry::new();
        registry
            .register(ConnectionId::new(), "alice", outbox())
            .unwrap();

        let result = registry.register(ConnectionId::new(), "alice", outbox());
        assert_eq!(
            result,
            Err(RegistrationError::NameTaken("alice".to_string()))
        );
        // The rejected registration left no state
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_name_is_trimmed() {
        let mut registry = ClientRegistry::new();
        registry
            .register(ConnectionId::new(), "  alice  ", outbox())
            .unwrap();
        assert!(registry.lookup("alice").is_some());

        let result = registry.register(ConnectionId::new(), "alice", outbox());
        assert!(matches!(result, Err(RegistrationError::NameTaken(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = ClientRegistry::new();
        let result = registry.register(ConnectionId::new(), "   ", outbox());
        assert_eq!(result, Err(RegistrationError::EmptyName));
    }

    #[test]
    fn test_unregister_idempotent() {
        let mut registry = ClientRegistry::new();
        let id = ConnectionId::new();
        registry.register(id, "alice", outbox()).unwrap();

        assert_eq!(registry.unregister(id), Some("alice".to_string()));
        assert_eq!(registry.unregister(id), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_name_freed_after_unregister() {
        let mut registry = ClientRegistry::new();
        let id = ConnectionId::new();
        registry.register(id, "alice", outbox()).unwrap();
        registry.unregister(id);

        assert!(registry.register(ConnectionId::new(), "alice", outbox()).is_ok());
    }

    #[test]
    fn test_roster_sorted() {
        let mut registry = ClientRegistry::new();
        registry.register(ConnectionId::new(), "carol", outbox()).unwrap();
        registry.register(ConnectionId::new(), "alice", outbox()).unwrap();
        registry.register(ConnectionId::new(), "bob", outbox()).unwrap();

        assert_eq!(registry.roster(), vec!["alice", "bob", "carol"]);
    }
}
