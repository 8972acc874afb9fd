//! Chat client facade
//!
//! The surface the presentation layer talks to: connect/disconnect, group
//! and private sends, peer selection, and a stream of [`ClientEvent`]s.
//! The core never touches rendering state; everything the UI needs to
//! know arrives through the injected event channel.
//!
//! Outbound text is appended to the local session transcript before the
//! packet is sent, which is why the relay does not echo group broadcasts
//! back to their sender by default.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{parse_port, validate_display_name, validate_host};
use crate::connection::{Connection, ConnectionEvent};
use crate::error::ClientError;
use crate::packet::Packet;
use crate::session::{SelectOutcome, SessionController, GROUP_SESSION_TITLE};

/// Events delivered to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A line was appended to a session transcript
    TranscriptAppended { session: String, line: String },
    /// A session came into existence
    ///
    /// `focus` is true only when an inbound private message created the
    /// session; the presentation layer must not steal focus otherwise.
    SessionOpened { session: String, focus: bool },
    /// The registered-name roster changed
    RosterChanged { names: Vec<String> },
    /// A user-facing notice (for example a rejected self-chat selection)
    Notice { text: String },
    /// The connection ended; all sessions were cleared
    Disconnected,
}

struct ActiveConnection {
    conn: Arc<Connection>,
    name: String,
}

struct ClientInner {
    events: mpsc::UnboundedSender<ClientEvent>,
    sessions: Mutex<SessionController>,
    active: Mutex<Option<ActiveConnection>>,
}

impl ClientInner {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn sessions(&self) -> MutexGuard<'_, SessionController> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connection handle and local name, if connected
    fn current(&self) -> Option<(Arc<Connection>, String)> {
        self.active()
            .as_ref()
            .map(|a| (Arc::clone(&a.conn), a.name.clone()))
    }
}

/// A connected (or connectable) chat client
///
/// Cheap to clone handles are not needed; the presentation layer holds
/// one `ChatClient` and the reader task holds the shared inner state.
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Create a client that reports events to the given channel
    pub fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                events,
                sessions: Mutex::new(SessionController::new()),
                active: Mutex::new(None),
            }),
        }
    }

    /// Connect to the relay and register a display name
    ///
    /// Validates all inputs first (`port` is the raw text field value),
    /// then opens the socket, sends `Connect`, activates the session
    /// controller and starts the inbound pump. Registration is implicit:
    /// if the name is taken the relay closes the connection, which
    /// surfaces as a [`ClientEvent::Disconnected`].
    pub async fn connect(
        &self,
        host: &str,
        port: &str,
        display_name: &str,
    ) -> Result<(), ClientError> {
        let host = validate_host(host)?.to_string();
        let port = parse_port(port)?;
        let name = validate_display_name(display_name)?.to_string();

        if self.inner.active().is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let conn = Connection::open(&host, port).await?;
        conn.send(&Packet::Connect {
            display_name: name.clone(),
        })
        .await?;
        conn.mark_registered();
        info!("Connected to {}:{} as '{}'", host, port, name);

        self.inner.sessions().init(&name);
        self.inner.emit(ClientEvent::SessionOpened {
            session: GROUP_SESSION_TITLE.to_string(),
            focus: true,
        });

        let events = conn.start_reading();
        *self.inner.active() = Some(ActiveConnection {
            conn: Arc::clone(&conn),
            name,
        });
        tokio::spawn(pump(Arc::clone(&self.inner), events));

        Ok(())
    }

    /// Disconnect from the relay
    ///
    /// Sends a best-effort `Disconnect` and closes the socket; session
    /// cleanup and the `Disconnected` event follow from the reader task.
    pub async fn disconnect(&self) {
        let Some((conn, _)) = self.inner.current() else {
            return;
        };
        let _ = conn.send(&Packet::Disconnect).await;
        conn.close().await;
    }

    /// Send a message to the group conversation
    ///
    /// The text is appended to the local Group transcript before sending;
    /// empty input is ignored.
    pub async fn send_group_message(&self, text: &str) -> Result<(), ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let (conn, name) = self.inner.current().ok_or(ClientError::NotConnected)?;

        if let Some(line) = self.inner.sessions().append_local(GROUP_SESSION_TITLE, text) {
            self.inner.emit(ClientEvent::TranscriptAppended {
                session: GROUP_SESSION_TITLE.to_string(),
                line,
            });
        }

        conn.send(&Packet::GroupMessage {
            body: text.to_string(),
            sender: name,
        })
        .await?;
        Ok(())
    }

    /// Send a private message to one or more peers
    ///
    /// One `PrivateMessage` packet is sent per peer; the local transcript
    /// of the session titled by the peer set gets a single appended line.
    /// A selection that includes the local name is rejected with a
    /// [`ClientEvent::Notice`] before anything is sent.
    pub async fn send_private_message(
        &self,
        text: &str,
        peers: &[String],
    ) -> Result<(), ClientError> {
        let text = text.trim();
        if text.is_empty() || peers.is_empty() {
            return Ok(());
        }
        let (conn, name) = self.inner.current().ok_or(ClientError::NotConnected)?;

        let title = peers.join(", ");
        {
            let mut sessions = self.inner.sessions();
            match sessions.select_peers(peers) {
                SelectOutcome::Created(created) => {
                    self.inner.emit(ClientEvent::SessionOpened {
                        session: created,
                        focus: false,
                    });
                }
                SelectOutcome::Existing(_) => {}
                SelectOutcome::SelfChat => {
                    self.inner.emit(ClientEvent::Notice {
                        text: "You can't send messages to yourself".to_string(),
                    });
                    return Ok(());
                }
            }
            if let Some(line) = sessions.append_local(&title, text) {
                self.inner.emit(ClientEvent::TranscriptAppended {
                    session: title.clone(),
                    line,
                });
            }
        }

        for peer in peers {
            conn.send(&Packet::PrivateMessage {
                body: text.to_string(),
                sender: name.clone(),
                recipient: peer.clone(),
            })
            .await?;
        }
        Ok(())
    }

    /// Open (or refocus) a private session for the selected peers
    ///
    /// Self-chat selections produce a [`ClientEvent::Notice`] and create
    /// nothing; an existing session is returned for focus routing.
    pub fn select_peers(&self, peers: &[String]) -> SelectOutcome {
        let outcome = self.inner.sessions().select_peers(peers);
        match &outcome {
            SelectOutcome::Created(title) => {
                self.inner.emit(ClientEvent::SessionOpened {
                    session: title.clone(),
                    focus: false,
                });
            }
            SelectOutcome::SelfChat => {
                self.inner.emit(ClientEvent::Notice {
                    text: "You can't send messages to yourself".to_string(),
                });
            }
            SelectOutcome::Existing(_) => {}
        }
        outcome
    }

    /// Close a private session (explicit user action)
    pub fn close_session(&self, title: &str) -> bool {
        self.inner.sessions().close_session(title)
    }

    /// Snapshot of a session transcript
    pub fn transcript(&self, title: &str) -> Option<Vec<String>> {
        self.inner
            .sessions()
            .session(title)
            .map(|s| s.transcript().to_vec())
    }

    /// Snapshot of the current roster
    pub fn roster(&self) -> Vec<String> {
        self.inner.sessions().roster().to_vec()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.inner.sessions().session_count()
    }

    /// Whether a connection is currently active
    pub fn is_connected(&self) -> bool {
        self.inner.active().is_some()
    }
}

/// Inbound pump: connection events → session updates → client events
async fn pump(inner: Arc<ClientInner>, mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Packet(Packet::GroupMessage { body, sender }) => {
                if let Some(line) = inner.sessions().on_group_message(&body, &sender) {
                    inner.emit(ClientEvent::TranscriptAppended {
                        session: GROUP_SESSION_TITLE.to_string(),
                        line,
                    });
                }
            }
            ConnectionEvent::Packet(Packet::PrivateMessage { body, sender, .. }) => {
                let appended = inner.sessions().on_private_message(&body, &sender);
                if let Some((line, created)) = appended {
                    if created {
                        inner.emit(ClientEvent::SessionOpened {
                            session: sender.clone(),
                            focus: true,
                        });
                    }
                    inner.emit(ClientEvent::TranscriptAppended {
                        session: sender,
                        line,
                    });
                }
            }
            ConnectionEvent::Packet(Packet::RosterUpdate { names }) => {
                inner.sessions().on_roster_update(names.clone());
                inner.emit(ClientEvent::RosterChanged { names });
            }
            ConnectionEvent::Packet(other) => {
                debug!("Ignoring unexpected inbound {:#04x}", other.tag());
            }
            ConnectionEvent::Closed(reason) => {
                debug!("Client connection closed: {:?}", reason);
                break;
            }
        }
    }

    *inner.active() = None;
    inner.sessions().terminate();
    inner.emit(ClientEvent::Disconnected);
}
