//! Chat session controller (client side)
//!
//! Maps inbound and outbound traffic onto logical conversation sessions:
//! one persistent Group session created on `init`, plus Private sessions
//! created lazily on first outbound peer selection or first inbound
//! message from an unknown peer. Each session holds an append-only
//! transcript. Sessions are destroyed only by explicit user close or by
//! full disconnect. The relay has no notion of peer-to-peer liveness, so
//! a peer leaving the roster never removes its session.

use std::time::Instant;

use tracing::debug;

/// Title of the singleton group session
pub const GROUP_SESSION_TITLE: &str = "Group Chat";

/// What kind of conversation a session holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// The singleton broadcast conversation
    Group,
    /// A one-or-many-peer private conversation
    Private,
}

/// A logical conversation with an ordered transcript
#[derive(Debug)]
pub struct ChatSession {
    /// Group or private
    pub kind: SessionKind,
    /// Peer name(s) for private sessions, fixed title for the group
    pub title: String,
    /// Session creation time
    pub created_at: Instant,
    transcript: Vec<String>,
}

impl ChatSession {
    fn new(kind: SessionKind, title: String) -> Self {
        Self {
            kind,
            title,
            created_at: Instant::now(),
            transcript: Vec::new(),
        }
    }

    /// Append one line to the transcript
    pub fn append(&mut self, line: String) {
        self.transcript.push(line);
    }

    /// The ordered transcript
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }
}

/// Result of a user peer selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// A new private session was created with this title
    Created(String),
    /// A session with this title already exists; route focus to it
    Existing(String),
    /// The selection included the local user; no session created
    SelfChat,
}

/// Client-side controller mapping traffic to sessions
///
/// Plain synchronous state; the client facade provides the mutual
/// exclusion between the reader task and user-initiated calls.
#[derive(Debug, Default)]
pub struct SessionController {
    active: bool,
    local_name: String,
    sessions: Vec<ChatSession>,
    roster: Vec<String>,
}

impl SessionController {
    /// Create an inactive controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate for a connected lifetime: creates the Group session
    pub fn init(&mut self, local_name: &str) {
        self.sessions.clear();
        self.sessions.push(ChatSession::new(
            SessionKind::Group,
            GROUP_SESSION_TITLE.to_string(),
        ));
        self.local_name = local_name.to_string();
        self.active = true;
        debug!("Session controller active for '{}'", local_name);
    }

    /// Deactivate on disconnect: clears all sessions and the roster
    pub fn terminate(&mut self) {
        self.active = false;
        self.sessions.clear();
        self.roster.clear();
        self.local_name.clear();
        debug!("Session controller terminated");
    }

    /// Whether a connected lifetime is active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Local display name for the current lifetime
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Handle a user selecting one or more peers for a private chat
    ///
    /// Self-chat and duplicate sessions are rejected with an outcome the
    /// presentation layer renders as a notice or a focus change, never an
    /// error.
    pub fn select_peers(&mut self, peers: &[String]) -> SelectOutcome {
        let title = peers.join(", ");
        for peer in peers {
            if *peer == self.local_name {
                return SelectOutcome::SelfChat;
            }
        }
        if self.find(&title).is_some() {
            return SelectOutcome::Existing(title);
        }

        self.sessions
            .push(ChatSession::new(SessionKind::Private, title.clone()));
        SelectOutcome::Created(title)
    }

    /// Append an inbound group message; returns the transcript line
    pub fn on_group_message(&mut self, body: &str, sender: &str) -> Option<String> {
        if !self.active {
            return None;
        }
        let line = format!("{}: {}", sender, body);
        self.find_mut(GROUP_SESSION_TITLE)?.append(line.clone());
        Some(line)
    }

    /// Append an inbound private message, creating the session on first
    /// contact from an unknown peer
    ///
    /// Returns the transcript line and whether a session was created, so
    /// the presentation layer can decide to switch focus only on first
    /// creation.
    pub fn on_private_message(&mut self, body: &str, sender: &str) -> Option<(String, bool)> {
        if !self.active {
            return None;
        }
        let created = if self.find(sender).is_none() {
            self.sessions
                .push(ChatSession::new(SessionKind::Private, sender.to_string()));
            true
        } else {
            false
        };

        let line = format!("{}: {}", sender, body);
        self.find_mut(sender)?.append(line.clone());
        Some((line, created))
    }

    /// Append a locally sent message to the session with the given title
    pub fn append_local(&mut self, title: &str, body: &str) -> Option<String> {
        if !self.active {
            return None;
        }
        let line = format!("{}: {}", self.local_name, body);
        self.find_mut(title)?.append(line.clone());
        Some(line)
    }

    /// Replace the visible roster; existing sessions are untouched
    pub fn on_roster_update(&mut self, names: Vec<String>) {
        self.roster = names;
    }

    /// Current roster snapshot
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// Close a session by title (explicit user action)
    ///
    /// The Group session cannot be closed while connected. Returns whether
    /// a session was removed.
    pub fn close_session(&mut self, title: &str) -> bool {
        let before = self.sessions.len();
        self.sessions
            .retain(|s| s.kind == SessionKind::Group || s.title != title);
        self.sessions.len() != before
    }

    /// Look up a session by title
    pub fn session(&self, title: &str) -> Option<&ChatSession> {
        self.find(title)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn find(&self, title: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.title == title)
    }

    fn find_mut(&mut self, title: &str) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.title == title)
    }
}
