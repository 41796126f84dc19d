//! Live-session table
//!
//! The single source of truth for "who is near whom right now". Shared by the
//! proximity index (live-user queries) and the realtime broadcaster (fan-out).
//! Backed by a `DashMap` so position writes only lock their own shard; callers
//! copy what they need out of an entry and never hold a guard across `.await`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::entity::LiveUser;
use crate::geo::Position;
use crate::realtime::ServerEvent;
use crate::types::{Result, RunsafeError};

/// Outbound queue of one connected session
pub type SessionSender = mpsc::Sender<ServerEvent>;

/// One runner's live state
#[derive(Debug, Clone)]
pub struct LiveSession {
    pub user_id: String,
    pub session_id: Uuid,
    /// `None` for positions reported over REST without an open channel
    pub sender: Option<SessionSender>,
    pub last_position: Option<Position>,
    pub connected_at: DateTime<Utc>,
}

/// Concurrent table of live sessions keyed by user id
pub struct LiveSessionTable {
    sessions: DashMap<String, LiveSession>,
    max_sessions: usize,
}

impl LiveSessionTable {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    /// Register a connection for `user_id`, replacing any previous one.
    ///
    /// The previous session's last position is carried over so the runner
    /// does not vanish from proximity queries while reconnecting.
    pub fn attach(&self, user_id: &str, sender: SessionSender) -> Result<Uuid> {
        if !self.sessions.contains_key(user_id) && self.is_at_capacity() {
            return Err(RunsafeError::SourceUnavailable(format!(
                "live-session table full ({} sessions)",
                self.max_sessions
            )));
        }

        let session_id = Uuid::new_v4();
        let previous = self.sessions.insert(
            user_id.to_string(),
            LiveSession {
                user_id: user_id.to_string(),
                session_id,
                sender: Some(sender),
                last_position: None,
                connected_at: Utc::now(),
            },
        );

        if let Some(previous) = previous {
            if let Some(mut entry) = self.sessions.get_mut(user_id) {
                entry.last_position = previous.last_position;
            }
            debug!(user_id, old = %previous.session_id, new = %session_id, "Live session replaced");
        } else {
            debug!(user_id, session = %session_id, count = self.sessions.len(), "Live session attached");
        }

        Ok(session_id)
    }

    /// Record the latest position for `user_id` (last write wins by arrival)
    pub fn upsert_position(&self, user_id: &str, position: Position) {
        self.sessions
            .entry(user_id.to_string())
            .and_modify(|session| session.last_position = Some(position.clone()))
            .or_insert_with(|| LiveSession {
                user_id: user_id.to_string(),
                session_id: Uuid::new_v4(),
                sender: None,
                last_position: Some(position.clone()),
                connected_at: Utc::now(),
            });
    }

    /// Remove `user_id` regardless of which session owns the entry
    pub fn remove(&self, user_id: &str) -> Option<LiveSession> {
        self.sessions.remove(user_id).map(|(_, session)| session)
    }

    /// Remove `user_id` only if `session_id` still owns the entry.
    ///
    /// A late disconnect from a replaced connection must not evict the newer one.
    pub fn detach(&self, user_id: &str, session_id: Uuid) -> Option<LiveSession> {
        self.sessions
            .remove_if(user_id, |_, session| session.session_id == session_id)
            .map(|(_, session)| session)
    }

    pub fn get(&self, user_id: &str) -> Option<LiveSession> {
        self.sessions.get(user_id).map(|entry| entry.clone())
    }

    pub fn sender_of(&self, user_id: &str) -> Option<SessionSender> {
        self.sessions
            .get(user_id)
            .and_then(|entry| entry.sender.clone())
    }

    /// Senders of every connected session
    pub fn senders(&self) -> Vec<(String, SessionSender)> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                entry
                    .sender
                    .clone()
                    .map(|sender| (entry.key().clone(), sender))
            })
            .collect()
    }

    /// Senders of every connected session except `user_id`
    pub fn senders_except(&self, user_id: &str) -> Vec<(String, SessionSender)> {
        self.sessions
            .iter()
            .filter(|entry| entry.key() != user_id)
            .filter_map(|entry| {
                entry
                    .sender
                    .clone()
                    .map(|sender| (entry.key().clone(), sender))
            })
            .collect()
    }

    /// Snapshot of every session with a known position
    pub fn live_users(&self) -> Vec<LiveUser> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                entry.last_position.as_ref().map(|position| LiveUser {
                    user_id: entry.user_id.clone(),
                    session_id: entry.session_id,
                    lat: position.lat,
                    lng: position.lng,
                    updated_at: position.captured_at,
                })
            })
            .collect()
    }
}
