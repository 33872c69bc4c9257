//! In-memory session registry.
//!
//! Sole source of truth for "is this conversation being watched, and by
//! whom". Every operation is a single map entry operation and none of them
//! await, so a mutation can never be observed half-done.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::ws::ServerEvent;

use super::channel::{ClientChannel, ConnectionId, PushError};
use super::models::{BindOutcome, GeneratedImage, SessionSnapshot};
use super::pipeline::PipelineSender;

/// Errors returned when binding a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("conversation {conversation_id} belongs to another user")]
    NotOwner { conversation_id: String },
}

/// Channel binding state of a session.
#[derive(Debug)]
pub enum SessionState {
    /// No display is attached.
    Unbound,
    /// Exactly one display receives this session's events.
    Bound(ClientChannel),
}

/// Bookkeeping for one monitored conversation.
#[derive(Debug)]
pub struct Session {
    pub conversation_id: String,
    pub owner_user_id: String,
    pub state: SessionState,
    pub images: Vec<GeneratedImage>,
    pub started_at: DateTime<Utc>,
    instance: Uuid,
    last_activity: Instant,
    pipeline: Option<PipelineSender>,
}

impl Session {
    fn new(conversation_id: &str, owner_user_id: &str, state: SessionState) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            owner_user_id: owner_user_id.to_string(),
            state,
            images: Vec::new(),
            started_at: Utc::now(),
            instance: Uuid::new_v4(),
            last_activity: Instant::now(),
            pipeline: None,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn channel(&self) -> Option<&ClientChannel> {
        match &self.state {
            SessionState::Bound(channel) => Some(channel),
            SessionState::Unbound => None,
        }
    }

    pub fn is_bound_to(&self, connection: ConnectionId) -> bool {
        self.channel().is_some_and(|c| c.id() == connection)
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation_id: self.conversation_id.clone(),
            owner_user_id: self.owner_user_id.clone(),
            bound: self.channel().is_some(),
            image_count: self.images.len(),
            credits_used: self.images.iter().map(|i| i.credits_used).sum(),
            started_at: self.started_at,
        }
    }
}

/// Map from conversation id to session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.sessions.contains_key(conversation_id)
    }

    /// Snapshot of a session; `None` for an unknown id.
    pub fn get(&self, conversation_id: &str) -> Option<SessionSnapshot> {
        self.sessions.get(conversation_id).map(|s| s.snapshot())
    }

    /// Whether `connection` is the channel currently bound to the session.
    pub fn is_bound_to(&self, conversation_id: &str, connection: ConnectionId) -> bool {
        self.sessions
            .get(conversation_id)
            .is_some_and(|s| s.is_bound_to(connection))
    }

    pub fn owner_of(&self, conversation_id: &str) -> Option<String> {
        self.sessions
            .get(conversation_id)
            .map(|s| s.owner_user_id.clone())
    }

    /// Bind a channel to a conversation, creating the session if needed.
    ///
    /// A channel already bound to the session is replaced, never merged.
    pub fn bind(
        &self,
        conversation_id: &str,
        channel: ClientChannel,
        owner_user_id: &str,
    ) -> Result<BindOutcome, BindError> {
        match self.sessions.entry(conversation_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(Session::new(
                    conversation_id,
                    owner_user_id,
                    SessionState::Bound(channel),
                ));
                Ok(BindOutcome::Created)
            }
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                if session.owner_user_id != owner_user_id {
                    return Err(BindError::NotOwner {
                        conversation_id: conversation_id.to_string(),
                    });
                }
                session.touch();

                let new_id = channel.id();
                let previous = std::mem::replace(&mut session.state, SessionState::Bound(channel));
                Ok(match previous {
                    SessionState::Unbound => BindOutcome::Attached,
                    SessionState::Bound(old) if old.id() == new_id => BindOutcome::Unchanged,
                    SessionState::Bound(old) => BindOutcome::Superseded { previous: old.id() },
                })
            }
        }
    }

    /// Append an image. Returns false when the session no longer exists.
    pub fn record_image(&self, conversation_id: &str, image: GeneratedImage) -> bool {
        self.record_image_where(conversation_id, |_| true, image)
    }

    /// Append an image only to the session incarnation `instance`.
    pub(crate) fn record_image_in(
        &self,
        conversation_id: &str,
        instance: Uuid,
        image: GeneratedImage,
    ) -> bool {
        self.record_image_where(conversation_id, |s| s.instance == instance, image)
    }

    fn record_image_where(
        &self,
        conversation_id: &str,
        accept: impl Fn(&Session) -> bool,
        image: GeneratedImage,
    ) -> bool {
        match self.sessions.get_mut(conversation_id) {
            Some(mut session) if accept(&*session) => {
                session.images.push(image);
                session.touch();
                true
            }
            _ => false,
        }
    }

    /// Images in generation order; empty for an unknown id.
    pub fn list_images(&self, conversation_id: &str) -> Vec<GeneratedImage> {
        self.sessions
            .get(conversation_id)
            .map(|s| s.images.clone())
            .unwrap_or_default()
    }

    /// Deliver an event to the session's bound channel.
    ///
    /// Returns false when there is no session, no channel, or the channel is
    /// gone. A closed channel is discarded and the session becomes unbound.
    pub fn push(&self, conversation_id: &str, event: ServerEvent) -> bool {
        self.push_where(conversation_id, |_| true, event)
    }

    /// Push only while the session incarnation `instance` is still live.
    pub(crate) fn push_in(&self, conversation_id: &str, instance: Uuid, event: ServerEvent) -> bool {
        self.push_where(conversation_id, |s| s.instance == instance, event)
    }

    fn push_where(
        &self,
        conversation_id: &str,
        accept: impl Fn(&Session) -> bool,
        event: ServerEvent,
    ) -> bool {
        let Some(mut session) = self.sessions.get_mut(conversation_id) else {
            return false;
        };
        if !accept(&*session) {
            return false;
        }
        let Some(channel) = session.channel() else {
            debug!("No display bound to {}, dropping event", conversation_id);
            return false;
        };

        match channel.push(event) {
            Ok(()) => true,
            Err(PushError::Full) => {
                warn!(
                    "Display buffer full for conversation {}, dropping event",
                    conversation_id
                );
                false
            }
            Err(PushError::Closed) => {
                info!(
                    "Display for conversation {} went away, unbinding",
                    conversation_id
                );
                session.state = SessionState::Unbound;
                false
            }
        }
    }

    /// Remove a session and return its images. Idempotent.
    pub fn end(&self, conversation_id: &str) -> Vec<GeneratedImage> {
        self.remove(conversation_id)
            .map(|s| s.images)
            .unwrap_or_default()
    }

    pub(crate) fn remove(&self, conversation_id: &str) -> Option<Session> {
        self.sessions.remove(conversation_id).map(|(_, s)| s)
    }

    /// End the session only if `connection` is its bound channel.
    pub fn end_if_bound_to(
        &self,
        conversation_id: &str,
        connection: ConnectionId,
    ) -> Option<Vec<GeneratedImage>> {
        self.sessions
            .remove_if(conversation_id, |_, s| s.is_bound_to(connection))
            .map(|(_, s)| s.images)
    }

    /// Detach `connection` from the session without ending it.
    pub fn unbind_if(&self, conversation_id: &str, connection: ConnectionId) -> bool {
        match self.sessions.get_mut(conversation_id) {
            Some(mut session) if session.is_bound_to(connection) => {
                session.state = SessionState::Unbound;
                true
            }
            _ => false,
        }
    }

    /// Remove and return every session idle for at least `ttl`.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<Session> {
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.idle_for() >= ttl)
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter_map(|id| {
                self.sessions
                    .remove_if(&id, |_, s| s.idle_for() >= ttl)
                    .map(|(_, s)| s)
            })
            .collect()
    }

    pub(crate) fn drain(&self) -> Vec<Session> {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.into_iter().filter_map(|id| self.remove(&id)).collect()
    }

    pub fn sessions_for_owner(&self, owner_user_id: &str) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.owner_user_id == owner_user_id)
            .map(|entry| entry.snapshot())
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    pub fn all_sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|entry| entry.snapshot()).collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    /// Return the session's generation queue, creating it with `spawn` on
    /// first use or after the previous queue shut down.
    ///
    /// `spawn` receives the owner and the session incarnation id.
    pub(crate) fn pipeline_sender(
        &self,
        conversation_id: &str,
        spawn: impl FnOnce(&str, Uuid) -> PipelineSender,
    ) -> Option<PipelineSender> {
        let mut session = self.sessions.get_mut(conversation_id)?;
        session.touch();
        match &session.pipeline {
            Some(sender) if !sender.is_closed() => Some(sender.clone()),
            _ => {
                let sender = spawn(&session.owner_user_id, session.instance);
                session.pipeline = Some(sender.clone());
                Some(sender)
            }
        }
    }
}
