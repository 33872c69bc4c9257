//! Session bridge service.
//!
//! Correlates conversation events with the display bound to the same
//! conversation and drives the session lifecycle.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::generation::ImageGenerator;
use crate::trigger::{ConversationEvent, TriggerExtractor, TriggerRequest};
use crate::ws::ServerEvent;

use super::channel::{ClientChannel, ConnectionId};
use super::models::{BindOutcome, GeneratedImage, SessionSnapshot};
use super::pipeline::{GenerationTicket, PendingGeneration, PipelineContext, spawn_pipeline};
use super::registry::{BindError, Session, SessionRegistry};

/// Bridge tuning knobs.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Sessions without activity for this long are evicted.
    pub idle_timeout: Duration,
    /// How often the idle sweeper runs.
    pub sweep_interval: Duration,
    /// Concurrent provider calls per session. 1 means strictly sequential.
    pub max_in_flight_per_session: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            max_in_flight_per_session: 4,
        }
    }
}

/// What the bridge did with a conversation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventOutcome {
    /// No conversation id or nothing to act on.
    Ignored,
    /// No display has joined this conversation.
    NoSession,
    /// The conversation ended and its session was removed.
    Ended { image_count: usize },
    /// Generations were dispatched.
    Dispatched { count: usize },
}

/// Owns the session registry and connects the two event streams.
pub struct SessionBridge {
    registry: Arc<SessionRegistry>,
    generator: Arc<dyn ImageGenerator>,
    extractor: TriggerExtractor,
    config: BridgeConfig,
}

impl SessionBridge {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        extractor: TriggerExtractor,
        config: BridgeConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            generator,
            extractor,
            config,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bind a display to a conversation and confirm on that display only.
    pub fn join(
        &self,
        conversation_id: &str,
        user_id: &str,
        channel: ClientChannel,
    ) -> Result<BindOutcome, BindError> {
        let confirm = channel.clone();
        let outcome = self.registry.bind(conversation_id, channel, user_id)?;

        match outcome {
            BindOutcome::Created => info!("Session {} started by {}", conversation_id, user_id),
            BindOutcome::Superseded { previous } => info!(
                "Connection {} replaced {} on session {}",
                confirm.id(),
                previous,
                conversation_id
            ),
            BindOutcome::Attached | BindOutcome::Unchanged => {
                debug!("Connection {} bound to {}", confirm.id(), conversation_id)
            }
        }

        if let Err(e) = confirm.push(ServerEvent::Joined {
            conversation_id: conversation_id.to_string(),
        }) {
            debug!("Could not confirm join of {}: {:?}", conversation_id, e);
        }
        Ok(outcome)
    }

    /// Dispatch one generation for a live session.
    ///
    /// Returns `None` without side effects when the session does not exist.
    /// The `image_generating` notice is pushed before this returns; the result
    /// or error follows asynchronously in dispatch order.
    pub fn generate(
        &self,
        conversation_id: &str,
        request: TriggerRequest,
    ) -> Option<GenerationTicket> {
        let queue = self
            .registry
            .pipeline_sender(conversation_id, |owner, instance| {
                spawn_pipeline(PipelineContext {
                    conversation_id: conversation_id.to_string(),
                    owner_user_id: owner.to_string(),
                    instance,
                    registry: Arc::clone(&self.registry),
                    generator: Arc::clone(&self.generator),
                    max_in_flight: self.config.max_in_flight_per_session,
                })
            })?;

        debug!("Dispatching generation for {}: {}", conversation_id, request.prompt);
        self.registry.push(
            conversation_id,
            ServerEvent::ImageGenerating {
                conversation_id: conversation_id.to_string(),
                prompt: request.prompt.clone(),
                timestamp: Utc::now(),
            },
        );

        let (reply, rx) = oneshot::channel();
        // A failed send drops `reply`, so the ticket resolves as cancelled.
        let _ = queue.send(PendingGeneration { request, reply });
        Some(GenerationTicket::new(rx))
    }

    /// Route a conversation event from the voice platform.
    pub fn process_event(&self, event: &ConversationEvent) -> EventOutcome {
        let Some(conversation_id) = event
            .conversation_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        else {
            debug!("Ignoring {} event without conversation id", event.event_type);
            return EventOutcome::Ignored;
        };

        if event.is_end_signal() {
            let images = self.end(conversation_id);
            return EventOutcome::Ended {
                image_count: images.len(),
            };
        }

        if !self.registry.contains(conversation_id) {
            debug!("No display joined {}, dropping event", conversation_id);
            return EventOutcome::NoSession;
        }

        let triggers = self.extractor.extract(event);
        if triggers.is_empty() {
            return EventOutcome::Ignored;
        }

        let count = triggers
            .into_iter()
            .filter_map(|trigger| self.generate(conversation_id, trigger))
            .count();
        EventOutcome::Dispatched { count }
    }

    pub fn get(&self, conversation_id: &str) -> Option<SessionSnapshot> {
        self.registry.get(conversation_id)
    }

    pub fn is_bound_to(&self, conversation_id: &str, connection: ConnectionId) -> bool {
        self.registry.is_bound_to(conversation_id, connection)
    }

    pub fn owner_of(&self, conversation_id: &str) -> Option<String> {
        self.registry.owner_of(conversation_id)
    }

    pub fn list_images(&self, conversation_id: &str) -> Vec<GeneratedImage> {
        self.registry.list_images(conversation_id)
    }

    pub fn sessions_for_owner(&self, user_id: &str) -> Vec<SessionSnapshot> {
        self.registry.sessions_for_owner(user_id)
    }

    pub fn all_sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.all_sessions()
    }

    /// End a session, notify its display and return its images.
    ///
    /// Idempotent: ending an unknown or already ended id returns nothing.
    pub fn end(&self, conversation_id: &str) -> Vec<GeneratedImage> {
        match self.registry.remove(conversation_id) {
            Some(session) => {
                info!(
                    "Session {} ended with {} image(s)",
                    conversation_id,
                    session.images.len()
                );
                notify_ended(&session);
                session.images
            }
            None => Vec::new(),
        }
    }

    /// Handle a display disconnect.
    ///
    /// Ends the session only while `connection` is still the bound one, so a
    /// superseded display going away never affects its replacement.
    pub fn disconnect(&self, conversation_id: &str, connection: ConnectionId) -> bool {
        match self.registry.end_if_bound_to(conversation_id, connection) {
            Some(images) => {
                info!(
                    "Display {} left, session {} ended with {} image(s)",
                    connection,
                    conversation_id,
                    images.len()
                );
                true
            }
            None => false,
        }
    }

    /// Detach a display that moved to another conversation.
    pub fn release(&self, conversation_id: &str, connection: ConnectionId) -> bool {
        self.registry.unbind_if(conversation_id, connection)
    }

    /// Evict sessions idle past the configured timeout.
    pub fn evict_idle(&self) -> usize {
        let evicted = self.registry.evict_idle(self.config.idle_timeout);
        for session in &evicted {
            info!("Evicting idle session {}", session.conversation_id);
            notify_ended(session);
        }
        evicted.len()
    }

    /// End every session, e.g. on shutdown.
    pub fn end_all(&self) -> usize {
        let sessions = self.registry.drain();
        for session in &sessions {
            notify_ended(session);
        }
        sessions.len()
    }

    /// Run `evict_idle` periodically until the bridge is dropped.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(bridge) = weak.upgrade() else { break };
                let evicted = bridge.evict_idle();
                if evicted > 0 {
                    debug!("Idle sweep evicted {} session(s)", evicted);
                }
            }
        })
    }
}

fn notify_ended(session: &Session) {
    if let Some(channel) = session.channel() {
        let _ = channel.push(ServerEvent::SessionEnded {
            conversation_id: session.conversation_id.clone(),
            image_count: session.images.len(),
        });
    }
}
