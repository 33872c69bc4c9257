//! Delivery channel to a connected display client.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::ServerEvent;

/// Identifies one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an event could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The client went away.
    Closed,
    /// The client's outbound buffer is full.
    Full,
}

/// Push handle for one client connection.
///
/// Pushing never waits: events are queued on a bounded buffer drained by the
/// connection's writer task.
#[derive(Debug, Clone)]
pub struct ClientChannel {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ClientChannel {
    /// Create a channel and the receiver its writer drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
            mpsc::error::TrySendError::Full(_) => PushError::Full,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_close_detection() {
        let (channel, mut rx) = ClientChannel::new(1);
        assert!(channel.push(ServerEvent::Pong).is_ok());
        assert_eq!(channel.push(ServerEvent::Pong), Err(PushError::Full));
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Pong)));

        drop(rx);
        assert!(channel.is_closed());
        assert_eq!(channel.push(ServerEvent::Pong), Err(PushError::Closed));
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _ra) = ClientChannel::new(1);
        let (b, _rb) = ClientChannel::new(1);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
