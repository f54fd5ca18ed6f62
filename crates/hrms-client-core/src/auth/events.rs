use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Buffer size for the session event channel.
/// Events are rare (one per refresh episode), 16 leaves slow subscribers headroom.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Out-of-band notifications for whatever presents the session to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were refreshed after an expiry.
    Refreshed,
    /// Refresh failed and the stored credentials were cleared.
    Expired { message: String },
}

/// Broadcasts [`SessionEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        trace!("New session event subscriber");
        self.sender.subscribe()
    }

    /// Publish to current subscribers; returns how many received it.
    pub fn publish(&self, event: SessionEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "No subscribers for session event");
                0
            }
        }
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let events = SessionEvents::new();
        assert_eq!(events.publish(SessionEvent::Refreshed), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = SessionEvents::new();
        let mut first = events.subscribe();
        let mut second = events.subscribe();

        let expired = SessionEvent::Expired {
            message: "invalid refresh token".to_string(),
        };
        assert_eq!(events.publish(expired.clone()), 2);

        assert_eq!(first.recv().await.unwrap(), expired);
        assert_eq!(second.recv().await.unwrap(), expired);
    }
}
