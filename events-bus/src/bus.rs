//! Topic-keyed broadcast bus.
//!
//! One `tokio::sync::broadcast` channel per topic, created lazily on first
//! use. Publishing to a topic with no live subscribers is a silent no-op.

use crate::error::{EventBusError, Result};
use crate::event::Event;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Buffered events per topic before slow subscribers start losing them.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<DashMap<String, broadcast::Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to its topic. Returns the number of subscribers that
    /// received it; zero is not an error.
    pub fn publish(&self, event: Event) -> usize {
        let Some(sender) = self.channels.get(&event.topic) else {
            tracing::trace!(topic = %event.topic, "no subscribers, event dropped");
            return 0;
        };

        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => 0, // All receivers dropped since the channel was created.
        }
    }

    /// Subscribe to a topic. Events published before this call are not
    /// replayed.
    pub fn subscribe(&self, topic: &str) -> Subscriber {
        let sender = self
            .channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);

        Subscriber {
            receiver: sender.subscribe(),
        }
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

/// Receiving end of a topic subscription.
pub struct Subscriber {
    receiver: broadcast::Receiver<Event>,
}

impl Subscriber {
    /// Wait for the next event on this topic.
    ///
    /// # Errors
    ///
    /// Returns `Lagged` when the subscriber fell behind and events were
    /// overwritten, `ChannelClosed` when every publisher handle is gone.
    pub async fn recv(&mut self) -> Result<Event> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event subscriber lagged");
                Err(EventBusError::Lagged(missed))
            }
            Err(broadcast::error::RecvError::Closed) => Err(EventBusError::ChannelClosed),
        }
    }

    /// Non-blocking poll for an already-delivered event.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}
