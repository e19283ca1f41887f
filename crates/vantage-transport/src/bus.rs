//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Session`] | Bootstrap progress: initializing, mesh loaded, ready, error |
//! | [`Topic::Localization`] | Scan captures, loading, localization results |
//! | [`Topic::Playback`] | Volumetric loop boundaries and stream errors |

use tokio::sync::broadcast;
use tracing::trace;
use vantage_types::{Event, VantageError};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Session bootstrap state changes.
    Session,
    /// Scan protocol and localization outcomes.
    Localization,
    /// Volumetric playback notifications.
    Playback,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    session: broadcast::Sender<Event>,
    localization: broadcast::Sender<Event>,
    playback: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (session, _) = broadcast::channel(capacity);
        let (localization, _) = broadcast::channel(capacity);
        let (playback, _) = broadcast::channel(capacity);
        Self {
            session,
            localization,
            playback,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`VantageError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, VantageError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| VantageError::Channel(format!("No subscribers for topic {:?}", topic)))
    }

    /// Publish without caring whether anyone listens.
    ///
    /// Components that merely announce progress use this; a missing
    /// subscriber is not a failure for them.
    pub fn notify(&self, topic: Topic, event: Event) -> usize {
        match self.publish_to(topic, event) {
            Ok(n) => n,
            Err(_) => {
                trace!(?topic, "event dropped, no subscribers");
                0
            }
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Session => &self.session,
            Topic::Localization => &self.localization,
            Topic::Playback => &self.playback,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// `Lagged(n)` means the subscriber fell behind and `n` events were
    /// dropped; `Closed` means every sender is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
