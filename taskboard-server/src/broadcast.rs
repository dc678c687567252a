//! Live update broadcaster: per-project channel fan-out.
//!
//! Each connected socket owns an outbound queue. Subscribing a socket to a
//! [`ProjectChannel`] registers that queue under the channel; publishing
//! clones the event into every queue registered there, including the queue
//! of the connection that caused the mutation.
//!
//! Delivery is best effort: no persistence, no acknowledgment, no retry.
//! A queue whose receiver is gone is pruned silently.

use std::collections::HashMap;

use taskboard_proto::event::{LiveUpdate, LiveUpdateEvent, ProjectChannel};
use taskboard_proto::wire::ServerMessage;
use tokio::sync::{RwLock, mpsc};

/// Identifies one WebSocket connection.
pub type ConnectionId = u64;

/// Outbound queue of a connection.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Registry of project channel subscribers.
pub struct Broadcaster {
    channels: RwLock<HashMap<ProjectChannel, HashMap<ConnectionId, Outbox>>>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    /// Creates a broadcaster with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes a connection to a channel.
    ///
    /// Returns `false` if the connection was already subscribed (its outbox
    /// is replaced).
    pub async fn subscribe(
        &self,
        channel: ProjectChannel,
        connection: ConnectionId,
        outbox: Outbox,
    ) -> bool {
        let mut channels = self.channels.write().await;
        let fresh = channels
            .entry(channel)
            .or_default()
            .insert(connection, outbox)
            .is_none();
        drop(channels);
        tracing::debug!(%channel, connection, fresh, "subscribed");
        fresh
    }

    /// Removes a connection from a channel, returning whether it was there.
    pub async fn unsubscribe(&self, channel: ProjectChannel, connection: ConnectionId) -> bool {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(&channel) else {
            return false;
        };
        let removed = subscribers.remove(&connection).is_some();
        if subscribers.is_empty() {
            channels.remove(&channel);
        }
        removed
    }

    /// Removes a connection from every channel, returning how many it left.
    pub async fn unsubscribe_all(&self, connection: ConnectionId) -> usize {
        let mut channels = self.channels.write().await;
        let mut left = 0;
        channels.retain(|_, subscribers| {
            if subscribers.remove(&connection).is_some() {
                left += 1;
            }
            !subscribers.is_empty()
        });
        left
    }

    /// Drops every subscriber of a channel (used when a project is deleted).
    pub async fn close_channel(&self, channel: ProjectChannel) -> usize {
        let mut channels = self.channels.write().await;
        channels.remove(&channel).map_or(0, |subscribers| subscribers.len())
    }

    /// Returns the number of connections subscribed to a channel.
    pub async fn subscriber_count(&self, channel: ProjectChannel) -> usize {
        let channels = self.channels.read().await;
        channels.get(&channel).map_or(0, HashMap::len)
    }

    /// Publishes an update to every subscriber of `channel`.
    ///
    /// Must only be called after the corresponding mutation has been applied
    /// to the store. Returns the number of queues the event was handed to.
    pub async fn publish(&self, channel: ProjectChannel, update: LiveUpdate) -> usize {
        let event = LiveUpdateEvent::new(channel.project_id(), update);
        let kind = event.kind();

        let targets: Vec<(ConnectionId, Outbox)> = {
            let channels = self.channels.read().await;
            channels
                .get(&channel)
                .map(|subscribers| {
                    subscribers
                        .iter()
                        .map(|(id, outbox)| (*id, outbox.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (connection, outbox) in targets {
            if outbox.send(ServerMessage::Event(event.clone())).is_ok() {
                delivered += 1;
            } else {
                dead.push(connection);
            }
        }

        if !dead.is_empty() {
            tracing::debug!(%channel, count = dead.len(), "pruning dead subscribers");
            for connection in dead {
                self.unsubscribe(channel, connection).await;
            }
        }

        tracing::debug!(%channel, %kind, delivered, "published live update");
        delivered
    }
}
