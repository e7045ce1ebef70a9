//! Publish/subscribe channels.
//!
//! Delivery is fire-and-forget: publishing to a channel nobody listens on
//! succeeds and reaches no one, and a subscriber that falls more than the
//! channel capacity behind loses the oldest messages.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::error::{StoreError, StoreResult};

/// A message received on a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: String,
}

/// A live subscription to one channel.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: broadcast::Receiver<Message>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message. Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.channel, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.channel, skipped, "subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Channel registry used by in-process stores.
#[derive(Debug)]
pub(crate) struct Channels {
    capacity: usize,
    senders: RwLock<HashMap<String, broadcast::Sender<Message>>>,
}

impl Channels {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// Send to every current subscriber, returning how many were reached.
    ///
    /// A channel whose subscribers are all gone is dropped.
    pub(crate) fn publish(&self, channel: &str, payload: &str) -> StoreResult<usize> {
        let sent = {
            let senders = self
                .senders
                .read()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            let Some(tx) = senders.get(channel) else {
                return Ok(0);
            };
            let message = Message {
                channel: channel.to_string(),
                payload: payload.to_string(),
            };
            tx.send(message)
        };
        match sent {
            Ok(reached) => Ok(reached),
            Err(_) => {
                let mut senders = self
                    .senders
                    .write()
                    .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
                if senders.get(channel).is_some_and(|tx| tx.receiver_count() == 0) {
                    senders.remove(channel);
                    tracing::debug!(channel, "idle channel dropped");
                }
                Ok(0)
            }
        }
    }

    /// Subscribe to `channel`, dropping channels nobody listens on anymore.
    pub(crate) fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        let mut senders = self
            .senders
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        senders.retain(|_, tx| tx.receiver_count() > 0);
        let tx = senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(Subscription {
            channel: channel.to_string(),
            rx: tx.subscribe(),
        })
    }
}

#[cfg(test)]
impl Channels {
    fn open_channels(&self) -> usize {
        self.senders.read().map(|s| s.len()).unwrap_or(0)
    }
}
