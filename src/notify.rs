use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, UserId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-user broadcast of applied schedule events, so views can refresh.
pub struct NotifyHub {
    channels: DashMap<UserId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a user's schedule changes. Creates the channel if needed.
    pub fn subscribe(&self, user_id: &UserId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(user_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(event.user_id()) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose subscribers are all gone.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
