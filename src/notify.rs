use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ResourceId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-restaurant broadcast of applied reservation events, so open
/// availability views can refresh without polling.
pub struct NotifyHub {
    channels: DashMap<ResourceId, broadcast::Sender<Event>>,
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

    /// Subscribe to a resource's events. Creates the channel on first use.
    pub fn subscribe(&self, resource_id: &ResourceId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(resource_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan out an event. No-op when nobody listens.
    pub fn send(&self, event: &Event) {
        let resource_id = event.resource_id();
        let orphaned = match self.channels.get(resource_id) {
            Some(sender) => sender.send(event.clone()).is_err(),
            None => false,
        };
        if orphaned {
            // every receiver is gone
            self.channels
                .remove_if(resource_id, |_, sender| sender.receiver_count() == 0);
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
