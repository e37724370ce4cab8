use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-resource change feeds. Subscribers use it to
/// invalidate cached views after every committed mutation.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a resource's feed. Creates the channel if needed; the
    /// channel is released again when the last subscription drops.
    pub fn subscribe(self: &Arc<Self>, resource_id: &str) -> Subscription {
        let rx = self
            .channels
            .entry(resource_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        Subscription {
            rx: Some(rx),
            hub: self.clone(),
            resource_id: resource_id.to_string(),
        }
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(event.resource_id()) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop the channel for `resource_id` if nobody listens to it anymore.
    pub fn release(&self, resource_id: &str) {
        self.channels
            .remove_if(resource_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// A live subscription to one resource's feed.
pub struct Subscription {
    /// Only `None` while dropping.
    rx: Option<broadcast::Receiver<Event>>,
    hub: Arc<NotifyHub>,
    resource_id: String,
}

impl Subscription {
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    pub fn try_recv(&mut self) -> Result<Event, TryRecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.try_recv(),
            None => Err(TryRecvError::Closed),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver must be gone before the hub counts what is left.
        drop(self.rx.take());
        self.hub.release(&self.resource_id);
    }
}
