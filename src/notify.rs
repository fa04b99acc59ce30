//! Delivery of aggregated events to interested parties.

use crate::aggregate::AggregatedEvent;
use crate::error::NotifyError;
use async_trait::async_trait;
use log::debug;
use tokio::sync::broadcast;

/// Receives an [`AggregatedEvent`] after every successful mutation.
///
/// Webhook forwarders and pub/sub publishers live behind this trait. The
/// store calls sinks after the event is already in the log, so a failing
/// sink never undoes a mutation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &AggregatedEvent) -> Result<(), NotifyError>;
}

/// In-process publish/subscribe over a tokio broadcast channel.
///
/// Subscribers that fall more than `capacity` messages behind miss the
/// oldest ones. Publishing with no subscriber is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<AggregatedEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastSink { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AggregatedEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn publish(&self, event: &AggregatedEvent) -> Result<(), NotifyError> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => debug!("event {} broadcast to {receivers} subscribers", event.event.id),
            Err(_) => debug!("event {} broadcast with no subscribers", event.event.id),
        }
        Ok(())
    }
}
