use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

use crate::models::QueueKind;

/// Sender half of the domain event channel.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event without waiting for capacity. A full or closed
    /// channel drops the event with a warning.
    pub async fn publish(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event channel full, dropping event: {:?}", event);
            }
            Err(TrySendError::Closed(event)) => {
                warn!("Event channel closed, dropping event: {:?}", event);
            }
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Things that happen during a put-away session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    QueueLoaded {
        kind: QueueKind,
        page: u32,
        records: u64,
    },
    WorkItemSelected {
        kind: QueueKind,
        id: String,
        lines: usize,
    },
    SelectionCancelled {
        id: String,
    },
    LocationAssigned {
        line: usize,
        location_code: String,
    },
    LocationCreated {
        location_code: String,
    },
    BulkPatchApplied {
        rows: usize,
        matched: usize,
        unmatched: usize,
    },
    BulkUploadSubmitted {
        rows: usize,
        skipped: usize,
    },
    PutAwayCommitted {
        kind: QueueKind,
        id: String,
        lines: usize,
    },
    PutAwayRejected {
        kind: QueueKind,
        id: String,
        reason: String,
    },
    SessionExpired,
}

/// Drains the channel, logging each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PutAwayRejected { kind, id, reason } => {
                warn!(%kind, %id, "put-away rejected: {}", reason);
            }
            Event::SessionExpired => warn!("operator session expired"),
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_to_closed_channel_does_not_fail() {
        let (sender, rx) = channel(4);
        drop(rx);
        sender.publish(Event::SessionExpired).await;
        assert!(sender.send(Event::SessionExpired).await.is_err());
    }

    #[tokio::test]
    async fn publish_to_full_channel_returns_without_waiting() {
        let (sender, mut rx) = channel(1);
        sender.publish(Event::SessionExpired).await;

        let second = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            sender.publish(Event::SelectionCancelled { id: "pur-1".into() }),
        )
        .await;
        assert!(second.is_ok());

        assert_eq!(rx.recv().await, Some(Event::SessionExpired));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (sender, mut rx) = channel(4);
        sender
            .publish(Event::LocationCreated {
                location_code: "A1-R01-S1-B01".into(),
            })
            .await;
        sender.publish(Event::SessionExpired).await;

        assert_eq!(
            rx.recv().await,
            Some(Event::LocationCreated {
                location_code: "A1-R01-S1-B01".into()
            })
        );
        assert_eq!(rx.recv().await, Some(Event::SessionExpired));
    }
}
