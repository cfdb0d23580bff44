//! Engine Event Channel
//!
//! The reconciler, settlement and dispatcher publish domain events to a
//! broadcast channel; the notification layer (out of scope here) subscribes.
//! Publishing never blocks core logic, and a lagging subscriber loses oldest
//! events rather than stalling the publisher.

use serde::Serialize;
use tokio::sync::broadcast;

/// Default buffer size for the event channel.
///
/// Enough to absorb bursts while keeping memory bounded.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Domain events emitted by the engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A valid transfer confirmed a deposit and booked a bet
    BetPlaced {
        race_id: String,
        bet_id: String,
        runner_number: u8,
        amount_lamports: u64,
        odds: f64,
    },
    /// A transfer was rejected and a refund queued
    DepositRejected {
        deposit_id: String,
        refund_id: String,
        status: String,
        amount_lamports: u64,
    },
    /// A deposit address expired with nothing received
    DepositExpired { deposit_id: String },
    /// A race settled with a declared winner
    RaceSettled {
        race_id: String,
        winner: u8,
        total_pool_lamports: u64,
        distributable_lamports: u64,
        payouts: usize,
    },
    /// An outbound payout or refund confirmed on the ledger
    TransferCompleted {
        id: String,
        kind: TransferKind,
        tx_signature: String,
    },
    /// An outbound payout or refund failed
    TransferFailed {
        id: String,
        kind: TransferKind,
        error: String,
    },
}

/// What an outbound transfer event refers to
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Payout,
    Refund,
    Collection,
}

/// Sender handle for engine events
pub type EngineEventSender = EventPublisher;
/// Receiver handle for engine events
pub type EngineEventReceiver = broadcast::Receiver<EngineEvent>;

/// Create a new engine event channel.
///
/// Multiple publishers can be cloned from the returned publisher; each call
/// to `subscribe` yields an independent receiver.
pub fn engine_event_channel() -> (EventPublisher, EngineEventReceiver) {
    let (tx, rx) = broadcast::channel(DEFAULT_EVENT_BUFFER);
    (EventPublisher { tx }, rx)
}

/// Publishing side of the engine event channel
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventPublisher {
    /// Publish an event. Succeeds even with no subscribers.
    pub fn publish(&self, event: EngineEvent) {
        // A send error only means nobody is listening right now
        let _ = self.tx.send(event);
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> EngineEventReceiver {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let (publisher, mut rx) = engine_event_channel();

        publisher.publish(EngineEvent::DepositExpired {
            deposit_id: "dep_1".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::DepositExpired { deposit_id } if deposit_id == "dep_1"));
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let (publisher, rx) = engine_event_channel();
        drop(rx);

        publisher.publish(EngineEvent::DepositExpired {
            deposit_id: "dep_2".to_string(),
        });
    }
}
