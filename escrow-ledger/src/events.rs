//! Lifecycle notifications
//!
//! An append-only, totally ordered log of everything the engine committed.
//! Observers either read the log or subscribe to the broadcast fan-out;
//! publishing never blocks and never fails the operation that emitted it.

use crate::types::{Amount, DealId, Identity, PaymentMethod, Rail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notification payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowEvent {
    /// A seller listed a deal and paid their half of the commission
    DealCreated {
        /// Deal ID
        deal_id: DealId,
        /// Creator of the deal
        seller: Identity,
        /// Price excluding commission
        product_cost: Amount,
        /// Total commission
        commission_amount: Amount,
        /// Commission paid by each side
        individual_commission_amount: Amount,
        /// Settlement rail
        payment_method: PaymentMethod,
    },

    /// A buyer funded a deal
    DealPaid {
        /// Deal ID
        deal_id: DealId,
        /// Funding identity
        buyer: Identity,
        /// Product cost plus the buyer's commission half
        total_payment: Amount,
        /// Settlement rail
        payment_method: PaymentMethod,
    },

    /// The buyer confirmed and escrow moved to the seller
    PaymentReleased {
        /// Deal ID
        deal_id: DealId,
        /// Recipient of the escrowed funds
        seller: Identity,
        /// Confirming buyer
        buyer: Identity,
        /// Amount released
        amount: Amount,
        /// Settlement rail
        payment_method: PaymentMethod,
    },

    /// The commission wallet changed
    CommissionWalletUpdated {
        /// Wallet before the change
        previous: Identity,
        /// Wallet after the change
        current: Identity,
    },

    /// The commission rate changed
    CommissionRateUpdated {
        /// Rate before the change (basis points)
        previous_bps: u16,
        /// Rate after the change (basis points)
        current_bps: u16,
    },

    /// Administrative ownership moved
    OwnershipTransferred {
        /// Owner before the change
        previous: Identity,
        /// Owner after the change
        current: Identity,
    },

    /// A commission pool was paid out
    CommissionWithdrawn {
        /// Pool that was emptied
        rail: Rail,
        /// Receiving wallet
        wallet: Identity,
        /// Amount paid out
        amount: Amount,
    },
}

impl EscrowEvent {
    /// Event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EscrowEvent::DealCreated { .. } => "DealCreated",
            EscrowEvent::DealPaid { .. } => "DealPaid",
            EscrowEvent::PaymentReleased { .. } => "PaymentReleased",
            EscrowEvent::CommissionWalletUpdated { .. } => "CommissionWalletUpdated",
            EscrowEvent::CommissionRateUpdated { .. } => "CommissionRateUpdated",
            EscrowEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
            EscrowEvent::CommissionWithdrawn { .. } => "CommissionWithdrawn",
        }
    }

    /// Deal the event refers to, if any
    pub fn deal_id(&self) -> Option<DealId> {
        match self {
            EscrowEvent::DealCreated { deal_id, .. }
            | EscrowEvent::DealPaid { deal_id, .. }
            | EscrowEvent::PaymentReleased { deal_id, .. } => Some(*deal_id),
            _ => None,
        }
    }
}

/// A published notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log (dense from 0)
    pub sequence: u64,

    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Publication timestamp
    pub recorded_at: DateTime<Utc>,

    /// Payload
    pub event: EscrowEvent,
}

impl EventRecord {
    /// JSON form for off-engine consumers
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Append-only notification log
#[derive(Debug)]
pub struct EventLog {
    records: Vec<EventRecord>,
    sender: broadcast::Sender<EventRecord>,
}

impl EventLog {
    /// Create log whose subscribers buffer up to `capacity` records
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Vec::new(),
            sender,
        }
    }

    /// Append and fan out one notification
    pub fn publish(&mut self, event: EscrowEvent) -> &EventRecord {
        let record = EventRecord {
            sequence: self.records.len() as u64,
            event_id: Uuid::now_v7(),
            recorded_at: Utc::now(),
            event,
        };

        tracing::debug!(
            sequence = record.sequence,
            event = record.event.name(),
            "Event published"
        );

        // No subscribers is fine
        let _ = self.sender.send(record.clone());

        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Receive every record published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Full log in publication order
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `sequence >= from`
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = (from as usize).min(self.records.len());
        &self.records[start..]
    }

    /// Number of published records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True before the first publication
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_update(current: &str) -> EscrowEvent {
        EscrowEvent::CommissionWalletUpdated {
            previous: Identity::new("old"),
            current: Identity::new(current),
        }
    }

    #[test]
    fn test_sequence_is_dense() {
        let mut log = EventLog::default();
        log.publish(wallet_update("a"));
        log.publish(wallet_update("b"));
        log.publish(wallet_update("c"));

        let sequences: Vec<u64> = log.records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(log.since(1).len(), 2);
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn test_subscriber_sees_publications() {
        let mut log = EventLog::new(8);
        let mut rx = log.subscribe();

        log.publish(wallet_update("a"));

        let record = rx.try_recv().unwrap();
        assert_eq!(record.sequence, 0);
        assert_eq!(record.event, wallet_update("a"));
    }

    #[test]
    fn test_deal_id_extraction() {
        let event = EscrowEvent::DealPaid {
            deal_id: DealId(4),
            buyer: Identity::new("bob"),
            total_payment: 1012,
            payment_method: PaymentMethod::NativeValue,
        };
        assert_eq!(event.deal_id(), Some(DealId(4)));
        assert_eq!(wallet_update("a").deal_id(), None);
    }

    #[test]
    fn test_json_shape() {
        let mut log = EventLog::default();
        let record = log
            .publish(EscrowEvent::CommissionRateUpdated {
                previous_bps: 250,
                current_bps: 300,
            })
            .clone();

        let json = record.to_json().unwrap();
        assert!(json.contains("\"commission_rate_updated\""));
        assert!(json.contains("\"current_bps\":300"));
    }
}
