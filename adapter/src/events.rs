use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::{TransactionRecord, Wallet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "wallet.created")]
    WalletCreated,
    #[serde(rename = "transaction.pending")]
    TransactionPending,
    #[serde(rename = "transaction.success")]
    TransactionSuccess,
    #[serde(rename = "transaction.failed")]
    TransactionFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::WalletCreated => "wallet.created",
            EventType::TransactionPending => "transaction.pending",
            EventType::TransactionSuccess => "transaction.success",
            EventType::TransactionFailed => "transaction.failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Transaction(TransactionRecord),
    Wallet(Wallet),
}

/// One lifecycle transition, as handed to the event sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventPayload,
}

impl LifecycleEvent {
    pub fn transaction(&self) -> Option<&TransactionRecord> {
        match &self.data {
            EventPayload::Transaction(record) => Some(record),
            EventPayload::Wallet(_) => None,
        }
    }
}

/// Receives lifecycle events. Delivery is the sink's concern.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

impl<F> EventSink for F
where
    F: Fn(LifecycleEvent) + Send + Sync,
{
    fn emit(&self, event: LifecycleEvent) {
        self(event)
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

/// Builds normalized lifecycle events stamped with the current UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    pub fn wallet_created(&self, wallet: &Wallet) -> LifecycleEvent {
        Self::event(EventType::WalletCreated, EventPayload::Wallet(wallet.clone()))
    }

    pub fn transaction_pending(&self, record: &TransactionRecord) -> LifecycleEvent {
        Self::event(
            EventType::TransactionPending,
            EventPayload::Transaction(record.clone()),
        )
    }

    pub fn transaction_success(&self, record: &TransactionRecord) -> LifecycleEvent {
        Self::event(
            EventType::TransactionSuccess,
            EventPayload::Transaction(record.clone()),
        )
    }

    pub fn transaction_failed(&self, record: &TransactionRecord) -> LifecycleEvent {
        Self::event(
            EventType::TransactionFailed,
            EventPayload::Transaction(record.clone()),
        )
    }

    pub fn for_outcome(&self, record: &TransactionRecord, successful: bool) -> LifecycleEvent {
        if successful {
            self.transaction_success(record)
        } else {
            self.transaction_failed(record)
        }
    }

    fn event(event_type: EventType, data: EventPayload) -> LifecycleEvent {
        LifecycleEvent {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }
}
