//! Observable wallet events
//!
//! Every state change the wallet makes is described by a [`WalletEvent`].
//! The engine keeps the most recent ones in an [`EventJournal`] for audit
//! and monitoring collaborators, numbered so a reader can ask for what it
//! has not seen yet.

use crate::core::operation::{Operation, OperationKind};
use crate::core::types::{amount_serde, hex_bytes, Address, Amount, OperationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Events kept in the journal before the oldest are dropped
pub const MAX_JOURNAL_EVENTS: usize = 1000;

/// Something the wallet did
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    /// Value arrived
    Deposit {
        from: Address,
        #[serde(with = "amount_serde")]
        value: Amount,
    },
    /// An owner confirmed an operation
    Confirmation {
        owner: Address,
        operation: OperationId,
    },
    /// An owner withdrew a confirmation
    Revoke {
        owner: Address,
        operation: OperationId,
    },
    OwnerAdded {
        owner: Address,
    },
    OwnerRemoved {
        owner: Address,
    },
    OwnerChanged {
        old_owner: Address,
        new_owner: Address,
    },
    RequirementChanged {
        required: usize,
    },
    DailyLimitChanged {
        #[serde(with = "amount_serde")]
        limit: Amount,
    },
    SpentReset,
    /// A transfer executed on one owner's word, within the allowance
    SingleTransact {
        owner: Address,
        to: Address,
        #[serde(with = "amount_serde")]
        value: Amount,
        #[serde(default, with = "hex_bytes")]
        data: Vec<u8>,
    },
    /// A transfer executed after reaching quorum
    MultiTransact {
        owner: Address,
        operation: OperationId,
        to: Address,
        #[serde(with = "amount_serde")]
        value: Amount,
        #[serde(default, with = "hex_bytes")]
        data: Vec<u8>,
    },
    /// An operation became pending for the first time
    ConfirmationNeeded {
        operation: OperationId,
        initiator: Address,
        kind: OperationKind,
        intent: Operation,
    },
}

impl WalletEvent {
    /// Short name, matching the JSON tag
    pub fn name(&self) -> &'static str {
        match self {
            WalletEvent::Deposit { .. } => "Deposit",
            WalletEvent::Confirmation { .. } => "Confirmation",
            WalletEvent::Revoke { .. } => "Revoke",
            WalletEvent::OwnerAdded { .. } => "OwnerAdded",
            WalletEvent::OwnerRemoved { .. } => "OwnerRemoved",
            WalletEvent::OwnerChanged { .. } => "OwnerChanged",
            WalletEvent::RequirementChanged { .. } => "RequirementChanged",
            WalletEvent::DailyLimitChanged { .. } => "DailyLimitChanged",
            WalletEvent::SpentReset => "SpentReset",
            WalletEvent::SingleTransact { .. } => "SingleTransact",
            WalletEvent::MultiTransact { .. } => "MultiTransact",
            WalletEvent::ConfirmationNeeded { .. } => "ConfirmationNeeded",
        }
    }
}

/// An event with its position in the journal
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecordedEvent {
    /// Monotonic sequence number, starting at 0
    pub seq: u64,
    /// When the event was recorded
    pub at: DateTime<Utc>,
    pub event: WalletEvent,
}

/// Bounded, sequence-numbered event history
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventJournal {
    events: VecDeque<RecordedEvent>,
    next_seq: u64,
    #[serde(default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    MAX_JOURNAL_EVENTS
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::with_capacity(MAX_JOURNAL_EVENTS)
    }
}

impl EventJournal {
    /// Create a journal that keeps at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_seq: 0,
            capacity: capacity.max(1),
        }
    }

    /// Append an event, dropping the oldest when full
    pub fn record(&mut self, event: WalletEvent, at: DateTime<Utc>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(RecordedEvent { seq, at, event });
        seq
    }

    /// Sequence number the next event will get
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Events with `seq >= from`, oldest first
    pub fn since(&self, from: u64) -> Vec<RecordedEvent> {
        self.events
            .iter()
            .filter(|e| e.seq >= from)
            .cloned()
            .collect()
    }

    /// All retained events, oldest first
    pub fn all(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.events.iter()
    }

    /// Most recent event
    pub fn last(&self) -> Option<&RecordedEvent> {
        self.events.back()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
