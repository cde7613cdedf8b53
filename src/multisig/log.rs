//! Pending operation log
//!
//! Maps operation ids to operations awaiting confirmations. A confirmation
//! only counts while its owner is still registered; tallies are computed
//! against the registry at the moment they are asked for.

use crate::core::operation::Operation;
use crate::core::types::{Address, OperationId};
use crate::multisig::registry::OwnerRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors raised by the operation log
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("Not an owner: {0}")]
    UnknownOwner(Address),
    #[error("No such operation: {0}")]
    NoSuchOperation(OperationId),
}

/// State of a recorded operation
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PendingStatus {
    /// Waiting for more confirmations
    AwaitingConfirmations,
    /// Every confirmation was revoked; revivable by a new confirmation
    Abandoned,
}

/// An operation awaiting quorum
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PendingOperation {
    /// Deterministic operation id
    pub id: OperationId,
    /// The intent being confirmed
    pub operation: Operation,
    /// Owners who confirmed, including any since removed from the registry
    pub confirmed_by: BTreeSet<Address>,
    /// Owner who first proposed it
    pub proposer: Address,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When confirmations last changed
    pub updated_at: DateTime<Utc>,
}

impl PendingOperation {
    fn new(id: OperationId, operation: Operation, proposer: Address, now: DateTime<Utc>) -> Self {
        let mut confirmed_by = BTreeSet::new();
        confirmed_by.insert(proposer);

        Self {
            id,
            operation,
            confirmed_by,
            proposer,
            created_at: now,
            updated_at: now,
        }
    }

    /// Confirmations from addresses that are still owners
    pub fn tally(&self, registry: &OwnerRegistry) -> usize {
        self.confirmed_by
            .iter()
            .filter(|owner| registry.is_owner(owner))
            .count()
    }

    /// Current owners who confirmed
    pub fn confirmers<'a>(&'a self, registry: &'a OwnerRegistry) -> Vec<&'a Address> {
        self.confirmed_by
            .iter()
            .filter(|owner| registry.is_owner(owner))
            .collect()
    }

    /// Current status
    pub fn status(&self, registry: &OwnerRegistry) -> PendingStatus {
        if self.tally(registry) == 0 {
            PendingStatus::Abandoned
        } else {
            PendingStatus::AwaitingConfirmations
        }
    }
}

/// What a join did to the log
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The operation was not recorded before
    pub created: bool,
    /// The caller's confirmation was not recorded before
    pub newly_confirmed: bool,
}

/// Pending operations by id
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OperationLog {
    pending: HashMap<OperationId, PendingOperation>,
}

impl OperationLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    fn ensure_owner(registry: &OwnerRegistry, owner: &Address) -> Result<(), LogError> {
        if registry.is_owner(owner) {
            Ok(())
        } else {
            Err(LogError::UnknownOwner(*owner))
        }
    }

    /// Record a proposal, or join an existing one with the same id
    ///
    /// Re-adding an existing confirmer is a silent no-op.
    pub fn propose_or_join(
        &mut self,
        id: OperationId,
        operation: Operation,
        proposer: &Address,
        registry: &OwnerRegistry,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, LogError> {
        Self::ensure_owner(registry, proposer)?;

        match self.pending.get_mut(&id) {
            Some(pending) => {
                let newly_confirmed = pending.confirmed_by.insert(*proposer);
                if newly_confirmed {
                    pending.updated_at = now;
                }
                Ok(JoinOutcome {
                    created: false,
                    newly_confirmed,
                })
            }
            None => {
                self.pending
                    .insert(id, PendingOperation::new(id, operation, *proposer, now));
                Ok(JoinOutcome {
                    created: true,
                    newly_confirmed: true,
                })
            }
        }
    }

    /// Confirm an existing operation
    ///
    /// Returns whether the confirmation is new.
    pub fn confirm(
        &mut self,
        id: &OperationId,
        owner: &Address,
        registry: &OwnerRegistry,
        now: DateTime<Utc>,
    ) -> Result<bool, LogError> {
        Self::ensure_owner(registry, owner)?;

        let pending = self
            .pending
            .get_mut(id)
            .ok_or(LogError::NoSuchOperation(*id))?;

        let newly_confirmed = pending.confirmed_by.insert(*owner);
        if newly_confirmed {
            pending.updated_at = now;
        }
        Ok(newly_confirmed)
    }

    /// Withdraw a confirmation
    ///
    /// Returns whether a confirmation was actually removed; revoking without
    /// having confirmed is a silent no-op.
    pub fn revoke(
        &mut self,
        id: &OperationId,
        owner: &Address,
        registry: &OwnerRegistry,
        now: DateTime<Utc>,
    ) -> Result<bool, LogError> {
        Self::ensure_owner(registry, owner)?;

        let pending = self
            .pending
            .get_mut(id)
            .ok_or(LogError::NoSuchOperation(*id))?;

        let removed = pending.confirmed_by.remove(owner);
        if removed {
            pending.updated_at = now;
        }
        Ok(removed)
    }

    /// Confirmations from current owners
    pub fn tally(&self, id: &OperationId, registry: &OwnerRegistry) -> Result<usize, LogError> {
        self.pending
            .get(id)
            .map(|p| p.tally(registry))
            .ok_or(LogError::NoSuchOperation(*id))
    }

    /// Whether the current tally meets the requirement
    pub fn quorum_reached(&self, id: &OperationId, registry: &OwnerRegistry) -> bool {
        self.tally(id, registry)
            .map(|count| count >= registry.required())
            .unwrap_or(false)
    }

    /// Whether quorum would be met once `owner` has confirmed
    ///
    /// An unrecorded id counts as proposed by `owner` alone.
    pub fn would_reach_quorum(
        &self,
        id: &OperationId,
        owner: &Address,
        registry: &OwnerRegistry,
    ) -> bool {
        if !registry.is_owner(owner) {
            return false;
        }

        let tally = match self.pending.get(id) {
            Some(pending) if pending.confirmed_by.contains(owner) => pending.tally(registry),
            Some(pending) => pending.tally(registry) + 1,
            None => 1,
        };
        tally >= registry.required()
    }

    /// Whether `owner` confirmed and still counts
    pub fn has_confirmed(&self, id: &OperationId, owner: &Address, registry: &OwnerRegistry) -> bool {
        registry.is_owner(owner)
            && self
                .pending
                .get(id)
                .is_some_and(|p| p.confirmed_by.contains(owner))
    }

    /// Drop stale confirmations of an address that is joining the registry
    pub fn forget_confirmer(&mut self, address: &Address) {
        for pending in self.pending.values_mut() {
            pending.confirmed_by.remove(address);
        }
    }

    /// Purge an operation after execution
    pub fn remove(&mut self, id: &OperationId) -> Option<PendingOperation> {
        self.pending.remove(id)
    }

    /// Get a pending operation by id
    pub fn get(&self, id: &OperationId) -> Option<&PendingOperation> {
        self.pending.get(id)
    }

    /// Whether an id is recorded
    pub fn contains(&self, id: &OperationId) -> bool {
        self.pending.contains_key(id)
    }

    /// All recorded operations, oldest first
    pub fn pending(&self) -> Vec<&PendingOperation> {
        let mut list: Vec<&PendingOperation> = self.pending.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }

    /// Number of recorded operations
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
