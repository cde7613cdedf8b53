//! Wallet operations
//!
//! Every intent an owner can submit is one variant of [`Operation`]. The
//! payload is decoded once at the boundary (JSON or CLI arguments) and the
//! engine dispatches on the variant with an exhaustive `match`.

use crate::core::types::{amount_serde, format_amount, hex_bytes, Address, Amount, OperationId};
use crate::crypto::sha256_parts;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value transfer out of the wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Recipient
    pub to: Address,
    /// Value in the smallest unit
    #[serde(with = "amount_serde")]
    pub value: Amount,
    /// Opaque call payload forwarded to the recipient
    #[serde(default, with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl Transfer {
    /// Plain value transfer with no payload
    pub fn new(to: Address, value: Amount) -> Self {
        Self {
            to,
            value,
            data: Vec::new(),
        }
    }

    /// Attach a call payload
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }
}

/// An intent submitted by an owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Move value to an address
    Transfer(Transfer),
    /// Register a new owner
    AddOwner { owner: Address },
    /// Deregister an owner
    RemoveOwner { owner: Address },
    /// Replace one owner by another, keeping its slot
    ChangeOwner { from: Address, to: Address },
    /// Change the quorum size
    ChangeRequired { required: usize },
    /// Change the daily allowance
    ChangeAllowance {
        #[serde(with = "amount_serde")]
        limit: Amount,
    },
    /// Zero the amount spent in the current window
    ResetSpent,
}

/// Payload-free tag of an [`Operation`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transfer,
    AddOwner,
    RemoveOwner,
    ChangeOwner,
    ChangeRequired,
    ChangeAllowance,
    ResetSpent,
}

impl OperationKind {
    /// Stable tag byte used in operation ids
    pub fn tag(&self) -> u8 {
        match self {
            OperationKind::Transfer => 0x01,
            OperationKind::AddOwner => 0x02,
            OperationKind::RemoveOwner => 0x03,
            OperationKind::ChangeOwner => 0x04,
            OperationKind::ChangeRequired => 0x05,
            OperationKind::ChangeAllowance => 0x06,
            OperationKind::ResetSpent => 0x07,
        }
    }

    /// snake_case name, matching the JSON tag
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Transfer => "transfer",
            OperationKind::AddOwner => "add_owner",
            OperationKind::RemoveOwner => "remove_owner",
            OperationKind::ChangeOwner => "change_owner",
            OperationKind::ChangeRequired => "change_required",
            OperationKind::ChangeAllowance => "change_allowance",
            OperationKind::ResetSpent => "reset_spent",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    /// The variant tag
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Transfer(_) => OperationKind::Transfer,
            Operation::AddOwner { .. } => OperationKind::AddOwner,
            Operation::RemoveOwner { .. } => OperationKind::RemoveOwner,
            Operation::ChangeOwner { .. } => OperationKind::ChangeOwner,
            Operation::ChangeRequired { .. } => OperationKind::ChangeRequired,
            Operation::ChangeAllowance { .. } => OperationKind::ChangeAllowance,
            Operation::ResetSpent => OperationKind::ResetSpent,
        }
    }

    /// Whether this operation changes the wallet's own configuration
    pub fn is_config_change(&self) -> bool {
        !matches!(self, Operation::Transfer(_))
    }

    /// Deterministic id of this intent at a given generation
    ///
    /// `generation` counts how many times the identical intent has already
    /// executed, so a pending intent always maps to one id while an executed
    /// id is never handed out again.
    pub fn id(&self, generation: u64) -> OperationId {
        let tag = [self.kind().tag()];
        let generation = generation.to_be_bytes();

        let digest = match self {
            Operation::Transfer(t) => {
                let value = t.value.to_be_bytes();
                sha256_parts(&[&tag, t.to.as_bytes(), &value, &t.data, &generation])
            }
            Operation::AddOwner { owner } | Operation::RemoveOwner { owner } => {
                sha256_parts(&[&tag, owner.as_bytes(), &generation])
            }
            Operation::ChangeOwner { from, to } => {
                sha256_parts(&[&tag, from.as_bytes(), to.as_bytes(), &generation])
            }
            Operation::ChangeRequired { required } => {
                let required = (*required as u64).to_be_bytes();
                sha256_parts(&[&tag, &required, &generation])
            }
            Operation::ChangeAllowance { limit } => {
                let limit = limit.to_be_bytes();
                sha256_parts(&[&tag, &limit, &generation])
            }
            Operation::ResetSpent => sha256_parts(&[&tag, &generation]),
        };

        OperationId::from_bytes(digest)
    }

    /// Generation-independent key of this intent
    pub fn intent(&self) -> OperationId {
        self.id(0)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Transfer(t) if t.data.is_empty() => {
                write!(f, "transfer {} to {}", format_amount(t.value), t.to)
            }
            Operation::Transfer(t) => write!(
                f,
                "transfer {} to {} with {} bytes of data",
                format_amount(t.value),
                t.to,
                t.data.len()
            ),
            Operation::AddOwner { owner } => write!(f, "add owner {}", owner),
            Operation::RemoveOwner { owner } => write!(f, "remove owner {}", owner),
            Operation::ChangeOwner { from, to } => write!(f, "change owner {} -> {}", from, to),
            Operation::ChangeRequired { required } => write!(f, "change required to {}", required),
            Operation::ChangeAllowance { limit } => {
                write!(f, "change daily limit to {}", format_amount(*limit))
            }
            Operation::ResetSpent => f.write_str("reset spent today"),
        }
    }
}
