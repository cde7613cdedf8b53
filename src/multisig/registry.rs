//! Owner registry
//!
//! The set of addresses allowed to propose and confirm operations, plus the
//! quorum size. Pure data and invariant checks, no I/O.

use crate::core::types::{amount_serde, format_amount, Address, Amount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to owner registry changes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate owner: {0}")]
    DuplicateOwner(Address),
    #[error("Not an owner: {0}")]
    NotAnOwner(Address),
    #[error("The null address cannot be an owner")]
    NullOwner,
    #[error("Removing an owner would leave {remaining} owners for a requirement of {required}")]
    WouldBreakQuorum { remaining: usize, required: usize },
    #[error("Invalid requirement {required}: must be between 1 and {owners}")]
    InvalidRequirement { required: usize, owners: usize },
    #[error("A wallet needs at least one owner")]
    NoOwners,
}

/// Genesis configuration for a wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MultisigConfig {
    /// Initial owners
    pub owners: Vec<Address>,
    /// Confirmations required for quorum-path operations
    pub required: usize,
    /// Value that may leave the wallet per 24h window without quorum
    #[serde(with = "amount_serde")]
    pub daily_limit: Amount,
    /// Optional human-readable label
    pub label: Option<String>,
}

impl MultisigConfig {
    /// Create a new wallet configuration
    ///
    /// # Errors
    /// Returns error if the owner list or requirement is invalid
    pub fn new(
        owners: Vec<Address>,
        required: usize,
        daily_limit: Amount,
        label: Option<String>,
    ) -> Result<Self, RegistryError> {
        // Validate by building the registry it describes
        OwnerRegistry::new(owners.clone(), required)?;

        Ok(Self {
            owners,
            required,
            daily_limit,
            label,
        })
    }

    /// Build the registry this configuration describes
    pub fn registry(&self) -> Result<OwnerRegistry, RegistryError> {
        OwnerRegistry::new(self.owners.clone(), self.required)
    }

    /// Get description like "2-of-3, 1 ETH/day"
    pub fn description(&self) -> String {
        format!(
            "{}-of-{}, {}/day",
            self.required,
            self.owners.len(),
            format_amount(self.daily_limit)
        )
    }
}

/// Registered owners and the quorum size
///
/// Invariants: `1 <= required <= owners.len()`, no duplicates, no null
/// address. Owners keep insertion order; a replaced owner keeps its slot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerRegistry {
    owners: Vec<Address>,
    required: usize,
}

impl OwnerRegistry {
    /// Create a registry, validating every invariant
    pub fn new(owners: Vec<Address>, required: usize) -> Result<Self, RegistryError> {
        if owners.is_empty() {
            return Err(RegistryError::NoOwners);
        }

        // Check for null and duplicate owners
        let mut sorted = owners.clone();
        sorted.sort();
        if sorted.iter().any(Address::is_zero) {
            return Err(RegistryError::NullOwner);
        }
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(RegistryError::DuplicateOwner(pair[0]));
            }
        }

        Self::validate_required(required, owners.len())?;

        Ok(Self { owners, required })
    }

    fn validate_required(required: usize, owners: usize) -> Result<(), RegistryError> {
        if required == 0 || required > owners {
            return Err(RegistryError::InvalidRequirement { required, owners });
        }
        Ok(())
    }

    /// Check if an address is a registered owner
    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }

    /// Registered owners in slot order
    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    /// Number of owners
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    /// Confirmations required for quorum
    pub fn required(&self) -> usize {
        self.required
    }

    /// Validate an addition without applying it
    pub fn check_add(&self, owner: &Address) -> Result<(), RegistryError> {
        if owner.is_zero() {
            return Err(RegistryError::NullOwner);
        }
        if self.is_owner(owner) {
            return Err(RegistryError::DuplicateOwner(*owner));
        }
        Ok(())
    }

    /// Validate a removal without applying it
    pub fn check_remove(&self, owner: &Address) -> Result<(), RegistryError> {
        if !self.is_owner(owner) {
            return Err(RegistryError::NotAnOwner(*owner));
        }
        let remaining = self.owners.len() - 1;
        if remaining < self.required {
            return Err(RegistryError::WouldBreakQuorum {
                remaining,
                required: self.required,
            });
        }
        Ok(())
    }

    /// Validate a replacement without applying it
    pub fn check_change(&self, from: &Address, to: &Address) -> Result<(), RegistryError> {
        if !self.is_owner(from) {
            return Err(RegistryError::NotAnOwner(*from));
        }
        self.check_add(to)
    }

    /// Validate a requirement change without applying it
    pub fn check_required(&self, required: usize) -> Result<(), RegistryError> {
        Self::validate_required(required, self.owners.len())
    }

    /// Add an owner
    pub fn add_owner(&mut self, owner: Address) -> Result<(), RegistryError> {
        self.check_add(&owner)?;
        self.owners.push(owner);
        Ok(())
    }

    /// Remove an owner
    ///
    /// Confirmations the owner already gave are not swept here; they stop
    /// counting because tallies only consider current owners.
    pub fn remove_owner(&mut self, owner: &Address) -> Result<(), RegistryError> {
        self.check_remove(owner)?;
        self.owners.retain(|o| o != owner);
        Ok(())
    }

    /// Replace `from` by `to` in place
    pub fn change_owner(&mut self, from: &Address, to: Address) -> Result<(), RegistryError> {
        self.check_change(from, &to)?;
        if let Some(slot) = self.owners.iter_mut().find(|o| *o == from) {
            *slot = to;
        }
        Ok(())
    }

    /// Change the quorum size
    pub fn set_required(&mut self, required: usize) -> Result<(), RegistryError> {
        self.check_required(required)?;
        self.required = required;
        Ok(())
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.required, self.owners.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owners() -> Vec<Address> {
        ["alice", "bob", "carol"]
            .iter()
            .map(|l| Address::from_label(l))
            .collect()
    }

    #[test]
    fn test_registry_creation() {
        let registry = OwnerRegistry::new(owners(), 2).unwrap();

        assert_eq!(registry.required(), 2);
        assert_eq!(registry.owner_count(), 3);
        assert_eq!(registry.description(), "2-of-3");
        assert!(registry.is_owner(&owners()[1]));
        assert!(!registry.is_owner(&Address::from_label("mallory")));
    }

    #[test]
    fn test_registry_validation() {
        // Zero requirement
        assert!(matches!(
            OwnerRegistry::new(owners(), 0),
            Err(RegistryError::InvalidRequirement { .. })
        ));

        // Requirement > owners
        assert!(matches!(
            OwnerRegistry::new(owners(), 4),
            Err(RegistryError::InvalidRequirement { required: 4, owners: 3 })
        ));

        // No owners
        assert_eq!(OwnerRegistry::new(vec![], 1), Err(RegistryError::NoOwners));

        // Duplicate owners
        let alice = Address::from_label("alice");
        assert_eq!(
            OwnerRegistry::new(vec![alice, alice], 1),
            Err(RegistryError::DuplicateOwner(alice))
        );

        // Null owner
        assert_eq!(
            OwnerRegistry::new(vec![alice, Address::ZERO], 1),
            Err(RegistryError::NullOwner)
        );

        // A single owner is fine
        assert!(OwnerRegistry::new(vec![alice], 1).is_ok());
    }

    #[test]
    fn test_add_owner() {
        let mut registry = OwnerRegistry::new(owners(), 2).unwrap();
        let dave = Address::from_label("dave");

        registry.add_owner(dave).unwrap();
        assert_eq!(registry.owners().last(), Some(&dave));

        assert_eq!(
            registry.add_owner(dave),
            Err(RegistryError::DuplicateOwner(dave))
        );
        assert_eq!(
            registry.add_owner(Address::ZERO),
            Err(RegistryError::NullOwner)
        );
        assert_eq!(registry.owner_count(), 4);
    }

    #[test]
    fn test_remove_owner_respects_quorum_floor() {
        let mut registry = OwnerRegistry::new(owners(), 2).unwrap();
        let all = owners();

        registry.remove_owner(&all[2]).unwrap();
        assert_eq!(registry.owners(), &all[..2]);

        // 2 owners, required 2: removing another would leave 1 < 2
        let before = registry.clone();
        assert_eq!(
            registry.remove_owner(&all[0]),
            Err(RegistryError::WouldBreakQuorum {
                remaining: 1,
                required: 2
            })
        );
        assert_eq!(registry, before);

        assert_eq!(
            registry.remove_owner(&all[2]),
            Err(RegistryError::NotAnOwner(all[2]))
        );
    }

    #[test]
    fn test_change_owner_keeps_slot() {
        let mut registry = OwnerRegistry::new(owners(), 2).unwrap();
        let all = owners();
        let dave = Address::from_label("dave");

        registry.change_owner(&all[1], dave).unwrap();
        assert_eq!(registry.owners(), &[all[0], dave, all[2]]);

        assert_eq!(
            registry.change_owner(&all[1], Address::from_label("erin")),
            Err(RegistryError::NotAnOwner(all[1]))
        );
        assert_eq!(
            registry.change_owner(&all[0], dave),
            Err(RegistryError::DuplicateOwner(dave))
        );
        assert_eq!(registry.owners(), &[all[0], dave, all[2]]);
    }

    #[test]
    fn test_set_required() {
        let mut registry = OwnerRegistry::new(owners(), 2).unwrap();

        registry.set_required(3).unwrap();
        assert_eq!(registry.required(), 3);
        assert!(registry.set_required(0).is_err());
        assert!(registry.set_required(4).is_err());
        assert_eq!(registry.required(), 3);
    }

    #[test]
    fn test_config_description() {
        let config = MultisigConfig::new(
            owners(),
            2,
            crate::core::types::WEI_PER_ETH,
            Some("Treasury".to_string()),
        )
        .unwrap();

        assert_eq!(config.description(), "2-of-3, 1 ETH/day");
        assert_eq!(config.registry().unwrap().required(), 2);
        assert!(MultisigConfig::new(owners(), 5, 0, None).is_err());
    }
}
