//! Quorum Wallet: a multi-owner wallet engine in Rust
//!
//! This crate provides a wallet jointly controlled by a set of owners:
//! - Owner registry with an M-of-N confirmation requirement
//! - Pending operations identified by a deterministic hash of their intent
//! - Single-signer transfers within a rolling 24-hour allowance
//! - At-most-once execution behind a re-entrancy guard
//! - Event journal, JSON persistence with backups, CLI and REST API
//!
//! # Example
//!
//! ```rust
//! use quorum_wallet::core::{Address, Operation, Transfer, WEI_PER_ETH};
//! use quorum_wallet::multisig::{LoggingSink, MultiSigEngine, MultisigConfig, SystemClock};
//! use std::sync::Arc;
//!
//! let alice = Address::from_label("alice");
//! let bob = Address::from_label("bob");
//!
//! // 2-of-2 wallet with a 1 ETH daily allowance
//! let config = MultisigConfig::new(vec![alice, bob], 2, WEI_PER_ETH, None).unwrap();
//! let mut wallet =
//!     MultiSigEngine::new(&config, Box::new(LoggingSink::new()), Arc::new(SystemClock)).unwrap();
//! wallet.deposit(&alice, 5 * WEI_PER_ETH).unwrap();
//!
//! // Within the allowance: executes at once
//! let shop = Address::from_label("shop");
//! let small = Operation::Transfer(Transfer::new(shop, WEI_PER_ETH / 2));
//! assert!(wallet.submit(small, &alice).unwrap().executed);
//!
//! // Above it: needs both owners
//! let large = Operation::Transfer(Transfer::new(shop, 2 * WEI_PER_ETH));
//! let receipt = wallet.submit(large, &alice).unwrap();
//! assert!(!receipt.executed);
//! assert!(wallet.confirm(&receipt.operation_id, &bob).unwrap().executed);
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod multisig;
pub mod storage;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use crate::core::{Address, Amount, Operation, OperationId, Transfer};
pub use multisig::{MultiSigEngine, MultisigConfig, WalletError, WalletEvent};
pub use storage::Storage;
