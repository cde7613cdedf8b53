//! Multi-owner wallet with a daily allowance
//!
//! A set of owners jointly controls the wallet. Transfers within the daily
//! allowance execute on one owner's word; everything else needs `required`
//! confirmations from current owners.
//!
//! # Example
//!
//! ```rust
//! use quorum_wallet::core::{Address, Operation, Transfer, WEI_PER_ETH};
//! use quorum_wallet::multisig::{LoggingSink, MultiSigEngine, MultisigConfig, SystemClock};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let [alice, bob, carol] = ["alice", "bob", "carol"].map(Address::from_label);
//! let shop = Address::from_label("shop");
//!
//! // 2-of-3 wallet with a 1 ETH daily allowance
//! let config = MultisigConfig::new(vec![alice, bob, carol], 2, WEI_PER_ETH, None)?;
//! let mut wallet =
//!     MultiSigEngine::new(&config, Box::new(LoggingSink::new()), Arc::new(SystemClock))?;
//! wallet.deposit(&alice, 3 * WEI_PER_ETH)?;
//!
//! // Above the allowance: recorded as pending
//! let receipt = wallet.submit(Operation::Transfer(Transfer::new(shop, 2 * WEI_PER_ETH)), &alice)?;
//! assert!(!receipt.executed);
//!
//! // Second confirmation executes it
//! assert!(wallet.confirm(&receipt.operation_id, &bob)?.executed);
//! # Ok(())
//! # }
//! ```

pub mod allowance;
pub mod engine;
pub mod events;
pub mod guard;
pub mod log;
pub mod registry;
pub mod sink;

pub use allowance::{DailyAllowance, WINDOW_HOURS};
pub use engine::{ConfirmReceipt, MultiSigEngine, SubmitReceipt, WalletError, WalletSnapshot};
pub use events::{EventJournal, RecordedEvent, WalletEvent, MAX_JOURNAL_EVENTS};
pub use guard::{ExecutionGuard, GuardError, GuardToken};
pub use self::log::{JoinOutcome, LogError, OperationLog, PendingOperation, PendingStatus};
pub use registry::{MultisigConfig, OwnerRegistry, RegistryError};
pub use sink::{Clock, LoggingSink, ManualClock, SystemClock, TransferError, TransferSink};
