//! External collaborators of the engine
//!
//! - [`TransferSink`]: delivers value leaving the wallet
//! - [`Clock`]: source of the current time for allowance windows

use crate::core::operation::Transfer;
use crate::core::types::format_amount;
use crate::multisig::engine::MultiSigEngine;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Delivery failures reported by a sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Recipient rejected the transfer: {0}")]
    Rejected(String),
    #[error("Transfer sink unavailable")]
    Unavailable,
}

/// Delivers value to a recipient
///
/// `deliver` receives the wallet itself because a recipient may call back
/// into it before returning. Any mutating entry point reached that way is
/// rejected by the execution guard; read-only queries are allowed.
///
/// Sinks are trusted in-process code. The guard only covers the wallet's
/// entry points: a sink that writes to the engine by other means (for
/// example `std::mem::replace` on the whole value) is not stopped by it.
/// Untrusted recipients belong behind a sink that never hands them the
/// wallet reference.
pub trait TransferSink: Send + Sync {
    fn deliver(
        &mut self,
        wallet: &mut MultiSigEngine,
        transfer: &Transfer,
    ) -> Result<(), TransferError>;
}

/// Sink that records deliveries in the log and always succeeds
///
/// Used by the CLI and the API server, where settlement happens outside the
/// process.
#[derive(Debug, Default)]
pub struct LoggingSink {
    delivered: u64,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries made through this sink
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl TransferSink for LoggingSink {
    fn deliver(
        &mut self,
        _wallet: &mut MultiSigEngine,
        transfer: &Transfer,
    ) -> Result<(), TransferError> {
        self.delivered += 1;
        log::info!(
            "Delivered {} to {} ({} bytes of data)",
            format_amount(transfer.value),
            transfer.to,
            transfer.data.len()
        );
        Ok(())
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven time, shared between clones
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump to a point in time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
