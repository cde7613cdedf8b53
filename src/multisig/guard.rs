//! Re-entrancy guard
//!
//! Wraps the external value-transfer effect. While the effect runs, any
//! attempt to enter the wallet again fails fast with
//! [`GuardError::ReentrantCall`] instead of being queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Guard errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardError {
    #[error("Re-entrant call rejected while an external effect is running")]
    ReentrantCall,
}

/// Single "currently executing" flag
///
/// The flag lives behind an `Arc` so the token returned by
/// [`ExecutionGuard::enter`] owns its own handle and does not borrow the
/// wallet while the effect runs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    executing: Arc<AtomicBool>,
}

/// Held while an effect runs; clears the flag when dropped
#[derive(Debug)]
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct GuardToken {
    executing: Arc<AtomicBool>,
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.executing.store(false, Ordering::Release);
    }
}

impl ExecutionGuard {
    /// Create a released guard
    pub fn new() -> Self {
        Self {
            executing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether an effect is currently running
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// Fail if an effect is running, without taking the guard
    pub fn check(&self) -> Result<(), GuardError> {
        if self.is_executing() {
            Err(GuardError::ReentrantCall)
        } else {
            Ok(())
        }
    }

    /// Take the guard
    ///
    /// The flag is cleared when the returned token drops, on every exit path
    /// including early returns and unwinding.
    pub fn enter(&self) -> Result<GuardToken, GuardError> {
        self.executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GuardError::ReentrantCall)?;

        Ok(GuardToken {
            executing: Arc::clone(&self.executing),
        })
    }

    /// Run `effect` under the guard
    pub fn run<T, E, F>(&self, effect: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<GuardError>,
    {
        let _token = self.enter()?;
        effect()
    }
}
