//! Multi-signature wallet engine
//!
//! Receives operation requests from owners and decides, per request, between
//! the single-signer path (a transfer covered by the daily allowance) and the
//! quorum path (everything else). Quorum-path operations wait in the
//! [`OperationLog`] until enough current owners confirmed, then execute once
//! and are purged.
//!
//! The engine is one logical actor: every entry point takes `&mut self` and
//! runs to completion. Transports that serve several callers put it behind a
//! single lock held for the whole call.

use crate::core::operation::{Operation, Transfer};
use crate::core::types::{amount_serde, format_amount, Address, Amount, OperationId};
use crate::multisig::allowance::DailyAllowance;
use crate::multisig::events::{EventJournal, RecordedEvent, WalletEvent};
use crate::multisig::guard::{ExecutionGuard, GuardError};
use crate::multisig::log::{LogError, OperationLog, PendingOperation};
use crate::multisig::registry::{MultisigConfig, OwnerRegistry, RegistryError};
use crate::multisig::sink::{Clock, TransferError, TransferSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Rejections returned by the engine
///
/// Every rejected call leaves the wallet exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Not an owner: {0}")]
    UnknownOwner(Address),
    #[error("No such operation: {0}")]
    NoSuchOperation(OperationId),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Re-entrant call rejected while an external effect is running")]
    ReentrantCall,
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: Amount, need: Amount },
    #[error("Balance overflow")]
    BalanceOverflow,
    #[error("Transfer failed: {0}")]
    TransferFailed(#[from] TransferError),
}

impl From<GuardError> for WalletError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::ReentrantCall => WalletError::ReentrantCall,
        }
    }
}

impl From<LogError> for WalletError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::UnknownOwner(owner) => WalletError::UnknownOwner(owner),
            LogError::NoSuchOperation(id) => WalletError::NoSuchOperation(id),
        }
    }
}

/// Result of [`MultiSigEngine::submit`]
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// The operation executed during this call
    pub executed: bool,
    /// Id the intent maps to; on the single-signer path nothing is recorded
    /// under it
    pub operation_id: OperationId,
}

/// Result of [`MultiSigEngine::confirm`]
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct ConfirmReceipt {
    /// The operation executed during this call
    pub executed: bool,
}

/// Persistable wallet state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub label: Option<String>,
    pub registry: OwnerRegistry,
    pub log: OperationLog,
    pub allowance: DailyAllowance,
    #[serde(with = "amount_serde")]
    pub balance: Amount,
    /// Executions so far per intent, keyed by the intent's generation-0 id
    #[serde(default)]
    pub generations: BTreeMap<OperationId, u64>,
    #[serde(default)]
    pub events: EventJournal,
    pub created_at: DateTime<Utc>,
}

impl WalletSnapshot {
    /// Re-check registry invariants of state read from outside
    pub fn validate(&self) -> Result<(), RegistryError> {
        OwnerRegistry::new(self.registry.owners().to_vec(), self.registry.required())?;
        Ok(())
    }
}

/// The wallet
pub struct MultiSigEngine {
    label: Option<String>,
    registry: OwnerRegistry,
    log: OperationLog,
    allowance: DailyAllowance,
    balance: Amount,
    generations: BTreeMap<OperationId, u64>,
    events: EventJournal,
    created_at: DateTime<Utc>,
    guard: ExecutionGuard,
    sink: Option<Box<dyn TransferSink>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MultiSigEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiSigEngine")
            .field("label", &self.label)
            .field("registry", &self.registry)
            .field("pending", &self.log.len())
            .field("allowance", &self.allowance)
            .field("balance", &self.balance)
            .field("executing", &self.guard.is_executing())
            .finish()
    }
}

impl MultiSigEngine {
    /// Create a wallet from its genesis configuration
    pub fn new(
        config: &MultisigConfig,
        sink: Box<dyn TransferSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        let registry = config.registry()?;
        let now = clock.now();

        log::info!(
            "Wallet created: {} ({})",
            config.label.as_deref().unwrap_or("unlabelled"),
            config.description()
        );

        Ok(Self {
            label: config.label.clone(),
            registry,
            log: OperationLog::new(),
            allowance: DailyAllowance::new(config.daily_limit, now),
            balance: 0,
            generations: BTreeMap::new(),
            events: EventJournal::default(),
            created_at: now,
            guard: ExecutionGuard::new(),
            sink: Some(sink),
            clock,
        })
    }

    /// Restore a wallet from persisted state
    pub fn from_snapshot(
        snapshot: WalletSnapshot,
        sink: Box<dyn TransferSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            label: snapshot.label,
            registry: snapshot.registry,
            log: snapshot.log,
            allowance: snapshot.allowance,
            balance: snapshot.balance,
            generations: snapshot.generations,
            events: snapshot.events,
            created_at: snapshot.created_at,
            guard: ExecutionGuard::new(),
            sink: Some(sink),
            clock,
        }
    }

    /// Capture persistable state
    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            label: self.label.clone(),
            registry: self.registry.clone(),
            log: self.log.clone(),
            allowance: self.allowance.clone(),
            balance: self.balance,
            generations: self.generations.clone(),
            events: self.events.clone(),
            created_at: self.created_at,
        }
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Submit an intent
    ///
    /// A transfer covered by the unspent allowance and the balance executes
    /// at once. Anything else is recorded (or joined) as a pending operation
    /// with the caller's confirmation, executing immediately only if that
    /// single confirmation already meets the requirement.
    pub fn submit(
        &mut self,
        operation: Operation,
        caller: &Address,
    ) -> Result<SubmitReceipt, WalletError> {
        let now = self.enter(caller)?;
        self.precheck(&operation)?;
        let id = self.operation_id(&operation);

        if let Operation::Transfer(transfer) = &operation {
            if self.try_single_transact(transfer, caller, now)? {
                return Ok(SubmitReceipt {
                    executed: true,
                    operation_id: id,
                });
            }
        }

        let executed = self.join(id, operation, caller, now)?;
        Ok(SubmitReceipt {
            executed,
            operation_id: id,
        })
    }

    /// Confirm a pending operation, executing it if quorum is reached
    pub fn confirm(
        &mut self,
        id: &OperationId,
        caller: &Address,
    ) -> Result<ConfirmReceipt, WalletError> {
        let now = self.enter(caller)?;
        let operation = self
            .log
            .get(id)
            .ok_or(WalletError::NoSuchOperation(*id))?
            .operation
            .clone();

        let executed = self.join(*id, operation, caller, now)?;
        Ok(ConfirmReceipt { executed })
    }

    /// Withdraw the caller's confirmation of a pending operation
    ///
    /// Revoking without having confirmed is a silent no-op.
    pub fn revoke(&mut self, id: &OperationId, caller: &Address) -> Result<(), WalletError> {
        let now = self.enter(caller)?;

        if self.log.revoke(id, caller, &self.registry, now)? {
            log::debug!("{} revoked confirmation of {}", caller, id.short());
            self.record(
                WalletEvent::Revoke {
                    owner: *caller,
                    operation: *id,
                },
                now,
            );
        }
        Ok(())
    }

    /// Credit value to the wallet
    ///
    /// Anyone may deposit. Zero-value deposits are ignored.
    pub fn deposit(&mut self, from: &Address, value: Amount) -> Result<(), WalletError> {
        self.guard.check()?;
        if value == 0 {
            return Ok(());
        }

        self.balance = self
            .balance
            .checked_add(value)
            .ok_or(WalletError::BalanceOverflow)?;

        log::info!("Deposit of {} from {}", format_amount(value), from);
        let now = self.clock.now();
        self.record(WalletEvent::Deposit { from: *from, value }, now);
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Common gate of the owner entry points
    fn enter(&self, caller: &Address) -> Result<DateTime<Utc>, WalletError> {
        self.guard.check()?;
        if !self.registry.is_owner(caller) {
            return Err(WalletError::UnknownOwner(*caller));
        }
        Ok(self.clock.now())
    }

    /// Reject configuration changes that could not apply right now
    fn precheck(&self, operation: &Operation) -> Result<(), WalletError> {
        match operation {
            Operation::AddOwner { owner } => self.registry.check_add(owner)?,
            Operation::RemoveOwner { owner } => self.registry.check_remove(owner)?,
            Operation::ChangeOwner { from, to } => self.registry.check_change(from, to)?,
            Operation::ChangeRequired { required } => self.registry.check_required(*required)?,
            Operation::Transfer(_) | Operation::ChangeAllowance { .. } | Operation::ResetSpent => {}
        }
        Ok(())
    }

    /// Single-signer path; `Ok(false)` means fall through to quorum
    fn try_single_transact(
        &mut self,
        transfer: &Transfer,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<bool, WalletError> {
        if transfer.value > self.balance {
            return Ok(false);
        }

        let allowance_before = self.allowance.clone();
        if !self.allowance.try_reserve(transfer.value, now) {
            // A lapsed window may have been rolled over; no spend happened
            self.allowance = allowance_before;
            return Ok(false);
        }

        if let Err(err) = self.execute_transfer(transfer) {
            self.allowance = allowance_before;
            return Err(err);
        }

        log::info!(
            "Single-signer transfer of {} to {} by {}",
            format_amount(transfer.value),
            transfer.to,
            caller
        );
        self.record(
            WalletEvent::SingleTransact {
                owner: *caller,
                to: transfer.to,
                value: transfer.value,
                data: transfer.data.clone(),
            },
            now,
        );
        Ok(true)
    }

    /// Add the caller's confirmation, executing first if it completes quorum
    ///
    /// Execution happens before anything is recorded, so a failed execution
    /// leaves the log untouched.
    fn join(
        &mut self,
        id: OperationId,
        operation: Operation,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<bool, WalletError> {
        if self.log.would_reach_quorum(&id, caller, &self.registry) {
            let newly_confirmed = !self
                .log
                .get(&id)
                .is_some_and(|p| p.confirmed_by.contains(caller));

            let effects = self.execute(&id, &operation, caller)?;
            self.log.remove(&id);
            *self.generations.entry(operation.intent()).or_insert(0) += 1;

            log::info!("Operation {} executed: {}", id.short(), operation);
            if newly_confirmed {
                self.record(
                    WalletEvent::Confirmation {
                        owner: *caller,
                        operation: id,
                    },
                    now,
                );
            }
            for event in effects {
                self.record(event, now);
            }
            return Ok(true);
        }

        let outcome =
            self.log
                .propose_or_join(id, operation.clone(), caller, &self.registry, now)?;

        if outcome.newly_confirmed {
            log::debug!("{} confirmed {}", caller, id.short());
            self.record(
                WalletEvent::Confirmation {
                    owner: *caller,
                    operation: id,
                },
                now,
            );
        }
        if outcome.created {
            log::info!(
                "Operation {} pending: {} (needs {} confirmations)",
                id.short(),
                operation,
                self.registry.required()
            );
            self.record(
                WalletEvent::ConfirmationNeeded {
                    operation: id,
                    initiator: *caller,
                    kind: operation.kind(),
                    intent: operation,
                },
                now,
            );
        }
        Ok(false)
    }

    /// Apply an operation; returns the events to publish on success
    fn execute(
        &mut self,
        id: &OperationId,
        operation: &Operation,
        initiator: &Address,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        let events = match operation {
            Operation::Transfer(transfer) => {
                self.execute_transfer(transfer)?;
                vec![WalletEvent::MultiTransact {
                    owner: *initiator,
                    operation: *id,
                    to: transfer.to,
                    value: transfer.value,
                    data: transfer.data.clone(),
                }]
            }
            Operation::AddOwner { owner } => {
                self.registry.add_owner(*owner)?;
                self.log.forget_confirmer(owner);
                vec![WalletEvent::OwnerAdded { owner: *owner }]
            }
            Operation::RemoveOwner { owner } => {
                self.registry.remove_owner(owner)?;
                vec![WalletEvent::OwnerRemoved { owner: *owner }]
            }
            Operation::ChangeOwner { from, to } => {
                self.registry.change_owner(from, *to)?;
                self.log.forget_confirmer(to);
                vec![WalletEvent::OwnerChanged {
                    old_owner: *from,
                    new_owner: *to,
                }]
            }
            Operation::ChangeRequired { required } => {
                self.registry.set_required(*required)?;
                vec![WalletEvent::RequirementChanged {
                    required: *required,
                }]
            }
            Operation::ChangeAllowance { limit } => {
                self.allowance.set_limit(*limit);
                vec![WalletEvent::DailyLimitChanged { limit: *limit }]
            }
            Operation::ResetSpent => {
                self.allowance.reset_spent();
                vec![WalletEvent::SpentReset]
            }
        };
        Ok(events)
    }

    /// Move value out through the sink, under the execution guard
    ///
    /// The balance is debited before the sink runs and credited back if the
    /// sink reports failure.
    fn execute_transfer(&mut self, transfer: &Transfer) -> Result<(), WalletError> {
        if transfer.value > self.balance {
            return Err(WalletError::InsufficientFunds {
                have: self.balance,
                need: transfer.value,
            });
        }

        let guard = self.guard.clone();
        guard.run(|| -> Result<(), WalletError> {
            let mut sink = self.sink.take().ok_or(TransferError::Unavailable)?;

            self.balance -= transfer.value;
            let outcome = sink.deliver(&mut *self, transfer);
            self.sink = Some(sink);

            if let Err(err) = outcome {
                self.balance = self.balance.saturating_add(transfer.value);
                log::warn!(
                    "Transfer of {} to {} failed: {}",
                    format_amount(transfer.value),
                    transfer.to,
                    err
                );
                return Err(err.into());
            }
            Ok(())
        })
    }

    fn record(&mut self, event: WalletEvent, at: DateTime<Utc>) {
        log::debug!("Event: {}", event.name());
        self.events.record(event, at);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Id a submission of `operation` would get now
    pub fn operation_id(&self, operation: &Operation) -> OperationId {
        let generation = self
            .generations
            .get(&operation.intent())
            .copied()
            .unwrap_or(0);
        operation.id(generation)
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.registry.is_owner(address)
    }

    pub fn owners(&self) -> &[Address] {
        self.registry.owners()
    }

    pub fn required(&self) -> usize {
        self.registry.required()
    }

    pub fn registry(&self) -> &OwnerRegistry {
        &self.registry
    }

    pub fn daily_limit(&self) -> Amount {
        self.allowance.limit()
    }

    /// Spent amount as of the last spend attempt
    pub fn spent_today(&self) -> Amount {
        self.allowance.spent()
    }

    /// What the single-signer path could still move right now
    pub fn remaining_today(&self) -> Amount {
        self.allowance.remaining(self.clock.now())
    }

    pub fn allowance(&self) -> &DailyAllowance {
        &self.allowance
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Recorded operations, oldest first
    pub fn pending_operations(&self) -> Vec<&PendingOperation> {
        self.log.pending()
    }

    pub fn operation(&self, id: &OperationId) -> Option<&PendingOperation> {
        self.log.get(id)
    }

    /// Whether `owner` confirmed `id` and still counts
    pub fn has_confirmed(&self, id: &OperationId, owner: &Address) -> bool {
        self.log.has_confirmed(id, owner, &self.registry)
    }

    /// Confirmations of `id` from current owners
    pub fn tally(&self, id: &OperationId) -> Result<usize, WalletError> {
        Ok(self.log.tally(id, &self.registry)?)
    }

    /// Whether an external effect is running
    pub fn is_executing(&self) -> bool {
        self.guard.is_executing()
    }

    /// Retained events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.events.all()
    }

    /// Events with sequence number `>= from`
    pub fn events_since(&self, from: u64) -> Vec<RecordedEvent> {
        self.events.since(from)
    }

    /// Sequence number the next event will get
    pub fn next_event_seq(&self) -> u64 {
        self.events.next_seq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::WEI_PER_ETH;
    use crate::multisig::log::PendingStatus;
    use crate::multisig::sink::ManualClock;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const ETH: Amount = WEI_PER_ETH;

    #[derive(Clone, Default)]
    struct Deliveries {
        made: Arc<Mutex<Vec<Transfer>>>,
        fail: Arc<AtomicBool>,
    }

    impl Deliveries {
        fn count(&self) -> usize {
            self.made.lock().unwrap().len()
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    struct RecordingSink(Deliveries);

    impl TransferSink for RecordingSink {
        fn deliver(
            &mut self,
            _wallet: &mut MultiSigEngine,
            transfer: &Transfer,
        ) -> Result<(), TransferError> {
            if self.0.fail.load(Ordering::SeqCst) {
                return Err(TransferError::Rejected("recipient reverted".to_string()));
            }
            self.0.made.lock().unwrap().push(transfer.clone());
            Ok(())
        }
    }

    /// Recipient whose receive hook calls straight back into the wallet
    struct ReentrantSink {
        owner: Address,
        deliveries: Deliveries,
        attempts: Arc<Mutex<Vec<WalletError>>>,
    }

    impl TransferSink for ReentrantSink {
        fn deliver(
            &mut self,
            wallet: &mut MultiSigEngine,
            transfer: &Transfer,
        ) -> Result<(), TransferError> {
            let again = Operation::Transfer(Transfer::new(transfer.to, transfer.value));
            let mut attempts = self.attempts.lock().unwrap();

            if let Err(e) = wallet.submit(again.clone(), &self.owner) {
                attempts.push(e);
            }
            let id = wallet.operation_id(&again);
            if let Err(e) = wallet.confirm(&id, &self.owner) {
                attempts.push(e);
            }
            if let Err(e) = wallet.revoke(&id, &self.owner) {
                attempts.push(e);
            }
            if let Err(e) = wallet.deposit(&self.owner, 1) {
                attempts.push(e);
            }

            // Reads stay available
            assert!(wallet.is_executing());
            assert!(wallet.is_owner(&self.owner));

            self.deliveries.made.lock().unwrap().push(transfer.clone());
            Ok(())
        }
    }

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn owners() -> [Address; 3] {
        [addr("alice"), addr("bob"), addr("carol")]
    }

    fn build(
        owners: &[Address],
        required: usize,
        sink: Box<dyn TransferSink>,
    ) -> (MultiSigEngine, ManualClock) {
        let clock = ManualClock::new(start());
        let config = MultisigConfig::new(owners.to_vec(), required, ETH, None).unwrap();
        let mut wallet = MultiSigEngine::new(&config, sink, Arc::new(clock.clone())).unwrap();
        wallet.deposit(&addr("funder"), 10 * ETH).unwrap();
        (wallet, clock)
    }

    /// 3 owners, required 2, limit 1 ETH, 10 ETH balance
    fn setup() -> (MultiSigEngine, ManualClock, Deliveries) {
        let deliveries = Deliveries::default();
        let (wallet, clock) = build(&owners(), 2, Box::new(RecordingSink(deliveries.clone())));
        (wallet, clock, deliveries)
    }

    fn transfer(to: &str, value: Amount) -> Operation {
        Operation::Transfer(Transfer::new(addr(to), value))
    }

    fn event_names(wallet: &MultiSigEngine, from: u64) -> Vec<&'static str> {
        wallet
            .events()
            .filter(|e| e.seq >= from)
            .map(|e| e.event.name())
            .collect()
    }

    #[test]
    fn test_small_transfer_executes_immediately() {
        let (mut wallet, _, deliveries) = setup();
        let [alice, _, _] = owners();

        let receipt = wallet.submit(transfer("shop", ETH / 2), &alice).unwrap();

        assert!(receipt.executed);
        assert_eq!(wallet.spent_today(), ETH / 2);
        assert_eq!(wallet.balance(), 10 * ETH - ETH / 2);
        assert_eq!(deliveries.count(), 1);
        assert!(wallet.pending_operations().is_empty());
        assert_eq!(
            wallet.events().last().unwrap().event.name(),
            "SingleTransact"
        );
    }

    #[test]
    fn test_large_transfer_needs_quorum() {
        let (mut wallet, _, deliveries) = setup();
        let [alice, bob, carol] = owners();
        let seq = wallet.next_event_seq();

        let receipt = wallet.submit(transfer("shop", 2 * ETH), &alice).unwrap();
        assert!(!receipt.executed);
        assert_eq!(wallet.spent_today(), 0);
        assert_eq!(deliveries.count(), 0);
        assert_eq!(
            event_names(&wallet, seq),
            vec!["Confirmation", "ConfirmationNeeded"]
        );

        let id = receipt.operation_id;
        assert!(wallet.has_confirmed(&id, &alice));
        assert_eq!(wallet.tally(&id).unwrap(), 1);

        let confirmed = wallet.confirm(&id, &bob).unwrap();
        assert!(confirmed.executed);
        assert_eq!(wallet.spent_today(), 0);
        assert_eq!(wallet.balance(), 8 * ETH);
        assert_eq!(deliveries.count(), 1);
        assert!(wallet.operation(&id).is_none());
        assert_eq!(
            event_names(&wallet, seq),
            vec![
                "Confirmation",
                "ConfirmationNeeded",
                "Confirmation",
                "MultiTransact"
            ]
        );

        assert_eq!(
            wallet.confirm(&id, &carol),
            Err(WalletError::NoSuchOperation(id))
        );
        assert_eq!(deliveries.count(), 1);
    }

    #[test]
    fn test_allowance_window_rolls_over() {
        let (mut wallet, clock, deliveries) = setup();
        let [alice, _, _] = owners();
        let nine_tenths = ETH * 9 / 10;

        assert!(wallet.submit(transfer("shop", nine_tenths), &alice).unwrap().executed);
        assert_eq!(wallet.spent_today(), nine_tenths);

        let second = wallet.submit(transfer("cafe", nine_tenths), &alice).unwrap();
        assert!(!second.executed);
        assert_eq!(wallet.spent_today(), nine_tenths);
        assert_eq!(wallet.pending_operations().len(), 1);

        clock.advance(Duration::hours(24));
        assert_eq!(wallet.remaining_today(), ETH);

        let third = wallet.submit(transfer("bakery", nine_tenths), &alice).unwrap();
        assert!(third.executed);
        assert_eq!(wallet.spent_today(), nine_tenths);
        assert_eq!(deliveries.count(), 2);
        // The earlier pending transfer is untouched
        assert!(wallet.operation(&second.operation_id).is_some());
    }

    #[test]
    fn test_remove_owner_then_quorum_floor() {
        let (mut wallet, _, _) = setup();
        let [alice, bob, carol] = owners();
        let seq = wallet.next_event_seq();

        let receipt = wallet
            .submit(Operation::RemoveOwner { owner: carol }, &alice)
            .unwrap();
        assert!(!receipt.executed);
        assert!(wallet.confirm(&receipt.operation_id, &bob).unwrap().executed);

        assert_eq!(wallet.owners(), &[alice, bob]);
        assert_eq!(wallet.required(), 2);
        assert!(event_names(&wallet, seq).contains(&"OwnerRemoved"));

        assert_eq!(
            wallet.submit(Operation::RemoveOwner { owner: bob }, &alice),
            Err(WalletError::Registry(RegistryError::WouldBreakQuorum {
                remaining: 1,
                required: 2
            }))
        );
        assert_eq!(wallet.owners(), &[alice, bob]);
        assert!(wallet.pending_operations().is_empty());
    }

    #[test]
    fn test_repeated_confirmation_is_idempotent() {
        let (mut wallet, _, _) = setup();
        let [alice, _, _] = owners();

        let receipt = wallet
            .submit(Operation::ChangeAllowance { limit: 2 * ETH }, &alice)
            .unwrap();
        let id = receipt.operation_id;
        let seq = wallet.next_event_seq();

        assert!(!wallet.confirm(&id, &alice).unwrap().executed);
        assert_eq!(wallet.tally(&id).unwrap(), 1);
        assert_eq!(wallet.next_event_seq(), seq);

        // Submitting the same intent again joins the same record
        let again = wallet
            .submit(Operation::ChangeAllowance { limit: 2 * ETH }, &alice)
            .unwrap();
        assert_eq!(again.operation_id, id);
        assert_eq!(wallet.pending_operations().len(), 1);
        assert_eq!(wallet.next_event_seq(), seq);
    }

    #[test]
    fn test_reentrant_recipient_is_rejected() {
        let deliveries = Deliveries::default();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let [alice, _, _] = owners();
        let sink = ReentrantSink {
            owner: alice,
            deliveries: deliveries.clone(),
            attempts: attempts.clone(),
        };
        let (mut wallet, _) = build(&owners(), 2, Box::new(sink));

        let receipt = wallet.submit(transfer("attacker", ETH / 2), &alice).unwrap();

        assert!(receipt.executed);
        assert_eq!(deliveries.count(), 1);
        assert_eq!(wallet.balance(), 10 * ETH - ETH / 2);
        assert_eq!(wallet.spent_today(), ETH / 2);
        assert!(wallet.pending_operations().is_empty());
        assert_eq!(
            *attempts.lock().unwrap(),
            vec![WalletError::ReentrantCall; 4]
        );

        // The guard is released afterwards
        assert!(!wallet.is_executing());
        assert!(wallet.submit(transfer("shop", ETH / 4), &alice).unwrap().executed);
        assert_eq!(deliveries.count(), 2);
    }

    #[test]
    fn test_non_owner_rejected_without_side_effects() {
        let (mut wallet, _, deliveries) = setup();
        let mallory = addr("mallory");
        let before = serde_json::to_string(&wallet.snapshot()).unwrap();

        assert_eq!(
            wallet.submit(transfer("mallory", ETH / 10), &mallory),
            Err(WalletError::UnknownOwner(mallory))
        );
        let id = transfer("mallory", ETH / 10).id(0);
        assert_eq!(
            wallet.confirm(&id, &mallory),
            Err(WalletError::UnknownOwner(mallory))
        );
        assert_eq!(
            wallet.revoke(&id, &mallory),
            Err(WalletError::UnknownOwner(mallory))
        );

        assert_eq!(serde_json::to_string(&wallet.snapshot()).unwrap(), before);
        assert_eq!(deliveries.count(), 0);
    }

    #[test]
    fn test_revoke_lifecycle() {
        let (mut wallet, _, _) = setup();
        let [alice, bob, carol] = owners();

        let id = wallet
            .submit(transfer("shop", 5 * ETH), &alice)
            .unwrap()
            .operation_id;

        // Bob never confirmed: silent no-op
        let seq = wallet.next_event_seq();
        wallet.revoke(&id, &bob).unwrap();
        assert_eq!(wallet.next_event_seq(), seq);

        wallet.revoke(&id, &alice).unwrap();
        assert_eq!(event_names(&wallet, seq), vec!["Revoke"]);
        assert_eq!(wallet.tally(&id).unwrap(), 0);
        assert_eq!(
            wallet.operation(&id).unwrap().status(wallet.registry()),
            PendingStatus::Abandoned
        );

        // Abandoned operations come back with new confirmations
        assert!(!wallet.confirm(&id, &bob).unwrap().executed);
        assert!(wallet.confirm(&id, &carol).unwrap().executed);
        assert_eq!(wallet.balance(), 5 * ETH);

        let unknown = OperationId::from_bytes([9u8; 32]);
        assert_eq!(
            wallet.revoke(&unknown, &alice),
            Err(WalletError::NoSuchOperation(unknown))
        );
    }

    #[test]
    fn test_removed_owner_confirmation_not_counted() {
        let (mut wallet, _, deliveries) = setup();
        let [alice, bob, carol] = owners();

        let payout = wallet
            .submit(transfer("vendor", 3 * ETH), &carol)
            .unwrap()
            .operation_id;
        assert!(wallet.has_confirmed(&payout, &carol));

        let removal = wallet
            .submit(Operation::RemoveOwner { owner: carol }, &alice)
            .unwrap()
            .operation_id;
        assert!(wallet.confirm(&removal, &bob).unwrap().executed);

        assert_eq!(wallet.tally(&payout).unwrap(), 0);
        assert!(!wallet.has_confirmed(&payout, &carol));

        // Alice alone is not enough even though Carol's record remains
        assert!(!wallet.confirm(&payout, &alice).unwrap().executed);
        assert_eq!(deliveries.count(), 0);

        // Re-adding Carol does not resurrect her old confirmation
        let re_add = wallet
            .submit(Operation::AddOwner { owner: carol }, &alice)
            .unwrap()
            .operation_id;
        assert!(wallet.confirm(&re_add, &bob).unwrap().executed);
        assert!(!wallet.has_confirmed(&payout, &carol));
        assert_eq!(wallet.tally(&payout).unwrap(), 1);

        assert!(wallet.confirm(&payout, &carol).unwrap().executed);
        assert_eq!(deliveries.count(), 1);
    }

    #[test]
    fn test_executed_intent_gets_fresh_id() {
        let (mut wallet, _, _) = setup();
        let [alice, bob, _] = owners();
        let op = Operation::ChangeAllowance { limit: 3 * ETH };

        let first = wallet.submit(op.clone(), &alice).unwrap().operation_id;
        assert!(wallet.confirm(&first, &bob).unwrap().executed);
        assert_eq!(wallet.daily_limit(), 3 * ETH);

        let next = wallet.operation_id(&op);
        assert_ne!(next, first);
        assert_eq!(
            wallet.confirm(&first, &alice),
            Err(WalletError::NoSuchOperation(first))
        );

        let second = wallet.submit(op, &bob).unwrap();
        assert_eq!(second.operation_id, next);
        assert!(!second.executed);
    }

    #[test]
    fn test_failed_delivery_reverts() {
        let (mut wallet, _, deliveries) = setup();
        let [alice, bob, _] = owners();
        deliveries.set_failing(true);
        let before = serde_json::to_string(&wallet.snapshot()).unwrap();

        assert!(matches!(
            wallet.submit(transfer("shop", ETH / 2), &alice),
            Err(WalletError::TransferFailed(TransferError::Rejected(_)))
        ));
        assert_eq!(serde_json::to_string(&wallet.snapshot()).unwrap(), before);
        assert!(!wallet.is_executing());

        // Quorum path: the completing confirmation is not recorded either
        deliveries.set_failing(false);
        let id = wallet
            .submit(transfer("shop", 4 * ETH), &alice)
            .unwrap()
            .operation_id;
        deliveries.set_failing(true);
        assert!(wallet.confirm(&id, &bob).is_err());
        assert!(!wallet.has_confirmed(&id, &bob));
        assert_eq!(wallet.balance(), 10 * ETH);

        deliveries.set_failing(false);
        assert!(wallet.confirm(&id, &bob).unwrap().executed);
        assert_eq!(wallet.balance(), 6 * ETH);
        assert_eq!(deliveries.count(), 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let deliveries = Deliveries::default();
        let clock = ManualClock::new(start());
        let config = MultisigConfig::new(owners().to_vec(), 2, ETH, None).unwrap();
        let mut wallet = MultiSigEngine::new(
            &config,
            Box::new(RecordingSink(deliveries.clone())),
            Arc::new(clock),
        )
        .unwrap();
        let [alice, bob, _] = owners();

        // Not covered by the balance: routed to quorum, allowance untouched
        let receipt = wallet.submit(transfer("shop", ETH / 2), &alice).unwrap();
        assert!(!receipt.executed);
        assert_eq!(wallet.spent_today(), 0);

        assert_eq!(
            wallet.confirm(&receipt.operation_id, &bob),
            Err(WalletError::InsufficientFunds {
                have: 0,
                need: ETH / 2
            })
        );
        assert_eq!(wallet.tally(&receipt.operation_id).unwrap(), 1);

        wallet.deposit(&addr("funder"), ETH).unwrap();
        assert!(wallet.confirm(&receipt.operation_id, &bob).unwrap().executed);
        assert_eq!(wallet.balance(), ETH / 2);
        assert_eq!(wallet.spent_today(), 0);
    }

    #[test]
    fn test_single_owner_quorum_executes_on_submit() {
        let deliveries = Deliveries::default();
        let [alice, bob, carol] = owners();
        let (mut wallet, _) = build(&[alice, bob], 1, Box::new(RecordingSink(deliveries)));
        let seq = wallet.next_event_seq();

        let receipt = wallet
            .submit(Operation::AddOwner { owner: carol }, &alice)
            .unwrap();

        assert!(receipt.executed);
        assert!(wallet.is_owner(&carol));
        assert!(wallet.pending_operations().is_empty());
        assert_eq!(
            event_names(&wallet, seq),
            vec!["Confirmation", "OwnerAdded"]
        );
    }

    #[test]
    fn test_config_validated_again_at_execution() {
        let (mut wallet, _, _) = setup();
        let [alice, bob, carol] = owners();
        let dave = addr("dave");

        let first = wallet
            .submit(Operation::AddOwner { owner: dave }, &alice)
            .unwrap()
            .operation_id;
        let second = wallet
            .submit(
                Operation::ChangeOwner {
                    from: carol,
                    to: dave,
                },
                &alice,
            )
            .unwrap()
            .operation_id;

        assert!(wallet.confirm(&first, &bob).unwrap().executed);

        let registry_before = wallet.registry().clone();
        assert_eq!(
            wallet.confirm(&second, &bob),
            Err(WalletError::Registry(RegistryError::DuplicateOwner(dave)))
        );
        assert_eq!(wallet.registry(), &registry_before);
        assert_eq!(wallet.tally(&second).unwrap(), 1);
    }

    #[test]
    fn test_change_owner_replaces_slot_and_drops_stale_confirmations() {
        let (mut wallet, _, deliveries) = setup();
        let [alice, bob, carol] = owners();
        let dave = addr("dave");

        let payout = wallet
            .submit(transfer("vendor", 2 * ETH), &carol)
            .unwrap()
            .operation_id;
        assert!(wallet.has_confirmed(&payout, &carol));

        let swap = wallet
            .submit(Operation::ChangeOwner { from: carol, to: dave }, &alice)
            .unwrap()
            .operation_id;
        let seq = wallet.next_event_seq();
        assert!(wallet.confirm(&swap, &bob).unwrap().executed);

        assert_eq!(wallet.owners(), &[alice, bob, dave]);
        assert_eq!(
            wallet.events().last().unwrap().event,
            WalletEvent::OwnerChanged {
                old_owner: carol,
                new_owner: dave,
            }
        );
        assert_eq!(event_names(&wallet, seq), vec!["Confirmation", "OwnerChanged"]);
        assert_eq!(wallet.tally(&payout).unwrap(), 0);
        assert!(!wallet.has_confirmed(&payout, &carol));

        // Swapping carol back in does not revive her old confirmation
        let swap_back = wallet
            .submit(Operation::ChangeOwner { from: dave, to: carol }, &alice)
            .unwrap()
            .operation_id;
        assert!(wallet.confirm(&swap_back, &bob).unwrap().executed);

        assert_eq!(wallet.owners(), &[alice, bob, carol]);
        assert_eq!(wallet.tally(&payout).unwrap(), 0);
        assert!(!wallet.has_confirmed(&payout, &carol));

        assert!(!wallet.confirm(&payout, &carol).unwrap().executed);
        assert_eq!(wallet.tally(&payout).unwrap(), 1);
        assert!(wallet.confirm(&payout, &alice).unwrap().executed);
        assert_eq!(deliveries.count(), 1);
    }

    #[test]
    fn test_lowered_requirement_applies_to_pending() {
        let deliveries = Deliveries::default();
        let [alice, bob, carol] = owners();
        let (mut wallet, _) = build(&owners(), 3, Box::new(RecordingSink(deliveries.clone())));

        let payout = wallet
            .submit(transfer("vendor", 2 * ETH), &alice)
            .unwrap()
            .operation_id;
        assert!(!wallet.confirm(&payout, &bob).unwrap().executed);

        let lower = wallet
            .submit(Operation::ChangeRequired { required: 2 }, &alice)
            .unwrap()
            .operation_id;
        assert!(!wallet.confirm(&lower, &bob).unwrap().executed);
        assert!(wallet.confirm(&lower, &carol).unwrap().executed);
        assert_eq!(wallet.required(), 2);

        // Tally 2 >= 2 now: the next confirming call executes it
        assert!(wallet.confirm(&payout, &alice).unwrap().executed);
        assert_eq!(deliveries.count(), 1);
    }

    #[test]
    fn test_reset_spent_and_change_allowance() {
        let (mut wallet, _, _) = setup();
        let [alice, bob, _] = owners();

        assert!(wallet.submit(transfer("shop", ETH), &alice).unwrap().executed);
        assert!(!wallet.submit(transfer("shop", 1), &alice).unwrap().executed);

        let reset = wallet.submit(Operation::ResetSpent, &bob).unwrap();
        assert!(!reset.executed);
        assert_eq!(wallet.spent_today(), ETH);
        assert!(wallet.confirm(&reset.operation_id, &alice).unwrap().executed);
        assert_eq!(wallet.spent_today(), 0);

        let raise = wallet
            .submit(Operation::ChangeAllowance { limit: 0 }, &alice)
            .unwrap();
        assert!(wallet.confirm(&raise.operation_id, &bob).unwrap().executed);
        assert_eq!(wallet.daily_limit(), 0);
        assert!(!wallet.submit(transfer("shop", 1), &alice).unwrap().executed);
    }

    #[test]
    fn test_allowance_never_exceeded() {
        let (mut wallet, clock, _) = setup();
        let [alice, _, _] = owners();
        let mut executed_today: Amount = 0;

        for step in 0..40u128 {
            let value = (step * 7919 % 13 + 1) * ETH / 20;
            let receipt = wallet.submit(transfer("shop", value), &alice).unwrap();
            if receipt.executed {
                executed_today += value;
            }
            assert!(wallet.spent_today() <= wallet.daily_limit());
            assert!(executed_today <= wallet.daily_limit());

            if step % 10 == 9 {
                clock.advance(Duration::hours(24));
                executed_today = 0;
            }
        }
    }

    #[test]
    fn test_quorum_invariant_over_confirm_revoke_sequence() {
        let deliveries = Deliveries::default();
        let owners: Vec<Address> = (0..5).map(|i| addr(&format!("owner-{}", i))).collect();
        let (mut wallet, _) = build(&owners, 3, Box::new(RecordingSink(deliveries.clone())));

        let id = wallet
            .submit(transfer("vendor", 2 * ETH), &owners[0])
            .unwrap()
            .operation_id;

        // Deterministic pseudo-random walk over confirm/revoke calls
        let mut seed: u64 = 0x5eed;
        let mut executed = false;
        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let owner = owners[(seed >> 33) as usize % owners.len()];
            let revoke = (seed >> 20) % 3 == 0;

            if executed {
                assert_eq!(
                    wallet.confirm(&id, &owner),
                    Err(WalletError::NoSuchOperation(id))
                );
                continue;
            }

            if revoke {
                wallet.revoke(&id, &owner).unwrap();
                continue;
            }

            let before = wallet.tally(&id).unwrap();
            let already = wallet.has_confirmed(&id, &owner);
            let expected = if already { before } else { before + 1 };
            let receipt = wallet.confirm(&id, &owner).unwrap();
            assert_eq!(receipt.executed, expected >= wallet.required());
            executed = receipt.executed;
        }

        assert!(executed);
        assert_eq!(deliveries.count(), 1);
    }

    #[test]
    fn test_concurrent_confirmations_execute_once() {
        let deliveries = Deliveries::default();
        let owners: Vec<Address> = (0..6).map(|i| addr(&format!("owner-{}", i))).collect();
        let (mut wallet, _) = build(&owners, 2, Box::new(RecordingSink(deliveries.clone())));

        let id = wallet
            .submit(transfer("vendor", 4 * ETH), &owners[0])
            .unwrap()
            .operation_id;

        let shared = Arc::new(Mutex::new(wallet));
        let handles: Vec<_> = owners[1..]
            .iter()
            .map(|owner| {
                let shared = Arc::clone(&shared);
                let owner = *owner;
                std::thread::spawn(move || {
                    let result = shared.lock().unwrap().confirm(&id, &owner);
                    result
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let executed = results
            .iter()
            .filter(|r| matches!(r, Ok(ConfirmReceipt { executed: true })))
            .count();
        let missing = results
            .iter()
            .filter(|r| matches!(r, Err(WalletError::NoSuchOperation(_))))
            .count();

        assert_eq!(executed, 1);
        assert_eq!(missing, owners.len() - 2);
        assert_eq!(deliveries.count(), 1);
        assert_eq!(shared.lock().unwrap().balance(), 6 * ETH);
    }

    #[test]
    fn test_independent_operations_do_not_interfere() {
        let (mut wallet, _, deliveries) = setup();
        let [alice, bob, carol] = owners();

        let first = wallet.submit(transfer("north", 2 * ETH), &alice).unwrap().operation_id;
        let second = wallet.submit(transfer("south", 3 * ETH), &bob).unwrap().operation_id;

        assert!(wallet.confirm(&second, &carol).unwrap().executed);
        assert_eq!(wallet.tally(&first).unwrap(), 1);
        assert!(wallet.confirm(&first, &carol).unwrap().executed);
        assert_eq!(deliveries.count(), 2);
        assert_eq!(wallet.balance(), 5 * ETH);
    }

    #[test]
    fn test_snapshot_restores_pending_state() {
        let (mut wallet, clock, _) = setup();
        let [alice, bob, _] = owners();

        let id = wallet.submit(transfer("shop", 2 * ETH), &alice).unwrap().operation_id;
        let json = serde_json::to_string(&wallet.snapshot()).unwrap();
        let snapshot: WalletSnapshot = serde_json::from_str(&json).unwrap();

        let deliveries = Deliveries::default();
        let mut restored = MultiSigEngine::from_snapshot(
            snapshot,
            Box::new(RecordingSink(deliveries.clone())),
            Arc::new(clock),
        );

        assert_eq!(restored.owners(), wallet.owners());
        assert_eq!(restored.balance(), 10 * ETH);
        assert!(restored.has_confirmed(&id, &alice));
        assert_eq!(restored.next_event_seq(), wallet.next_event_seq());
        assert!(restored.confirm(&id, &bob).unwrap().executed);
        assert_eq!(deliveries.count(), 1);
    }

    #[test]
    fn test_deposit() {
        let (mut wallet, _, _) = setup();
        let seq = wallet.next_event_seq();

        wallet.deposit(&addr("anyone"), 0).unwrap();
        assert_eq!(wallet.next_event_seq(), seq);

        wallet.deposit(&addr("anyone"), ETH).unwrap();
        assert_eq!(wallet.balance(), 11 * ETH);
        assert_eq!(event_names(&wallet, seq), vec!["Deposit"]);

        assert_eq!(
            wallet.deposit(&addr("anyone"), Amount::MAX),
            Err(WalletError::BalanceOverflow)
        );
        assert_eq!(wallet.balance(), 11 * ETH);
    }
}
