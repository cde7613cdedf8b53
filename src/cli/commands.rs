//! CLI commands for the wallet
//!
//! Every command loads the wallet from the data directory, runs one engine
//! call and writes the new state back.

use crate::core::{format_amount, parse_amount, Address, Operation, OperationId};
use crate::multisig::{
    Clock, LoggingSink, MultiSigEngine, MultisigConfig, PendingOperation, WalletEvent,
};
use crate::storage::{Storage, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub wallet: MultiSigEngine,
    pub storage: Storage,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load the wallet stored in `data_dir`
    pub fn new(data_dir: PathBuf, clock: Arc<dyn Clock>) -> CliResult<Self> {
        let storage = open_storage(&data_dir)?;

        if !storage.exists() {
            return Err(format!(
                "No wallet found at {:?}. Create one with: quorum-wallet init",
                data_dir
            )
            .into());
        }

        let snapshot = storage.load()?;
        let wallet = MultiSigEngine::from_snapshot(snapshot, Box::new(LoggingSink::new()), clock);

        Ok(Self {
            wallet,
            storage,
            data_dir,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.wallet.snapshot())?;
        Ok(())
    }
}

fn open_storage(data_dir: &Path) -> CliResult<Storage> {
    let config = StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    Ok(Storage::new(config)?)
}

/// Parse an address argument
pub fn parse_address(input: &str) -> CliResult<Address> {
    Ok(input.parse::<Address>()?)
}

/// Parse a list of address arguments
pub fn parse_addresses(inputs: &[String]) -> CliResult<Vec<Address>> {
    inputs.iter().map(|s| parse_address(s)).collect()
}

/// Parse an operation id argument
pub fn parse_operation_id(input: &str) -> CliResult<OperationId> {
    Ok(input.parse::<OperationId>()?)
}

/// Create a new wallet
pub fn cmd_init(
    data_dir: &Path,
    config: &MultisigConfig,
    force: bool,
    clock: Arc<dyn Clock>,
) -> CliResult<()> {
    let storage = open_storage(data_dir)?;

    if storage.exists() && !force {
        println!("⚠️  Wallet already exists at {:?}", data_dir);
        println!("   Use --force to reinitialize (this will delete existing data)");
        return Ok(());
    }

    let wallet = MultiSigEngine::new(config, Box::new(LoggingSink::new()), clock)?;
    storage.save(&wallet.snapshot())?;

    println!("✅ Wallet initialized!");
    println!("   📁 Data directory: {:?}", data_dir);
    if let Some(label) = wallet.label() {
        println!("   🏷️  Label: {}", label);
    }
    println!("   🔐 Policy: {}", config.description());
    for owner in wallet.owners() {
        println!("   👤 {}", owner);
    }

    Ok(())
}

/// Show wallet status
pub fn cmd_status(state: &AppState) -> CliResult<()> {
    let wallet = &state.wallet;

    println!("🔐 Wallet {}", wallet.label().unwrap_or(""));
    println!("   ├─ Policy: {}", wallet.registry().description());
    println!("   ├─ Balance: {}", format_amount(wallet.balance()));
    println!("   ├─ Daily limit: {}", format_amount(wallet.daily_limit()));
    println!(
        "   ├─ Remaining today: {}",
        format_amount(wallet.remaining_today())
    );
    println!("   ├─ Pending operations: {}", wallet.pending_operations().len());
    println!("   └─ Owners:");
    for owner in wallet.owners() {
        println!("      └─ {}", owner);
    }

    Ok(())
}

/// Credit value to the wallet
pub fn cmd_deposit(state: &mut AppState, from: &str, value: &str) -> CliResult<()> {
    let from = parse_address(from)?;
    let value = parse_amount(value)?;

    state.wallet.deposit(&from, value)?;
    state.save()?;

    println!("💰 Deposited {} from {}", format_amount(value), from);
    println!("   New balance: {}", format_amount(state.wallet.balance()));

    Ok(())
}

/// Submit an operation
pub fn cmd_submit(state: &mut AppState, caller: &str, operation: Operation) -> CliResult<()> {
    let caller = parse_address(caller)?;
    let description = operation.to_string();

    let receipt = state.wallet.submit(operation, &caller)?;
    state.save()?;

    if receipt.executed {
        println!("✅ Executed: {}", description);
        // The allowance paid for it; an identical proposal stays open
        if let Some(pending) = state.wallet.operation(&receipt.operation_id) {
            println!(
                "ℹ️  An identical proposal is still pending under {} and was not used",
                receipt.operation_id
            );
            print_tally(&state.wallet, pending);
        }
    } else {
        println!("📝 Pending: {}", description);
        println!("   ID: {}", receipt.operation_id);
        if let Some(pending) = state.wallet.operation(&receipt.operation_id) {
            print_tally(&state.wallet, pending);
        }
    }

    Ok(())
}

/// Confirm a pending operation
pub fn cmd_confirm(state: &mut AppState, caller: &str, id: &str) -> CliResult<()> {
    let caller = parse_address(caller)?;
    let id = parse_operation_id(id)?;

    let receipt = state.wallet.confirm(&id, &caller)?;
    state.save()?;

    if receipt.executed {
        println!("✅ Operation {} executed", id.short());
    } else {
        println!("✍️  Confirmation recorded for {}", id.short());
        if let Some(pending) = state.wallet.operation(&id) {
            print_tally(&state.wallet, pending);
        }
    }

    Ok(())
}

/// Revoke a confirmation
pub fn cmd_revoke(state: &mut AppState, caller: &str, id: &str) -> CliResult<()> {
    let caller = parse_address(caller)?;
    let id = parse_operation_id(id)?;

    state.wallet.revoke(&id, &caller)?;
    state.save()?;

    println!("↩️  Confirmation of {} by {} revoked", id.short(), caller);
    if let Some(pending) = state.wallet.operation(&id) {
        print_tally(&state.wallet, pending);
    }

    Ok(())
}

fn print_tally(wallet: &MultiSigEngine, pending: &PendingOperation) {
    println!(
        "   Confirmations: {}/{}",
        pending.tally(wallet.registry()),
        wallet.required()
    );
}

/// List pending operations
pub fn cmd_pending(state: &AppState) -> CliResult<()> {
    let pending = state.wallet.pending_operations();

    if pending.is_empty() {
        println!("📭 No pending operations.");
        return Ok(());
    }

    println!("📬 Pending operations ({}):", pending.len());
    for op in pending {
        println!(
            "   {} | {}/{} | {}",
            op.id,
            op.tally(state.wallet.registry()),
            state.wallet.required(),
            op.operation
        );
        for owner in op.confirmers(state.wallet.registry()) {
            println!("      └─ ✍️  {}", owner);
        }
    }

    Ok(())
}

/// Check whether an owner confirmed an operation
pub fn cmd_has_confirmed(state: &AppState, id: &str, owner: &str) -> CliResult<()> {
    let id = parse_operation_id(id)?;
    let owner = parse_address(owner)?;

    if state.wallet.has_confirmed(&id, &owner) {
        println!("✅ {} confirmed {}", owner, id.short());
    } else {
        println!("❌ {} has not confirmed {}", owner, id.short());
    }

    Ok(())
}

/// Show recent events
pub fn cmd_events(state: &AppState, since: Option<u64>, limit: usize) -> CliResult<()> {
    let from = since.unwrap_or(0);
    let events = state.wallet.events_since(from);
    let skip = events.len().saturating_sub(limit);

    if events.is_empty() {
        println!("📭 No events.");
        return Ok(());
    }

    println!("📜 Events:");
    for recorded in events.iter().skip(skip) {
        println!(
            "   #{} | {} | {}",
            recorded.seq,
            recorded.at.format("%Y-%m-%d %H:%M:%S"),
            describe_event(&recorded.event)
        );
    }

    Ok(())
}

fn describe_event(event: &WalletEvent) -> String {
    match event {
        WalletEvent::Deposit { from, value } => {
            format!("Deposit {} from {}", format_amount(*value), from)
        }
        WalletEvent::Confirmation { owner, operation } => {
            format!("Confirmation {} by {}", operation.short(), owner)
        }
        WalletEvent::Revoke { owner, operation } => {
            format!("Revoke {} by {}", operation.short(), owner)
        }
        WalletEvent::OwnerAdded { owner } => format!("OwnerAdded {}", owner),
        WalletEvent::OwnerRemoved { owner } => format!("OwnerRemoved {}", owner),
        WalletEvent::OwnerChanged {
            old_owner,
            new_owner,
        } => format!("OwnerChanged {} -> {}", old_owner, new_owner),
        WalletEvent::RequirementChanged { required } => {
            format!("RequirementChanged {}", required)
        }
        WalletEvent::DailyLimitChanged { limit } => {
            format!("DailyLimitChanged {}", format_amount(*limit))
        }
        WalletEvent::SpentReset => "SpentReset".to_string(),
        WalletEvent::SingleTransact {
            owner, to, value, ..
        } => format!(
            "SingleTransact {} to {} by {}",
            format_amount(*value),
            to,
            owner
        ),
        WalletEvent::MultiTransact {
            operation,
            to,
            value,
            ..
        } => format!(
            "MultiTransact {} {} to {}",
            operation.short(),
            format_amount(*value),
            to
        ),
        WalletEvent::ConfirmationNeeded {
            operation,
            initiator,
            intent,
            ..
        } => format!(
            "ConfirmationNeeded {} ({}) by {}",
            operation.short(),
            intent,
            initiator
        ),
    }
}

/// List backups
pub fn cmd_backups(state: &AppState) -> CliResult<()> {
    let stats = state.storage.stats()?;
    let backups = state.storage.list_backups();

    println!("🗄️  Storage");
    println!("   ├─ Directory: {:?}", stats.data_dir);
    println!("   ├─ Wallet file: {} bytes", stats.file_size);
    println!("   └─ Backups: {}", stats.backup_count);
    for index in backups {
        println!("      └─ #{}", index);
    }

    Ok(())
}

/// Replace the wallet with a backup
pub fn cmd_restore(state: &mut AppState, index: usize, clock: Arc<dyn Clock>) -> CliResult<()> {
    let snapshot = state.storage.restore_backup(index)?;
    state.wallet = MultiSigEngine::from_snapshot(snapshot, Box::new(LoggingSink::new()), clock);
    state.save()?;

    println!("♻️  Wallet restored from backup #{}", index);
    Ok(())
}

/// Export wallet to file
pub fn cmd_export(state: &AppState, path: &Path) -> CliResult<()> {
    crate::storage::save_to_file(&state.wallet.snapshot(), path)?;
    println!("📦 Wallet exported to {:?}", path);
    Ok(())
}

/// Import wallet from file
pub fn cmd_import(state: &mut AppState, path: &Path, clock: Arc<dyn Clock>) -> CliResult<()> {
    let snapshot = crate::storage::load_from_file(path)?;
    state.wallet = MultiSigEngine::from_snapshot(snapshot, Box::new(LoggingSink::new()), clock);
    state.save()?;

    println!("📥 Wallet imported from {:?}", path);
    println!("   Policy: {}", state.wallet.registry().description());

    Ok(())
}
