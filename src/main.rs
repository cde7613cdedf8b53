//! Quorum Wallet CLI Application
//!
//! A command-line interface for a multi-owner wallet with a daily allowance.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use quorum_wallet::api::{create_router, ApiState, WsBroadcaster};
use quorum_wallet::cli::{self, AppState};
use quorum_wallet::core::{parse_amount, Operation, Transfer};
use quorum_wallet::multisig::{Clock, ManualClock, MultisigConfig, SystemClock};
use quorum_wallet::storage::{Storage, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Parser)]
#[command(name = "quorum-wallet")]
#[command(version = "0.1.0")]
#[command(about = "A multi-owner wallet with a daily single-signer allowance", long_about = None)]
struct Cli {
    /// Data directory for wallet storage
    #[arg(short, long, default_value = ".quorum_wallet")]
    data_dir: PathBuf,

    /// Pretend the current time is this RFC 3339 instant
    #[arg(long, global = true)]
    at: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet
    Init {
        /// Owner address (repeat for each owner)
        #[arg(short, long = "owner", required = true)]
        owners: Vec<String>,

        /// Confirmations required for quorum
        #[arg(short, long)]
        required: usize,

        /// Daily single-signer allowance, e.g. "1eth"
        #[arg(long, default_value = "0")]
        daily_limit: String,

        /// Optional label for the wallet
        #[arg(short, long)]
        label: Option<String>,

        /// Overwrite an existing wallet
        #[arg(long)]
        force: bool,
    },

    /// Show wallet status
    Status,

    /// Credit value to the wallet
    Deposit {
        /// Depositor address
        #[arg(short, long)]
        from: String,

        /// Amount, e.g. "2.5eth"
        #[arg(short, long)]
        value: String,
    },

    /// Submit an operation
    Submit {
        /// Owner submitting the operation
        #[arg(short, long)]
        caller: String,

        #[command(subcommand)]
        action: SubmitCommands,
    },

    /// Confirm a pending operation
    Confirm {
        /// Confirming owner
        #[arg(short, long)]
        caller: String,

        /// Operation id
        #[arg(short, long)]
        id: String,
    },

    /// Revoke a confirmation
    Revoke {
        /// Revoking owner
        #[arg(short, long)]
        caller: String,

        /// Operation id
        #[arg(short, long)]
        id: String,
    },

    /// List pending operations
    Pending,

    /// Check whether an owner confirmed an operation
    HasConfirmed {
        /// Operation id
        #[arg(short, long)]
        id: String,

        /// Owner address
        #[arg(short, long)]
        owner: String,
    },

    /// Show recent events
    Events {
        /// First sequence number to show
        #[arg(short, long)]
        since: Option<u64>,

        /// Number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show storage and backups
    Backups,

    /// Restore the wallet from a backup
    Restore {
        /// Backup index (0 is the most recent)
        #[arg(short, long)]
        index: usize,
    },

    /// Export wallet to file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import wallet from file
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum SubmitCommands {
    /// Move value to an address
    Transfer {
        /// Recipient address
        #[arg(short, long)]
        to: String,

        /// Amount, e.g. "0.5eth"
        #[arg(short, long)]
        value: String,

        /// Call payload as hex
        #[arg(long)]
        data: Option<String>,
    },

    /// Register a new owner
    AddOwner {
        #[arg(short, long)]
        owner: String,
    },

    /// Deregister an owner
    RemoveOwner {
        #[arg(short, long)]
        owner: String,
    },

    /// Replace an owner
    ChangeOwner {
        #[arg(short, long)]
        from: String,

        #[arg(short, long)]
        to: String,
    },

    /// Change the number of required confirmations
    ChangeRequired {
        #[arg(short, long)]
        required: usize,
    },

    /// Change the daily allowance
    ChangeAllowance {
        #[arg(short, long)]
        limit: String,
    },

    /// Zero today's spent amount
    ResetSpent,
}

impl SubmitCommands {
    fn into_operation(self) -> cli::CliResult<Operation> {
        let operation = match self {
            SubmitCommands::Transfer { to, value, data } => {
                let mut transfer = Transfer::new(cli::parse_address(&to)?, parse_amount(&value)?);
                if let Some(data) = data {
                    transfer = transfer.with_data(hex::decode(data.trim_start_matches("0x"))?);
                }
                Operation::Transfer(transfer)
            }
            SubmitCommands::AddOwner { owner } => Operation::AddOwner {
                owner: cli::parse_address(&owner)?,
            },
            SubmitCommands::RemoveOwner { owner } => Operation::RemoveOwner {
                owner: cli::parse_address(&owner)?,
            },
            SubmitCommands::ChangeOwner { from, to } => Operation::ChangeOwner {
                from: cli::parse_address(&from)?,
                to: cli::parse_address(&to)?,
            },
            SubmitCommands::ChangeRequired { required } => Operation::ChangeRequired { required },
            SubmitCommands::ChangeAllowance { limit } => Operation::ChangeAllowance {
                limit: parse_amount(&limit)?,
            },
            SubmitCommands::ResetSpent => Operation::ResetSpent,
        };
        Ok(operation)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let clock: Arc<dyn Clock> = match cli.at {
        Some(at) => Arc::new(ManualClock::new(at)),
        None => Arc::new(SystemClock),
    };

    // Handle init command separately (doesn't need full state)
    if let Commands::Init {
        owners,
        required,
        daily_limit,
        label,
        force,
    } = &cli.command
    {
        let config = MultisigConfig::new(
            cli::parse_addresses(owners)?,
            *required,
            parse_amount(daily_limit)?,
            label.clone(),
        )?;
        return cli::cmd_init(&cli.data_dir, &config, *force, clock);
    }

    // Server runs on its own runtime
    if let Commands::Serve { port } = &cli.command {
        return run_server(*port, &cli.data_dir, clock);
    }

    let mut state = AppState::new(cli.data_dir.clone(), clock.clone())?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Serve { .. } => unreachable!(),

        Commands::Status => {
            cli::cmd_status(&state)?;
        }

        Commands::Deposit { from, value } => {
            cli::cmd_deposit(&mut state, &from, &value)?;
        }

        Commands::Submit { caller, action } => {
            cli::cmd_submit(&mut state, &caller, action.into_operation()?)?;
        }

        Commands::Confirm { caller, id } => {
            cli::cmd_confirm(&mut state, &caller, &id)?;
        }

        Commands::Revoke { caller, id } => {
            cli::cmd_revoke(&mut state, &caller, &id)?;
        }

        Commands::Pending => {
            cli::cmd_pending(&state)?;
        }

        Commands::HasConfirmed { id, owner } => {
            cli::cmd_has_confirmed(&state, &id, &owner)?;
        }

        Commands::Events { since, limit } => {
            cli::cmd_events(&state, since, limit)?;
        }

        Commands::Backups => {
            cli::cmd_backups(&state)?;
        }

        Commands::Restore { index } => {
            cli::cmd_restore(&mut state, index, clock)?;
        }

        Commands::Export { output } => {
            cli::cmd_export(&state, &output)?;
        }

        Commands::Import { input } => {
            cli::cmd_import(&mut state, &input, clock)?;
        }
    }

    Ok(())
}

fn run_server(
    port: u16,
    data_dir: &Path,
    clock: Arc<dyn Clock>,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let storage_config = StorageConfig {
            data_dir: data_dir.to_path_buf(),
            ..Default::default()
        };
        let storage = Arc::new(Storage::new(storage_config)?);

        if !storage.exists() {
            return Err(format!(
                "No wallet found at {:?}. Create one with: quorum-wallet init",
                data_dir
            )
            .into());
        }

        println!("📂 Loading wallet...");
        let wallet = AppState::new(data_dir.to_path_buf(), clock)?.wallet;

        let state = ApiState {
            wallet: Arc::new(RwLock::new(wallet)),
            storage: storage.clone(),
            ws_broadcaster: Arc::new(WsBroadcaster::new()),
        };

        // Clone state for shutdown handler
        let shutdown_state = state.clone();

        let app = create_router(state);

        let addr = format!("0.0.0.0:{}", port);
        println!("🚀 REST API server starting on http://localhost:{}", port);
        println!();
        println!("📖 Available endpoints:");
        println!("   GET  /health                                  - Health check");
        println!("   GET  /ws                                      - WebSocket event feed");
        println!("   GET  /api/wallet                              - Wallet status");
        println!("   GET  /api/wallet/owners/{{addr}}                - Ownership check");
        println!("   POST /api/wallet/deposit                      - Deposit");
        println!("   GET  /api/operations                          - Pending operations");
        println!("   POST /api/operations                          - Submit operation");
        println!("   GET  /api/operations/{{id}}                     - Get operation");
        println!("   POST /api/operations/{{id}}/confirm             - Confirm");
        println!("   POST /api/operations/{{id}}/revoke              - Revoke");
        println!("   GET  /api/operations/{{id}}/confirmations/{{o}}   - Confirmation check");
        println!("   GET  /api/events                              - Event journal");
        println!();

        // Handle Ctrl+C with graceful shutdown
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            println!("\n📴 Shutting down API server...");

            println!("💾 Saving data...");
            let wallet = shutdown_state.wallet.read().await;
            match shutdown_state.storage.save(&wallet.snapshot()) {
                Ok(()) => println!("✅ Data saved successfully!"),
                Err(e) => log::error!("Failed to save wallet: {}", e),
            }
            std::process::exit(0);
        });

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
