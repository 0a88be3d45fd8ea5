//! farmsync CLI - terminal client for offline-first farm records
//!
//! Stands in for a UI: every command maps onto one coordinator or sync
//! engine operation. Writes go to the server when reachable and are buffered
//! locally otherwise; `farmsync sync` flushes the buffer.

mod config;

use std::io::{self, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use farmsync_core::{
    Buyer, Coordinator, DateRange, DeleteOutcome, Entity, EntityKind, Expense, HttpGateway,
    LocalStore, MarketPrice, Product, Sale, SaveOutcome, Session, SyncEngine, Unit,
};

use config::Config;

#[derive(Parser)]
#[command(name = "farmsync")]
#[command(about = "Offline-first client for farm record keeping")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List records of one type (server first, local cache when offline)
    List {
        entity: EntityArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record an expense
    AddExpense {
        description: String,
        amount: f64,
        /// Expense category
        #[arg(long)]
        category: Option<String>,
        /// Date incurred (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete a record
    Delete { entity: EntityArg, id: i64 },
    /// Push buffered writes and queued deletions to the server
    Sync,
    /// Show what is waiting for the next sync
    Pending,
    /// Drop local rows of one type, or everything with --all
    Clear {
        entity: Option<EntityArg>,
        /// Wipe all local data including queued deletions (logout teardown)
        #[arg(long)]
        all: bool,
    },
    /// Download a server-rendered CSV export
    Export {
        /// Entity type to export
        #[arg(value_enum, default_value_t = EntityArg::Sale)]
        entity: EntityArg,
        /// Inclusive range start (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Inclusive range end (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum EntityArg {
    Product,
    Sale,
    Expense,
    Buyer,
    MarketPrice,
    Unit,
}

impl From<EntityArg> for EntityKind {
    fn from(arg: EntityArg) -> Self {
        match arg {
            EntityArg::Product => Self::Product,
            EntityArg::Sale => Self::Sale,
            EntityArg::Expense => Self::Expense,
            EntityArg::Buyer => Self::Buyer,
            EntityArg::MarketPrice => Self::MarketPrice,
            EntityArg::Unit => Self::Unit,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] farmsync_core::Error),
    #[error(transparent)]
    Write(#[from] farmsync_core::WriteError),
    #[error(transparent)]
    Sync(#[from] farmsync_core::SyncError),
    #[error(transparent)]
    Gateway(#[from] farmsync_core::GatewayError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Missing environment variable: {0}")]
    MissingConfiguration(&'static str),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("Pass an entity type or --all")]
    NothingToClear,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("farmsync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing::debug!("Using local store at {}", config.db_path.display());

    let store = LocalStore::open_path(&config.db_path).await?;
    let session = Arc::new(Session::new(config.token, config.farm_id, config.currency));
    let gateway = HttpGateway::new(config.api_url, Arc::clone(&session))?;
    let coordinator = Coordinator::new(store.clone(), gateway.clone(), Arc::clone(&session));
    let engine = SyncEngine::new(store, gateway, Arc::clone(&session));

    let result = match cli.command {
        Commands::List { entity, json } => run_list(&coordinator, entity, json).await,
        Commands::AddExpense {
            description,
            amount,
            category,
            date,
        } => run_add_expense(&coordinator, description, amount, category, date).await,
        Commands::Delete { entity, id } => run_delete(&coordinator, entity.into(), id).await,
        Commands::Sync => run_sync(&engine).await,
        Commands::Pending => run_pending(&coordinator).await,
        Commands::Clear { entity, all } => run_clear(&coordinator, entity, all).await,
        Commands::Export {
            entity,
            start,
            end,
            output,
        } => run_export(&coordinator, entity.into(), start, end, output).await,
    };

    if session.is_invalidated() {
        eprintln!("Session is no longer valid; log in again before retrying.");
    }
    result
}

async fn run_list(
    coordinator: &Coordinator<HttpGateway>,
    entity: EntityArg,
    json: bool,
) -> Result<(), CliError> {
    match entity {
        EntityArg::Product => print_list::<Product>(coordinator, json).await,
        EntityArg::Sale => print_list::<Sale>(coordinator, json).await,
        EntityArg::Expense => print_list::<Expense>(coordinator, json).await,
        EntityArg::Buyer => print_list::<Buyer>(coordinator, json).await,
        EntityArg::MarketPrice => print_list::<MarketPrice>(coordinator, json).await,
        EntityArg::Unit => print_list::<Unit>(coordinator, json).await,
    }
}

async fn print_list<E: Entity>(
    coordinator: &Coordinator<HttpGateway>,
    json: bool,
) -> Result<(), CliError> {
    let records = coordinator.list::<E>().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No {} records.", E::KIND.label());
        return Ok(());
    }
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

async fn run_add_expense(
    coordinator: &Coordinator<HttpGateway>,
    description: String,
    amount: f64,
    category: Option<String>,
    date: Option<NaiveDate>,
) -> Result<(), CliError> {
    let mut expense = Expense::new(description, amount);
    expense.category = category;
    expense.date_incurred = date;

    match coordinator.save(expense).await? {
        SaveOutcome::Confirmed(saved) => println!("Expense saved (id {}).", saved.id),
        SaveOutcome::SavedOffline(saved) => {
            println!("Server unreachable; expense saved offline (local id {}).", saved.id);
        }
    }
    Ok(())
}

async fn run_delete(
    coordinator: &Coordinator<HttpGateway>,
    kind: EntityKind,
    id: i64,
) -> Result<(), CliError> {
    match coordinator.delete(kind, id).await? {
        DeleteOutcome::Confirmed => println!("Deleted {} {id}.", kind.label()),
        DeleteOutcome::QueuedOffline => {
            println!("Server unreachable; {} {id} removed locally, deletion queued.", kind.label());
        }
        DeleteOutcome::RemovedLocal => {
            println!("Removed unsynced {} {id} (never reached the server).", kind.label());
        }
    }
    Ok(())
}

async fn run_sync(engine: &SyncEngine<HttpGateway>) -> Result<(), CliError> {
    let report = engine.sync().await?;
    println!("Synced {} record(s).", report.synced.total());
    for error in &report.errors {
        eprintln!("  failed: {error}");
    }
    Ok(())
}

async fn run_pending(coordinator: &Coordinator<HttpGateway>) -> Result<(), CliError> {
    let summary = coordinator.pending().await?;
    if summary.total() == 0 {
        println!("Nothing waiting to sync.");
        return Ok(());
    }

    for (kind, count) in &summary.buffered {
        println!("{count} buffered {} record(s)", kind.label());
    }
    if summary.deletions > 0 {
        println!("{} queued deletion(s)", summary.deletions);
    }
    Ok(())
}

async fn run_clear(
    coordinator: &Coordinator<HttpGateway>,
    entity: Option<EntityArg>,
    all: bool,
) -> Result<(), CliError> {
    if all {
        coordinator.clear_all().await?;
        println!("Cleared all local data.");
        return Ok(());
    }

    let Some(entity) = entity else {
        return Err(CliError::NothingToClear);
    };
    let kind: EntityKind = entity.into();
    coordinator.clear(kind).await?;
    println!("Cleared local {} records.", kind.label());
    Ok(())
}

async fn run_export(
    coordinator: &Coordinator<HttpGateway>,
    kind: EntityKind,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let bytes = coordinator.export(kind, DateRange::new(start, end)).await?;
    match output {
        Some(path) => {
            std::fs::write(&path, &bytes)?;
            println!("Wrote {} bytes to {}.", bytes.len(), path.display());
        }
        None => io::stdout().write_all(&bytes)?,
    }
    Ok(())
}
