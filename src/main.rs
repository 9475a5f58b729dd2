use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tanda_engine::config::CollectionPolicy;
use tanda_engine::domain::ports::{ClockRef, NotifierRef, PaymentProcessorRef};
use tanda_engine::infrastructure::in_memory::{InMemoryStore, SystemClock};
use tanda_engine::infrastructure::sandbox::{SandboxProcessor, TracingNotifier};
use tanda_engine::Engine;
use tracing_subscriber::EnvFilter;

/// Collection sweep daemon: promotes due collections, fires charge
/// attempts and retries, reclaims stuck ones, and escalates failures.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB;
    /// requires the `storage-rocksdb` feature.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON file with collection policy overrides.
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Run a single sweep pass and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let policy = match &cli.policy {
        Some(path) => {
            let raw = std::fs::read_to_string(path).into_diagnostic()?;
            serde_json::from_str(&raw).into_diagnostic()?
        }
        None => CollectionPolicy::default(),
    };
    let sweep_interval = std::time::Duration::from_secs(policy.sweep_interval_secs);

    let processor: PaymentProcessorRef = Arc::new(SandboxProcessor);
    let notifier: NotifierRef = Arc::new(TracingNotifier);
    let clock: ClockRef = Arc::new(SystemClock);

    let engine = match cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            let store = tanda_engine::infrastructure::rocksdb::RocksDbStore::open(db_path)
                .into_diagnostic()?;
            Engine::with_store(Arc::new(store), processor, notifier, clock, policy)
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            return Err(miette::miette!(
                "--db-path requires building with the storage-rocksdb feature"
            ));
        }
        None => Engine::with_store(
            Arc::new(InMemoryStore::new()),
            processor,
            notifier,
            clock,
            policy,
        ),
    };

    loop {
        match engine.scheduler.sweep().await {
            Ok(report) => {
                println!(
                    "sweep complete: {} promoted, {} attempted, {} reclaimed, {} escalated",
                    report.promoted, report.attempted, report.reclaimed, report.escalated
                );
            }
            Err(err) => {
                tracing::error!(error = %err, "sweep failed");
            }
        }
        if cli.once {
            break;
        }
        tokio::time::sleep(sweep_interval).await;
    }

    Ok(())
}
