//! Host process for the pairing handler.
//!
//! Reads newline-delimited JSON messages from `--input` (or stdin), handles
//! them one at a time, and writes one reply line per message to stdout. Logs
//! go to stderr. With a state path configured, the store is restored at
//! startup and checkpointed before every acknowledgment.

use anyhow::{Context, Result};
use clap::Parser;
use devpair::{
    Checkpoint, Config, DocumentStore, IntakeLoop, LineIntake, MemoryStore, PairingHandler,
    SchemaSet, load_catalog_file, store::APPLICATIONS,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pairing-intake")]
#[command(about = "Process device pairing messages one at a time")]
struct Cli {
    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Application catalog seed file (overrides config).
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Store snapshot path (overrides config).
    #[arg(long)]
    state: Option<PathBuf>,
    /// Read messages from this file instead of stdin.
    #[arg(long)]
    input: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(catalog) = cli.catalog {
        config.catalog_path = Some(catalog);
    }
    if let Some(state) = cli.state {
        config.state_path = Some(state);
    }
    init_logging(&config);

    let store = match &config.state_path {
        Some(path) => MemoryStore::open(path)?,
        None => MemoryStore::new(),
    };
    if let Some(path) = &config.catalog_path {
        seed_catalog(&store, path).await?;
    }

    let handler = PairingHandler::new(Arc::new(store.clone()) as Arc<dyn DocumentStore>, &config)?;
    let mut intake_loop = IntakeLoop::new(&handler);
    if let Some(path) = &config.state_path {
        intake_loop = intake_loop.with_checkpoint(Checkpoint {
            store: store.clone(),
            path: path.clone(),
        });
    }

    let reader: Box<dyn AsyncBufRead + Unpin> = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut intake = LineIntake::new(reader, tokio::io::stdout());

    info!(queue = %config.intake.queue_name(), "pairing intake started");
    let stats = intake_loop.run(&mut intake, shutdown_signal()).await?;

    if let Some(path) = &config.state_path {
        store.save(path).await?;
    }
    info!(
        processed = stats.processed,
        errors = stats.errors,
        "pairing intake stopped"
    );
    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves on Ctrl-C or SIGTERM; fails if a handler cannot be installed.
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .context("installing Ctrl-C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("installing SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        signalled = ctrl_c => signalled,
        signalled = terminate => signalled,
    }
}

async fn seed_catalog(store: &MemoryStore, path: &std::path::Path) -> Result<()> {
    let schemas = SchemaSet::compile()?;
    let entries = load_catalog_file(path, &schemas)?;
    let applications = store
        .memory_collection(APPLICATIONS)
        .context("store has no applications collection")?;
    let count = applications.replace_all_by_id(entries).await?;
    info!(path = %path.display(), applications = count, "seeded application catalog");
    Ok(())
}
