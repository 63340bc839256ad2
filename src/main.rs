//! Guru Ingestion CLI
//! Runs full loads and incremental polls against a Guru workspace and
//! prints the resulting document batches.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use guru_ingestion::checkpoint::{epoch_seconds, lookback_start, parse_since, CheckpointManager};
use guru_ingestion::config::Config;
use guru_ingestion::{Batch, GuruConnector, IngestionError, LoadConnector, PageWalker, PollConnector};

/// Guru Ingestion - knowledge-base card extraction
#[derive(Parser, Debug)]
#[command(name = "guru-ingestion")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pull Guru knowledge cards as batched documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load every card
    Load {
        /// Output format (json, summary)
        #[arg(short, long, default_value = "summary")]
        output: String,
    },

    /// Load cards modified within a time window
    Poll {
        /// Window start as a duration ago (e.g., "1h", "30m", "2d")
        #[arg(long, conflicts_with = "start")]
        since: Option<String>,

        /// Window start in Unix epoch seconds
        #[arg(long)]
        start: Option<f64>,

        /// Window end in Unix epoch seconds (default: now)
        #[arg(long)]
        end: Option<f64>,

        /// Do not read or update the poll checkpoint
        #[arg(long, default_value = "false")]
        no_checkpoint: bool,

        /// Output format (json, summary)
        #[arg(short, long, default_value = "summary")]
        output: String,
    },

    /// Show credential and checkpoint status
    Status,

    /// Reset the poll checkpoint
    Reset {
        /// Only reset this source (default: all sources)
        #[arg(long)]
        source: Option<String>,
    },
}

/// Sets up structured logging with tracing
fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    let run_id = uuid::Uuid::new_v4().to_string();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        run_id = %run_id,
        "Starting Guru ingestion"
    );

    let config = Config::load()?;
    config.validate()?;

    info!(
        batch_size = config.index_batch_size,
        checkpoint_dir = %config.checkpoint_dir.display(),
        has_credentials = config.has_credentials(),
        "Configuration loaded"
    );

    if let Err(e) = run(cli.command, &config).await {
        if let Some(err) = e.downcast_ref::<IngestionError>().filter(|err| err.is_configuration()) {
            error!(error = %err, "Invalid setup, check GURU_USER, GURU_USER_TOKEN and settings");
        }
        return Err(e);
    }

    Ok(())
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Load { output } => {
            let connector = build_connector(config)?;
            let walker = connector.load_from_state()?;
            drain(walker, &output).await?;
        }

        Commands::Poll {
            since,
            start,
            end,
            no_checkpoint,
            output,
        } => {
            poll(config, since, start, end, no_checkpoint, &output).await?;
        }

        Commands::Status => {
            show_status(config).await?;
        }

        Commands::Reset { source } => {
            let mut checkpoint_mgr = CheckpointManager::new(&config.checkpoint_dir).await?;
            match source {
                Some(source_id) => {
                    checkpoint_mgr.reset_source(&source_id);
                    println!("Reset poll checkpoint for {}", source_id);
                }
                None => {
                    checkpoint_mgr.reset_all();
                    println!("Reset poll checkpoint");
                }
            }
            checkpoint_mgr.save().await?;
        }
    }

    Ok(())
}

fn build_connector(config: &Config) -> Result<GuruConnector> {
    let mut connector = GuruConnector::new(config.index_batch_size, config.http_client_config())?;
    if let Some(credentials) = config.credentials() {
        connector.set_credentials(credentials);
    }
    Ok(connector)
}

async fn poll(
    config: &Config,
    since: Option<String>,
    start: Option<f64>,
    end: Option<f64>,
    no_checkpoint: bool,
    output: &str,
) -> Result<()> {
    let connector = build_connector(config)?;
    let mut checkpoint_mgr = CheckpointManager::new(&config.checkpoint_dir).await?;

    let end = end.unwrap_or_else(|| epoch_seconds(Utc::now()));
    let start = match (start, since) {
        (Some(start), _) => start,
        (None, Some(since)) => lookback_start(parse_since(&since)?)?,
        (None, None) if no_checkpoint => lookback_start(parse_since(&config.default_poll_window)?)?,
        (None, None) => {
            let default_window = parse_since(&config.default_poll_window)?;
            checkpoint_mgr.next_window_start(connector.id(), default_window)?
        }
    };

    info!(start, end, "Polling Guru");

    let walker = connector.poll_source(start, end)?;
    let (batches, documents) = match drain(walker, output).await {
        Ok(totals) => totals,
        Err(e) => {
            error!(error = %e, "Poll failed, checkpoint left unchanged");
            return Err(e);
        }
    };

    if !no_checkpoint {
        checkpoint_mgr.record_poll(connector.id(), end, batches, documents);
    }
    if checkpoint_mgr.is_dirty() {
        checkpoint_mgr.save().await?;
    }

    Ok(())
}

/// Pulls every batch and prints it; returns (batches, documents)
async fn drain(mut walker: PageWalker, output: &str) -> Result<(u32, u64)> {
    let mut batches = 0u32;
    let mut documents = 0u64;

    while let Some(batch) = walker.next_batch().await? {
        batches += 1;
        documents += batch.len() as u64;
        print_batch(batches, &batch, output)?;
    }

    if output != "json" {
        println!("\nGuru Summary");
        println!("============");
        println!("Pages:     {}", walker.pages_fetched());
        println!("Batches:   {}", batches);
        println!("Documents: {}", documents);
    }

    Ok((batches, documents))
}

fn print_batch(index: u32, batch: &Batch, output: &str) -> Result<()> {
    match output {
        "json" => {
            println!("{}", serde_json::to_string(batch)?);
        }
        _ => {
            println!("\nBatch {} ({} documents)", index, batch.len());
            for doc in batch.iter() {
                println!(
                    "  - {:<40} {} ({})",
                    doc.semantic_identifier,
                    doc.doc_updated_at.format("%Y-%m-%d %H:%M:%S"),
                    doc.id
                );
            }
        }
    }
    Ok(())
}

/// Shows credential and checkpoint status
async fn show_status(config: &Config) -> Result<()> {
    println!("\nGuru Ingestion Status");
    println!("=====================\n");

    let connector = build_connector(config)?;
    let metadata = connector.metadata();
    println!("Source:      {} ({})", metadata.name, metadata.description);

    println!(
        "Credentials: {}",
        if config.has_credentials() { "configured" } else { "missing (set GURU_USER and GURU_USER_TOKEN)" }
    );
    println!("Batch size:  {}", config.index_batch_size);

    println!("\nCheckpoints:");
    let checkpoint_mgr = CheckpointManager::new(&config.checkpoint_dir).await?;
    let checkpoints = checkpoint_mgr.all_checkpoints();
    if checkpoints.is_empty() {
        println!("  No checkpoints yet");
    } else {
        for (source_id, checkpoint) in checkpoints {
            println!(
                "  - {}: last poll {}, window end {:.3}, {} documents total",
                source_id,
                checkpoint.last_poll_at.format("%Y-%m-%d %H:%M:%S"),
                checkpoint.last_poll_end,
                checkpoint.total_documents
            );
        }
    }

    Ok(())
}
