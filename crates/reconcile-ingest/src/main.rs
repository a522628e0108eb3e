//! Reconcile - parallel dump ingest tool

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reconcile_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use reconcile_ingest::planner::plan;
use reconcile_ingest::{
    CountingStore, Edition, EditionParser, Pipeline, PipelineConfig, PipelineError, PipelineReport,
    SqliteStore, StoreConfig,
};
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "reconcile")]
#[command(author, version, about = "Parallel chunked ingest of Open Library dumps")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a dump and write its editions to the database
    Ingest(IngestArgs),

    /// Print the chunk ranges a dump would be split into
    Plan {
        /// Dump file
        #[arg(short, long)]
        dump: PathBuf,

        /// Target chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
    },
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Dump file
    #[arg(short, long)]
    dump: PathBuf,

    /// SQLite database URL (defaults to DATABASE_URL, then sqlite:reconcile.db)
    #[arg(long)]
    database_url: Option<String>,

    /// Target chunk size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Number of chunk workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Rows per grouped insert
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Parse and count records without writing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("reconcile")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        }
    };

    let result = match cli.command {
        Command::Ingest(args) => ingest(args).await,
        Command::Plan { dump, chunk_size } => print_plan(dump, chunk_size).await,
    };

    if let Err(e) = result {
        if failure_level(&e) == Level::ERROR {
            error!(error = %e, "Command failed");
        } else {
            warn!(error = %e, "Command stopped on a recoverable error");
        }
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn ingest(args: IngestArgs) -> Result<()> {
    let mut config = PipelineConfig::from_env();
    if let Some(bytes) = args.chunk_size {
        config = config.with_chunk_size(bytes);
    }
    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers);
    }
    if let Some(rows) = args.batch_size {
        config = config.with_batch_size(rows);
    }

    let pipeline = Pipeline::new(config)?;
    let cancel = shutdown_token();

    let report = if args.dry_run {
        let mut store = CountingStore::new();
        pipeline
            .run(&args.dump, EditionParser::new(), &mut store, cancel)
            .await?
    } else {
        let store_config = args
            .database_url
            .map(StoreConfig::new)
            .unwrap_or_else(StoreConfig::from_env);

        let mut store = SqliteStore::<Edition>::connect(&store_config)
            .await
            .with_context(|| format!("Failed to open {}", store_config.database_url))?;

        let result = pipeline
            .run(&args.dump, EditionParser::new(), &mut store, cancel)
            .await;
        store.close().await;
        result?
    };

    print_report(&report, args.dry_run);
    Ok(())
}

async fn print_plan(dump: PathBuf, chunk_size: Option<u64>) -> Result<()> {
    let mut config = PipelineConfig::from_env();
    if let Some(bytes) = chunk_size {
        config = config.with_chunk_size(bytes);
    }
    config.validate()?;

    let chunks = tokio::task::spawn_blocking(move || plan(dump, &config))
        .await
        .context("Planner task failed")??;

    println!("{:>6}  {:>14}  {:>14}  {:>12}", "chunk", "start", "end", "bytes");
    for chunk in &chunks {
        println!(
            "{:>6}  {:>14}  {:>14}  {:>12}",
            chunk.index,
            chunk.start,
            chunk.end,
            chunk.span()
        );
    }
    info!(chunks = chunks.len(), "Plan complete");
    Ok(())
}

/// Log level for a failed command
///
/// Pipeline errors that only cost a line or a chunk are warnings; anything
/// else, including errors from outside the pipeline, is an error.
fn failure_level(e: &anyhow::Error) -> Level {
    match e.downcast_ref::<PipelineError>() {
        Some(pe) if !pe.is_fatal() => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Token cancelled on the first Ctrl-C
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, flushing records already parsed");
            token.cancel();
        }
    });

    cancel
}

fn print_report(report: &PipelineReport, dry_run: bool) {
    println!("Run {}", report.run_id);
    println!("  chunks           {}", report.chunks);
    println!("  lines read       {}", report.lines_read);
    println!("  records emitted  {}", report.records_emitted);
    println!("  records skipped  {}", report.records_skipped);
    if dry_run {
        println!("  records counted  {} (dry run)", report.records_written);
    } else {
        println!("  records written  {}", report.records_written);
    }
    println!("  batches flushed  {}", report.batches_flushed);
    println!("  parse errors     {}", report.parse_errors);
    println!("  read faults      {}", report.read_faults);
    if report.bytes_unread > 0 {
        println!("  bytes unread     {}", report.bytes_unread);
    }
    println!("  elapsed          {:.2}s", report.elapsed.as_secs_f64());

    if !report.error_samples.is_empty() {
        println!("First errors:");
        for message in &report.error_samples {
            println!("  {}", message);
        }
    }

    if report.cancelled {
        println!("Run was cancelled; only whole batches were written.");
    }
}
