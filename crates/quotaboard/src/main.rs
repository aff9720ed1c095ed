//! Quotaboard import CLI.
//!
//! Submits a tabular data file to the ingestion service and polls the job
//! until it reaches a terminal status, printing progress along the way.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use quotaboard_db::QuotaboardDb;
use quotaboard_ingest::{IngestConfig, IngestService};
use quotaboard_logging::{init_logging, quotaboard_home, LogConfig};
use quotaboard_protocol::defaults::STATUS_POLL_INTERVAL_SECS;
use quotaboard_protocol::{EntityKind, ImportMode, ImportStatus, PlanPeriod};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "quotaboard", about = "Load sales data files into the Quotaboard store")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Path to the SQLite store
    #[arg(long, global = true, env = "QUOTABOARD_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a CSV or Excel file and wait for the run to finish
    Import {
        /// File to import (.csv, .xlsx, or .xls)
        file: PathBuf,

        /// Write mode: append to or replace the existing rows of the kind
        #[arg(short, long, default_value = "append")]
        mode: ImportMode,

        /// Skip schema detection and import as this kind
        /// (sales, agents, customers, or products)
        #[arg(short = 't', long = "type")]
        data_type: Option<EntityKind>,

        /// Plan period start for agent imports (YYYY-MM-DD)
        #[arg(long)]
        plan_start: Option<NaiveDate>,

        /// Plan period end for agent imports (YYYY-MM-DD)
        #[arg(long)]
        plan_end: Option<NaiveDate>,

        /// Records per transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print the final job snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count persisted rows of one kind
    Count {
        /// Entity kind: sales, agents, customers, or products
        kind: EntityKind,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "quotaboard",
        verbose: cli.verbose,
    }) {
        eprintln!("warning: logging unavailable: {e:#}");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let db_path = cli
        .db
        .unwrap_or_else(|| quotaboard_home().join("quotaboard.sqlite"));
    let db = QuotaboardDb::open(&db_path)
        .await
        .with_context(|| format!("cannot open store at {}", db_path.display()))?;

    match cli.command {
        Commands::Import {
            file,
            mode,
            data_type,
            plan_start,
            plan_end,
            batch_size,
            json,
        } => {
            let mut config = IngestConfig::default();
            if let Some(size) = batch_size {
                if size == 0 {
                    bail!("--batch-size must be at least 1");
                }
                config.batch_size = size;
            }
            let service = IngestService::new(db, config);
            let period = PlanPeriod {
                start: plan_start,
                end: plan_end,
            };

            let id = service
                .submit(&file, data_type, mode, period)
                .await
                .with_context(|| format!("cannot import {}", file.display()))?;
            info!(job = %id, file = %file.display(), "Submitted import");

            let poll = Duration::from_secs(STATUS_POLL_INTERVAL_SECS);
            let snapshot = loop {
                let snap = service.status(&id).context("job vanished from tracker")?;
                if snap.status.is_terminal() {
                    break snap;
                }
                if let Some(total) = snap.total_rows {
                    eprintln!(
                        "  {} / {} rows ({:.0}%)",
                        snap.imported_rows, total, snap.progress_percent
                    );
                } else {
                    eprintln!("  {} rows imported", snap.imported_rows);
                }
                tokio::time::sleep(poll).await;
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                let kind = snapshot
                    .data_type
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "{}: {} rows imported, {} failed ({})",
                    snapshot.status, snapshot.imported_rows, snapshot.failed_rows, kind
                );
                for entry in snapshot.error_log.iter().take(10) {
                    match entry.row {
                        Some(row) => println!("  row {}: {}", row, entry.message),
                        None => println!("  {}", entry.message),
                    }
                }
                if snapshot.error_log.len() > 10 {
                    println!("  ... and {} more errors", snapshot.error_log.len() - 10);
                }
            }

            Ok(if snapshot.status == ImportStatus::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Count { kind } => {
            let n = db.count(kind).await?;
            println!("{n}");
            Ok(ExitCode::SUCCESS)
        }
    }
}
