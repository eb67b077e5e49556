mod assembler;
mod config;
mod errors;
mod graph;
mod loader;
mod metrics;
mod models;
mod moderation;
mod pipeline;
mod storage;
mod utils;
mod writer;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::loader::load_accounts;
use crate::pipeline::{AccountState, Pipeline};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "ads-ingest", about = "Daily Meta ads performance ingestion", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch insights for every account and upsert them
    Run {
        /// First day to ingest (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Last day to ingest (YYYY-MM-DD, default: today)
        #[arg(long)]
        until: Option<NaiveDate>,

        /// Trailing window in days when --since is not given
        #[arg(long)]
        days: Option<u32>,

        /// Accounts file (default: pipeline.accounts_path)
        #[arg(long, env = "ADS_ACCOUNTS_FILE")]
        accounts: Option<PathBuf>,

        /// Accounts processed at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Restrict the run to these account ids (repeatable)
        #[arg(long = "only", value_name = "ACCOUNT_ID")]
        only: Vec<String>,
    },

    /// Apply schema migrations without ingesting
    Migrate,

    /// Show database statistics
    Stats,

    /// List configured ad accounts
    Accounts {
        #[arg(long)]
        accounts: Option<PathBuf>,
    },

    /// Record moderation verdicts (JSON) for one account
    ApplyFlags {
        #[arg(long)]
        account: String,

        /// Verdict document; a single object or an array
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "ads_ingest=info,warn",
        1 => "ads_ingest=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Run {
            since,
            until,
            days,
            accounts,
            concurrency,
            only,
        } => {
            if let Some(n) = concurrency {
                config.pipeline.concurrency = n;
            }
            config.validate()?;

            let path = accounts.unwrap_or_else(|| config.pipeline.accounts_path.clone());
            let mut accounts = load_accounts(&path)?;
            if !only.is_empty() {
                let only: Vec<&str> = only.iter().map(|id| id.trim_start_matches("act_")).collect();
                accounts.retain(|a| only.contains(&a.account_id.as_str()));
                if accounts.is_empty() {
                    bail!("none of {:?} are configured in {:?}", only, path);
                }
            }

            let window = utils::resolve_window(
                since,
                until,
                days.unwrap_or(config.pipeline.lookback_days),
                Utc::now().date_naive(),
            )?;

            let pipeline = Pipeline::from_config(&config)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                warn!("Interrupt received, no new accounts will start");
                on_interrupt.cancel();
            });

            let _t = utils::Timer::start("ingest run");
            let summary = pipeline.run(accounts, window, &cancel).await?;

            println!("─────────────────────────────────────────────");
            let run = summary.run_id.map(|id| format!("run #{id}")).unwrap_or("run (unrecorded)".into());
            println!("  Ads ingest {}: {} → {}", run, summary.window.since, summary.window.until);
            println!("─────────────────────────────────────────────");
            for o in &summary.outcomes {
                match o.state {
                    AccountState::Done => println!(
                        "  DONE     {:<28} {:>8} rows  {:>4} malformed",
                        o.account.business_name,
                        utils::fmt_number(o.rows_written as i64),
                        o.rows_dropped
                    ),
                    _ => println!(
                        "  SKIPPED  {:<28} {}",
                        o.account.business_name,
                        o.reason.as_deref().unwrap_or("-")
                    ),
                }
            }
            println!("─────────────────────────────────────────────");
            println!(
                "  {} done, {} skipped, {} rows",
                summary.done(),
                summary.skipped(),
                utils::fmt_number(summary.rows_written() as i64)
            );
            if summary.rows_dropped() > 0 {
                println!("  {} malformed insight rows dropped", utils::fmt_number(summary.rows_dropped() as i64));
            }
            if summary.rows_dead_lettered() > 0 {
                println!(
                    "  {} rows dead-lettered under {:?}",
                    summary.rows_dead_lettered(),
                    config.storage.dead_letter_dir
                );
            }
        }

        Command::Migrate => {
            open_repo(&config)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            // A database nobody has ingested into yet has no tables; stats then report zeros.
            repo.run_migrations()?;
            let rows = repo.row_count()?;
            let accounts = repo.account_count()?;
            let flagged = repo.flagged_count()?;
            let (min, max) = repo.date_range().unwrap_or((None, None));
            let last_run = repo.last_run_status().ok().flatten();
            println!("─────────────────────────────────");
            println!("  Ads ingest: database stats");
            println!("─────────────────────────────────");
            println!("  Accounts : {}", utils::fmt_number(accounts));
            println!("  Rows     : {}", utils::fmt_number(rows));
            println!("  Flagged  : {}", utils::fmt_number(flagged));
            println!("  From     : {}", min.map(|d| d.to_string()).unwrap_or("-".into()));
            println!("  To       : {}", max.map(|d| d.to_string()).unwrap_or("-".into()));
            if let Some((status, finished)) = last_run {
                let at = finished.map(|t| t.to_string()).unwrap_or("in progress".into());
                println!("  Last run : {} ({})", status, at);
            }
            println!("─────────────────────────────────");
        }

        Command::Accounts { accounts } => {
            let path = accounts.unwrap_or_else(|| config.pipeline.accounts_path.clone());
            let accounts = load_accounts(&path)?;
            println!("{} accounts:", accounts.len());
            for a in &accounts {
                println!("  {:<10} {:<20} {}", a.team, a.account_id, a.business_name);
            }
        }

        Command::ApplyFlags { account, file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Cannot read {:?}", file))?;
            let verdicts = moderation::parse_verdicts(&text)?;
            let repo = open_repo(&config)?;
            let account = account.trim_start_matches("act_");

            let mut applied = 0usize;
            for v in &verdicts {
                if repo.apply_verdict(account, v)? {
                    applied += 1;
                } else {
                    warn!(account, ad = %v.ad_id, date = %v.date, "No stored row for verdict");
                }
            }
            info!("{} of {} verdicts applied", applied, verdicts.len());
            println!("{} of {} verdicts applied.", applied, verdicts.len());
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    Repository::open(&config.storage.db_path, config.writer.moderation)
}
