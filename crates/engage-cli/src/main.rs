//! engage-admin: operator tool for engage.
//!
//! Runs interview pairing batches, administers the interview pool and
//! availability, and streams message events from stdin into the counter
//! table through the aggregation buffer.

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use engage_db::{Database, MemberId, PoolConfig};
use engage_jobs::BufferConfig;

#[derive(Parser)]
#[command(name = "engage-admin")]
#[command(author, version, about = "Operator tool for engage")]
#[command(propagate_version = true)]
struct Cli {
    /// Database URL (falls back to DATABASE_URL)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Skip running migrations on startup
    #[arg(long)]
    no_migrate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair everyone in the interview pool
    Pair {
        /// Compute the pairing without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Seed for the odd-pool exclusion draw
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Inspect or change the interview pool
    Pool {
        #[command(subcommand)]
        action: PoolAction,
    },

    /// Store a member's weekly availability from a JSON grid file
    Availability {
        member_id: i64,

        /// File holding a 7x48 array of booleans
        grid: PathBuf,
    },

    /// Register a chat user as a member
    Member {
        external_id: u64,
        username: String,
    },

    /// Show a member's message counters
    Counts { member_id: i64 },

    /// Read JSON message events from stdin, one per line, and count them
    Ingest,
}

#[derive(Subcommand)]
enum PoolAction {
    /// List pooled member ids
    List,
    /// Add a member to the pool
    Add { member_id: i64 },
    /// Remove everyone from the pool
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init();

    // Validate before touching the database.
    let buffer_config = if matches!(cli.command, Commands::Ingest) {
        let config = BufferConfig::from_env();
        config.validate()?;
        Some(config)
    } else {
        None
    };

    let db = Database::connect_with_config(&cli.database_url, PoolConfig::from_env()).await?;
    if !cli.no_migrate {
        info!(subsystem = "cli", op = "migrate", "Running database migrations");
        db.migrate().await?;
    }

    match cli.command {
        Commands::Pair { dry_run, seed } => print_json(&commands::pair(&db, dry_run, seed).await?),
        Commands::Pool { action } => match action {
            PoolAction::List => print_json(&db.interview_pool.list().await?),
            PoolAction::Add { member_id } => {
                let added = db.interview_pool.add(MemberId(member_id)).await?;
                print_json(&serde_json::json!({ "member_id": member_id, "added": added }))
            }
            PoolAction::Clear => {
                let removed = db.interview_pool.clear().await?;
                print_json(&serde_json::json!({ "removed": removed }))
            }
        },
        Commands::Availability { member_id, grid } => {
            let matrix = commands::read_grid(&grid)?;
            db.availability.set(MemberId(member_id), &matrix).await?;
            print_json(&serde_json::json!({
                "member_id": member_id,
                "slots": matrix.slot_count(),
            }))
        }
        Commands::Member {
            external_id,
            username,
        } => {
            let member_id = commands::register_member(&db, external_id, &username).await?;
            print_json(&serde_json::json!({ "member_id": member_id }))
        }
        Commands::Counts { member_id } => {
            let counts: Vec<_> = db
                .counters
                .counts_for_member(MemberId(member_id))
                .await?
                .into_iter()
                .map(|(channel_id, count)| {
                    serde_json::json!({ "channel_id": channel_id.to_string(), "count": count })
                })
                .collect();
            print_json(&counts)
        }
        Commands::Ingest => {
            let config = buffer_config.unwrap_or_default();
            print_json(&commands::ingest(&db, config).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
