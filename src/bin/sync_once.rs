use std::io::{self, Write};
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use sqlx::postgres::PgPoolOptions;

use mailsync_api::models::SyncMode;
use mailsync_api::sync::{
    ImapMailboxClient, PgAccountRegistry, PgSyncStore, SyncConfig, SyncOrchestrator,
    run_migrations,
};

#[derive(Parser, Debug)]
#[command(
    name = "sync_once",
    about = "Run one mail sync pass against DATABASE_URL and print the result as JSON",
    group(ArgGroup::new("single").args(["mode", "limit"]).multiple(true).requires("account"))
)]
struct Args {
    /// Sync only this account instead of every active one.
    #[arg(long)]
    account: Option<i32>,

    /// `incremental` or `full`; only with `--account`.
    #[arg(long, value_parser = parse_mode)]
    mode: Option<SyncMode>,

    /// Message cap for a single-account run.
    #[arg(long)]
    limit: Option<u32>,

    /// Skip applying pending migrations first.
    #[arg(long)]
    no_migrate: bool,
}

fn parse_mode(value: &str) -> Result<SyncMode, String> {
    value.parse()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    if !args.no_migrate {
        run_migrations(&pool).await?;
    }

    let orchestrator = SyncOrchestrator::new(
        Arc::new(PgAccountRegistry::new(pool.clone())),
        Arc::new(PgSyncStore::new(pool.clone())),
        Arc::new(ImapMailboxClient::new()),
        SyncConfig::from_env(),
    );

    let output = match args.account {
        Some(account_id) => {
            let mode = args.mode.unwrap_or(SyncMode::Incremental);
            match orchestrator.run_single(account_id, mode, args.limit).await {
                Ok(result) => serde_json::to_string_pretty(&result)?,
                Err(e) => {
                    writeln!(io::stderr(), "error: {e}")?;
                    std::process::exit(1);
                }
            }
        }
        None => match orchestrator.run_scheduled().await {
            Ok(report) => serde_json::to_string_pretty(&report)?,
            Err(e) => {
                writeln!(io::stderr(), "error: {e}")?;
                std::process::exit(1);
            }
        },
    };

    writeln!(io::stdout(), "{output}")?;
    pool.close().await;
    Ok(())
}
