//! Historical daily quote backfill
//!
//! Usage:
//!   cargo run --bin backfill -- --tickers-file tickers.txt
//!   cargo run --bin backfill -- --tickers-file tickers.txt --start-date 2020-01-01 --no-resume

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use quotes_storage::backfill::{
    load_tickers, BackfillCheckpoint, BackfillRunner, DateRange, YahooChartFeed,
    DEFAULT_CHECKPOINT_FILE,
};
use quotes_storage::config::Config;
use quotes_storage::logging;
use quotes_storage::pool::connect;
use quotes_storage::repository::QuoteRepository;
use quotes_storage::store::PgQuoteStore;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const DEFAULT_START_DATE: &str = "2017-01-01";

#[derive(Parser)]
#[command(name = "backfill")]
#[command(about = "Backfill historical daily quotes into TimescaleDB.", version)]
struct Cli {
    /// File with one ticker per line
    #[arg(long)]
    tickers_file: PathBuf,

    /// Start date (YYYY-MM-DD)
    #[arg(long, default_value = DEFAULT_START_DATE)]
    start_date: NaiveDate,

    /// End date (YYYY-MM-DD), exclusive. Default: today
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Start fresh (ignore checkpoint)
    #[arg(long)]
    no_resume: bool,

    /// Checkpoint file location
    #[arg(long, default_value = DEFAULT_CHECKPOINT_FILE)]
    checkpoint: PathBuf,

    /// Pause between tickers in milliseconds
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _guard = logging::init("backfill", &config.log_dir);

    let range = DateRange {
        start: cli.start_date,
        end: cli.end_date.unwrap_or_else(|| Utc::now().date_naive()),
    };
    anyhow::ensure!(
        range.start < range.end,
        "start date {} must be before end date {}",
        range.start,
        range.end
    );

    let tickers = load_tickers(&cli.tickers_file)
        .with_context(|| format!("failed to read {}", cli.tickers_file.display()))?;

    let pool = connect(&config).await?;
    let repo = QuoteRepository::new(PgQuoteStore::new(pool.clone(), config.table.clone()))
        .with_batch_size(config.insert_batch_size);

    let runner = BackfillRunner::new(
        YahooChartFeed::new()?,
        repo,
        BackfillCheckpoint::new(&cli.checkpoint),
    )
    .with_delay(Duration::from_millis(cli.delay_ms));

    let stats = runner.run(&tickers, range, !cli.no_resume).await?;
    pool.close();

    info!("{}", "=".repeat(60));
    info!("BACKFILL SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Total tickers: {}", stats.total_tickers);
    info!("Completed: {}", stats.completed);
    info!("Failed: {}", stats.failed);
    info!("Total records: {}", stats.total_records);
    info!("Completion rate: {:.1}%", stats.completion_rate());

    Ok(())
}
