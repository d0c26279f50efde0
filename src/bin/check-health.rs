//! CLI health probe for the quote store
//!
//! Usage:
//!   cargo run --bin check-health
//!   cargo run --bin check-health -- --wait 5
//!   cargo run --bin check-health -- --supervisor
//!
//! Prints the report as JSON and exits 0 when healthy, 1 otherwise.

use clap::Parser;
use quotes_storage::config::Config;
use quotes_storage::health::{HealthChecker, HealthReport, SupervisorReport};
use quotes_storage::logging;
use quotes_storage::pool::create_pool;
use std::time::Duration;
use tracing::info;

const RETRY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "check-health")]
#[command(about = "Check TimescaleDB connectivity, extension and quote hypertable.", version)]
struct Cli {
    /// Retry until healthy, up to this many attempts
    #[arg(long, default_value_t = 1)]
    wait: u32,

    /// Print the supervisor envelope instead of the raw report
    #[arg(long)]
    supervisor: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    logging::init_stderr();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pool = create_pool(&config)?;
    let checker = HealthChecker::new(pool, config.table.clone());

    let attempts = cli.wait.max(1);
    let report = wait_for_healthy(&checker, attempts).await;
    let healthy = report.overall_status.is_healthy();

    let output = if cli.supervisor {
        serde_json::to_string_pretty(&SupervisorReport::from(report))?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{}", output);

    std::process::exit(if healthy { 0 } else { 1 });
}

async fn wait_for_healthy(checker: &HealthChecker, attempts: u32) -> HealthReport {
    let mut attempt = 1;
    loop {
        let report = checker.check_all().await;
        if report.overall_status.is_healthy() || attempt >= attempts {
            return report;
        }

        info!(
            "Waiting for TimescaleDB (attempt {}/{}): {:?}",
            attempt, attempts, report.overall_status
        );
        attempt += 1;
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
}
