//! Historical daily backfill into the quote table
//!
//! Tickers are processed sequentially with a fixed delay between feed
//! requests. Progress is checkpointed to a JSON file after every ticker so an
//! interrupted run can resume where it stopped.

mod checkpoint;
mod feed;
mod runner;

pub use checkpoint::{BackfillCheckpoint, CheckpointState, FailedTicker, DEFAULT_CHECKPOINT_FILE};
pub use feed::{DailyBar, DailyBarFeed, FeedError, YahooChartFeed, YAHOO_CHART_BASE};
pub use runner::{
    coverage_report, find_gaps, BackfillRunner, BackfillStats, CoverageReport, DateRange, Gap,
    DEFAULT_DELAY, DEFAULT_SOURCE, MAX_GAP_DAYS,
};

use crate::error::Result;
use std::path::Path;
use tracing::info;

/// One ticker per line; blank lines and `#` comments are skipped
pub fn load_tickers(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let tickers = parse_tickers(&content);
    info!("Loaded {} tickers from {}", tickers.len(), path.display());
    Ok(tickers)
}

fn parse_tickers(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_tickers() {
        let content = "# S&P sample\nAAPL\n\n  MSFT  \n#GOOG\nBRK-B\n";
        assert_eq!(parse_tickers(content), vec!["AAPL", "MSFT", "BRK-B"]);
    }

    #[test]
    fn test_load_tickers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "AAPL").unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "SPY").unwrap();

        let tickers = load_tickers(file.path()).unwrap();
        assert_eq!(tickers, vec!["AAPL", "SPY"]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_tickers(&dir.path().join("missing.txt")).is_err());
    }
}
