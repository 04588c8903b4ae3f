//! Command-line interface definitions for the forecast harvester.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Timing knobs default to the production values; tests and operators can
//! turn pacing off entirely with `--pacing-secs 0`.

use clap::Parser;

use crate::fetchers::RenderEngine;

/// Command-line arguments for the forecast harvester.
///
/// # Examples
///
/// ```sh
/// # Basic usage with a station roster
/// forecast_harvest -r ./stations.yaml -o ./CSV
///
/// # Firefox user agent, smaller pool, no submission pacing
/// forecast_harvest -r ./stations.yaml --engine firefox --workers 4 --pacing-secs 0
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML station roster
    #[arg(short, long)]
    pub roster: String,

    /// Output directory for the per-source CSV files
    #[arg(short, long, default_value = "CSV")]
    pub output_dir: String,

    /// Rendering engine the page fetchers present themselves as
    #[arg(long, value_enum, default_value_t = RenderEngine::Chrome)]
    pub engine: RenderEngine,

    /// Maximum number of page fetch jobs running at once
    #[arg(long, default_value_t = 12)]
    pub workers: usize,

    /// Seconds between job submissions and between retry attempts (0 disables)
    #[arg(long, default_value_t = 7)]
    pub pacing_secs: u64,

    /// Seconds to wait for a page's content marker or an API response
    #[arg(long, default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// Maximum number of retry iterations per retry loop
    #[arg(long, default_value_t = 100)]
    pub retry_budget: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(&[
            "forecast_harvest",
            "--roster",
            "./stations.yaml",
            "--output-dir",
            "./out",
        ]);

        assert_eq!(cli.roster, "./stations.yaml");
        assert_eq!(cli.output_dir, "./out");
        assert_eq!(cli.workers, 12);
        assert_eq!(cli.pacing_secs, 7);
        assert_eq!(cli.fetch_timeout_secs, 30);
        assert_eq!(cli.retry_budget, 100);
    }

    #[test]
    fn test_cli_defaults_output_dir() {
        let cli = Cli::parse_from(&["forecast_harvest", "-r", "/tmp/stations.yaml"]);

        assert_eq!(cli.output_dir, "CSV");
        assert!(matches!(cli.engine, RenderEngine::Chrome));
    }

    #[test]
    fn test_cli_engine_choice() {
        let cli = Cli::parse_from(&[
            "forecast_harvest",
            "-r",
            "/tmp/stations.yaml",
            "--engine",
            "firefox",
            "--pacing-secs",
            "0",
        ]);

        assert!(matches!(cli.engine, RenderEngine::Firefox));
        assert_eq!(cli.pacing_secs, 0);
    }
}
