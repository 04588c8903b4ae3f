//! # Forecast Harvest
//!
//! A resilient multi-source harvester that collects hourly weather forecast
//! data for a roster of weather stations and writes one CSV file per source
//! per run.
//!
//! ## Sources
//!
//! - Wunderground.com, Weather.gov, and Weather.com (page-rendered, fetched
//!   through a bounded worker pool)
//! - The Aeris forecast API (JSON, queried sequentially)
//!
//! ## Usage
//!
//! ```sh
//! forecast_harvest -r ./stations.yaml -o ./CSV
//! ```
//!
//! ## Architecture
//!
//! The run is a pipeline:
//! 1. **Dispatch**: Build one job per (source, station) pair from the roster
//! 2. **Initial pass**: Page jobs run through the worker pool (12 at a time,
//!    paced submission) while the API batch runs sequentially alongside
//! 3. **Retry**: Failed jobs are re-attempted one at a time under a bounded
//!    iteration budget
//! 4. **Output**: Each source's successful tables are concatenated and
//!    written to a run-stamped CSV
//!
//! Partial output is expected and fine: a station that keeps failing is
//! reported and dropped, and a source with no data at all is skipped without
//! taking the other sources down with it.

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod failures;
mod fetchers;
mod models;
mod outputs;
mod pool;
mod retry;
mod roster;
mod utils;

use cli::Cli;
use failures::RunStates;
use fetchers::FetcherSet;
use models::SourceKind;
use pool::{run_wave, Pacer, WaveConfig};
use retry::{retry_api_source, retry_page_sources, RetryConfig};
use roster::Roster;
use utils::{ensure_writable_dir, run_stamp};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("forecast_harvest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: ensure the output dir is writable before any fetching
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Load the roster and build the dispatch plan ----
    let roster = Roster::load(&args.roster)?;
    let page_jobs = roster.page_jobs();
    let api_pairs = roster.api_jobs();
    info!(
        stations = roster.stations.len(),
        page_jobs = page_jobs.len(),
        api_jobs = api_pairs.len(),
        "Dispatch plan ready"
    );

    let fetch_deadline = Duration::from_secs(args.fetch_timeout_secs);
    let fetchers = FetcherSet::new(args.engine, fetch_deadline)?;
    let states = RunStates::new();
    let pacer = if args.pacing_secs == 0 {
        Pacer::disabled()
    } else {
        Pacer::new(Duration::from_secs(args.pacing_secs))
    };
    let wave_cfg = WaveConfig {
        workers: args.workers,
        fetch_deadline,
    };
    let retry_cfg = RetryConfig {
        budget: args.retry_budget,
        fetch_deadline,
    };

    // ---- Initial pass ----
    // The page wave and the sequential API batch run alongside each other;
    // both have reached terminal outcomes for every job before retries start.
    tokio::join!(
        run_wave(page_jobs, &fetchers, &states, &pacer, &wave_cfg),
        fetchers::aeris::fetch_batch(
            fetchers.for_source(SourceKind::Aeris),
            &api_pairs,
            states.for_source(SourceKind::Aeris),
            fetch_deadline,
        ),
    );

    // ---- Retry passes, strictly sequential ----
    let dropped_pages = retry_page_sources(&states, &fetchers, &pacer, &retry_cfg).await;
    let dropped_api = retry_api_source(&states, &fetchers, &retry_cfg).await;
    if !dropped_pages.is_empty() || !dropped_api.is_empty() {
        warn!(
            pages = dropped_pages.len(),
            api = dropped_api.len(),
            "Endpoints permanently failed this run"
        );
    }

    // ---- Write one CSV per source ----
    // Each write is independently scoped; one source failing to aggregate or
    // write must not stop the others.
    let stamp = run_stamp();
    let mut wrote_any = false;
    for source in [
        SourceKind::Wunderground,
        SourceKind::WeatherGov,
        SourceKind::WeatherCom,
        SourceKind::Aeris,
    ] {
        let state = states.for_source(source);
        info!(%source, succeeded = state.success_count(), "Aggregating source");
        let tables = state.take_tables();
        match outputs::csv::write_source_csv(source, tables, &args.output_dir, &stamp).await {
            Ok(path) => {
                wrote_any = true;
                info!(%source, path = %path, "Output written");
            }
            Err(e) => {
                error!(%source, error = %e, "Failed to write output");
            }
        }
    }

    // A run with nothing to show for any source is the only data-path
    // failure that is fatal.
    if !wrote_any {
        error!("No source produced any usable data");
        return Err("no usable data across all sources".into());
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
