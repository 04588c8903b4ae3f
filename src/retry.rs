//! Bounded retry loops that drain the failure trackers.
//!
//! Retries run strictly sequentially, after the initial wave and the API
//! batch have both finished. Each iteration pops one failed job, re-invokes
//! its fetcher under the shared deadline, and either accumulates the table
//! or re-queues the job at the tail of its tracker. A total iteration budget
//! guarantees termination under persistent failure; whatever is still
//! tracked when the budget runs out is dropped from the output and reported
//! endpoint by endpoint.

use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::failures::RunStates;
use crate::fetchers::{fetch_with_deadline, FetcherSet};
use crate::models::{Job, SourceKind};
use crate::pool::Pacer;

/// Retry knobs: the total iteration budget and the per-attempt deadline.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub budget: usize,
    pub fetch_deadline: Duration,
}

/// Drain the three page-source trackers, one job per iteration, rotating
/// across sources so a persistently failing source cannot starve the others.
///
/// Returns the jobs still failing when the budget ran out.
#[instrument(level = "info", skip_all, fields(budget = cfg.budget))]
pub async fn retry_page_sources(
    states: &RunStates,
    fetchers: &FetcherSet,
    pacer: &Pacer,
    cfg: &RetryConfig,
) -> Vec<Job> {
    for source in SourceKind::PAGE_SOURCES {
        let tracker = &states.for_source(source).tracker;
        if !tracker.is_empty() {
            warn!(%source, failed = tracker.len(), "Failed endpoints before retrying");
        }
    }

    let mut iterations = 0usize;
    let mut cursor = 0usize;
    while iterations < cfg.budget {
        let Some(job) = pop_rotating(states, &mut cursor) else {
            break;
        };
        iterations += 1;
        retry_one(job, states, fetchers, cfg).await;
        pacer.pause().await;
    }
    info!(iterations, "Page-source retry loop finished");

    let mut dropped = Vec::new();
    for source in SourceKind::PAGE_SOURCES {
        dropped.extend(states.for_source(source).tracker.drain());
    }
    report_dropped(&dropped);
    dropped
}

/// Drain the Aeris tracker under the same budget. No pacing between
/// attempts: the requests are already serialized and cheap.
#[instrument(level = "info", skip_all, fields(budget = cfg.budget))]
pub async fn retry_api_source(
    states: &RunStates,
    fetchers: &FetcherSet,
    cfg: &RetryConfig,
) -> Vec<Job> {
    let state = states.for_source(SourceKind::Aeris);
    if !state.tracker.is_empty() {
        warn!(failed = state.tracker.len(), "Failed Aeris endpoints before retrying");
    }

    let mut iterations = 0usize;
    while iterations < cfg.budget {
        let Some(job) = state.tracker.pop() else {
            break;
        };
        iterations += 1;
        retry_one(job, states, fetchers, cfg).await;
    }
    info!(iterations, "Aeris retry loop finished");

    let dropped = state.tracker.drain();
    report_dropped(&dropped);
    dropped
}

async fn retry_one(job: Job, states: &RunStates, fetchers: &FetcherSet, cfg: &RetryConfig) {
    let state = states.for_source(job.source);

    // Succeeded is terminal for a location; a stale failure record must not
    // re-fetch and double-count rows.
    if state.has_succeeded(&job.location) {
        debug!(source = %job.source, location = %job.location, "Location already succeeded; not retrying");
        return;
    }

    info!(source = %job.source, location = %job.location, "Retrying failed endpoint");
    match fetch_with_deadline(fetchers.for_source(job.source), &job, cfg.fetch_deadline).await {
        Ok(table) => {
            if state.record_success(&job.location, table) {
                info!(source = %job.source, location = %job.location, "Retry succeeded");
            }
        }
        Err(e) => {
            warn!(
                source = %job.source,
                location = %job.location,
                error = %e,
                "Retry failed; re-queueing"
            );
            state.tracker.record(job);
        }
    }
}

fn pop_rotating(states: &RunStates, cursor: &mut usize) -> Option<Job> {
    let sources = SourceKind::PAGE_SOURCES;
    for offset in 0..sources.len() {
        let source = sources[(*cursor + offset) % sources.len()];
        if let Some(job) = states.for_source(source).tracker.pop() {
            *cursor = (*cursor + offset + 1) % sources.len();
            return Some(job);
        }
    }
    None
}

fn report_dropped(dropped: &[Job]) {
    for job in dropped {
        warn!(
            source = %job.source,
            location = %job.location,
            endpoint = %job.endpoint,
            "Retry budget exhausted; endpoint permanently failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::testing::{Script, ScriptedFetcher};
    use crate::models::Table;
    use crate::pool::{run_wave, WaveConfig};
    use std::sync::Arc;

    fn single_fetcher_set(fetcher: Arc<ScriptedFetcher>) -> FetcherSet {
        FetcherSet::from_parts(
            fetcher.clone(),
            fetcher.clone(),
            fetcher.clone(),
            fetcher,
        )
    }

    fn retry_cfg(budget: usize) -> RetryConfig {
        RetryConfig {
            budget,
            fetch_deadline: Duration::from_secs(30),
        }
    }

    /// Three stations; station 2 fails its first attempt and succeeds on
    /// retry. The final output covers all three and the tracker ends empty.
    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_a_transient_failure() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(SourceKind::Wunderground)
                .script("https://w.example/1", vec![Script::Rows(2)])
                .script("https://w.example/2", vec![Script::Fail, Script::Rows(2)])
                .script("https://w.example/3", vec![Script::Rows(2)]),
        );
        let set = single_fetcher_set(fetcher.clone());
        let states = RunStates::new();
        let jobs = (1..=3)
            .map(|i| {
                Job::new(
                    SourceKind::Wunderground,
                    format!("https://w.example/{i}"),
                    format!("Station {i}"),
                )
            })
            .collect();

        let wave_cfg = WaveConfig {
            workers: 12,
            fetch_deadline: Duration::from_secs(30),
        };
        run_wave(jobs, &set, &states, &Pacer::disabled(), &wave_cfg).await;

        let state = states.for_source(SourceKind::Wunderground);
        assert_eq!(state.tracker.len(), 1);

        let dropped =
            retry_page_sources(&states, &set, &Pacer::disabled(), &retry_cfg(100)).await;

        assert!(dropped.is_empty());
        assert!(state.tracker.is_empty());
        assert_eq!(state.success_count(), 3);

        // Row accounting: every job that ever succeeded contributes its rows
        // exactly once.
        let merged = Table::concat(state.take_tables());
        assert_eq!(merged.row_count(), 6);
    }

    /// Every attempt fails: the loop performs exactly `budget` iterations,
    /// then the survivors are dropped and reported.
    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_stops_at_the_budget() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(SourceKind::WeatherGov)
                .script("https://g.example/1", vec![Script::Fail])
                .script("https://g.example/2", vec![Script::Fail]),
        );
        let set = single_fetcher_set(fetcher.clone());
        let states = RunStates::new();
        let state = states.for_source(SourceKind::WeatherGov);
        state.tracker.record(Job::new(
            SourceKind::WeatherGov,
            "https://g.example/1",
            "Station 1",
        ));
        state.tracker.record(Job::new(
            SourceKind::WeatherGov,
            "https://g.example/2",
            "Station 2",
        ));

        let dropped =
            retry_page_sources(&states, &set, &Pacer::disabled(), &retry_cfg(100)).await;

        assert_eq!(fetcher.calls(), 100);
        assert_eq!(dropped.len(), 2);
        assert_eq!(state.success_count(), 0);
        assert!(state.tracker.is_empty());
    }

    /// A stale failure record for a location that has since succeeded is
    /// discarded without a fetch.
    #[tokio::test(start_paused = true)]
    async fn test_retry_skips_an_already_succeeded_location() {
        let fetcher = Arc::new(ScriptedFetcher::new(SourceKind::Wunderground));
        let set = single_fetcher_set(fetcher.clone());
        let states = RunStates::new();
        let state = states.for_source(SourceKind::Wunderground);

        let mut table = Table::new(["hour"]);
        table.push_row(vec!["1 pm".into()]);
        state.record_success("Miami FL", table);
        state.tracker.record(Job::new(
            SourceKind::Wunderground,
            "https://w.example/miami",
            "Miami FL",
        ));

        let dropped =
            retry_page_sources(&states, &set, &Pacer::disabled(), &retry_cfg(100)).await;

        assert_eq!(fetcher.calls(), 0);
        assert!(dropped.is_empty());
        assert!(state.tracker.is_empty());
        assert_eq!(state.success_count(), 1);
    }

    /// With a budget of one, only the first source in rotation gets its
    /// attempt; the other's job is dropped and reported.
    #[tokio::test(start_paused = true)]
    async fn test_budget_bounds_work_across_sources() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(SourceKind::Wunderground)
                .script("https://w.example/1", vec![Script::Rows(1)])
                .script("https://g.example/1", vec![Script::Rows(1)]),
        );
        let set = single_fetcher_set(fetcher.clone());
        let states = RunStates::new();
        states.for_source(SourceKind::Wunderground).tracker.record(Job::new(
            SourceKind::Wunderground,
            "https://w.example/1",
            "Station 1",
        ));
        states.for_source(SourceKind::WeatherGov).tracker.record(Job::new(
            SourceKind::WeatherGov,
            "https://g.example/1",
            "Station 1",
        ));

        let dropped = retry_page_sources(&states, &set, &Pacer::disabled(), &retry_cfg(1)).await;

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].source, SourceKind::WeatherGov);
        assert_eq!(
            states.for_source(SourceKind::Wunderground).success_count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_retry_respects_its_budget() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(SourceKind::Aeris)
                .script("https://api.example/miami", vec![Script::Fail]),
        );
        let set = single_fetcher_set(fetcher.clone());
        let states = RunStates::new();
        states.for_source(SourceKind::Aeris).tracker.record(Job::new(
            SourceKind::Aeris,
            "https://api.example/miami",
            "Miami FL",
        ));

        let dropped = retry_api_source(&states, &set, &retry_cfg(3)).await;

        assert_eq!(fetcher.calls(), 3);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].endpoint, "https://api.example/miami");
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_retry_recovers_on_a_later_pass() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(SourceKind::Aeris)
                .script("https://api.example/miami", vec![Script::Fail, Script::Rows(4)]),
        );
        let set = single_fetcher_set(fetcher.clone());
        let states = RunStates::new();
        let state = states.for_source(SourceKind::Aeris);
        state.tracker.record(Job::new(
            SourceKind::Aeris,
            "https://api.example/miami",
            "Miami FL",
        ));

        let dropped = retry_api_source(&states, &set, &retry_cfg(100)).await;

        assert_eq!(fetcher.calls(), 2);
        assert!(dropped.is_empty());
        assert!(state.has_succeeded("Miami FL"));
    }
}
