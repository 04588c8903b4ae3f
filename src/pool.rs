//! Bounded-concurrency worker pool for the page-rendered sources.
//!
//! One wave dispatches the full page-source job list: up to `workers` jobs
//! run at once, submissions are paced, and every job resolves to a terminal
//! outcome (a recorded success or a tracked failure) before the wave
//! returns. Errors never escape the wave; a failed job lands in its source's
//! failure tracker and nothing else.

use futures::stream::{self, StreamExt};
use rand::{rng, Rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::failures::RunStates;
use crate::fetchers::{fetch_with_deadline, FetcherSet};
use crate::models::Job;

/// Delay inserted between job submissions and between retry attempts.
///
/// The delay staggers session creation cost and keeps the target sites from
/// seeing a thundering herd; a small random jitter is added so submissions
/// never align exactly. A zero delay disables pacing entirely, which is how
/// tests run.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn pause(&self) {
        if self.delay.is_zero() {
            return;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        sleep(self.delay + Duration::from_millis(jitter_ms)).await;
    }
}

/// Wave knobs: the concurrency cap and the per-job deadline.
#[derive(Debug, Clone, Copy)]
pub struct WaveConfig {
    pub workers: usize,
    pub fetch_deadline: Duration,
}

/// Execute one wave of page-source jobs.
///
/// Pacing applies between submissions while up to `workers` jobs run
/// simultaneously; the two are independent. Collecting the stream is the
/// wave barrier: the function returns only once every job has reached a
/// terminal state.
#[instrument(level = "info", skip_all, fields(jobs = jobs.len(), workers = cfg.workers))]
pub async fn run_wave(
    jobs: Vec<Job>,
    fetchers: &FetcherSet,
    states: &RunStates,
    pacer: &Pacer,
    cfg: &WaveConfig,
) {
    let total = jobs.len();
    stream::iter(jobs.into_iter().enumerate())
        .then(|(idx, job)| async move {
            if idx > 0 {
                pacer.pause().await;
            }
            job
        })
        .map(|job| run_job(job, fetchers, states, cfg))
        .buffer_unordered(cfg.workers.max(1))
        .collect::<Vec<()>>()
        .await;
    info!(total, "Wave complete");
}

async fn run_job(job: Job, fetchers: &FetcherSet, states: &RunStates, cfg: &WaveConfig) {
    let state = states.for_source(job.source);
    info!(source = %job.source, location = %job.location, "Fetching");

    match fetch_with_deadline(fetchers.for_source(job.source), &job, cfg.fetch_deadline).await {
        Ok(table) => {
            if state.record_success(&job.location, table) {
                info!(source = %job.source, location = %job.location, "Fetch succeeded");
            } else {
                warn!(
                    source = %job.source,
                    location = %job.location,
                    "Location already succeeded; dropping duplicate table"
                );
            }
        }
        Err(e) => {
            error!(
                source = %job.source,
                location = %job.location,
                error = %e,
                "Fetch failed"
            );
            state.tracker.record(job);
        }
    }
}
