//! Shared per-source run state: failure tracking and success accumulation.
//!
//! Each source owns a [`FailureTracker`] (an ordered, endpoint-deduplicated
//! queue of failed jobs) and a success sink holding every table that source
//! has produced so far. Both sides are mutex-guarded: the worker pool appends
//! failures from many in-flight jobs while the wave runs.
//!
//! A location reaching success is terminal for the run. The sink refuses a
//! second table for the same location, so a job retried after a success has
//! already landed can never double-count rows in the final output.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::models::{Job, SourceKind, Table};

/// Ordered collection of failed jobs for one source, deduplicated by
/// endpoint.
///
/// Invariant: an endpoint present here means its latest known outcome was
/// failure. Popping a job removes its endpoint, so a renewed failure re-adds
/// it cleanly at the tail.
#[derive(Debug, Default)]
pub struct FailureTracker {
    inner: Mutex<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    queue: VecDeque<Job>,
    endpoints: HashSet<String>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed job. Returns `false` (and keeps the earlier record) if
    /// the endpoint is already tracked.
    pub fn record(&self, job: Job) -> bool {
        let mut inner = self.inner.lock().expect("failure tracker lock poisoned");
        if !inner.endpoints.insert(job.endpoint.clone()) {
            return false;
        }
        inner.queue.push_back(job);
        true
    }

    /// Pop the oldest failed job, releasing its endpoint for re-recording.
    pub fn pop(&self) -> Option<Job> {
        let mut inner = self.inner.lock().expect("failure tracker lock poisoned");
        let job = inner.queue.pop_front()?;
        inner.endpoints.remove(&job.endpoint);
        Some(job)
    }

    /// Remove and return everything still tracked.
    pub fn drain(&self) -> Vec<Job> {
        let mut inner = self.inner.lock().expect("failure tracker lock poisoned");
        inner.endpoints.clear();
        inner.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("failure tracker lock poisoned")
            .queue
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run state for one source: its failure tracker plus the accumulated
/// successful tables and the terminal set of succeeded locations.
#[derive(Debug, Default)]
pub struct SourceState {
    pub tracker: FailureTracker,
    sink: Mutex<SinkInner>,
}

#[derive(Debug, Default)]
struct SinkInner {
    tables: Vec<Table>,
    succeeded: HashSet<String>,
}

impl SourceState {
    pub fn new() -> Self {
        Self {
            tracker: FailureTracker::new(),
            sink: Mutex::new(SinkInner::default()),
        }
    }

    /// Accumulate a successful table for `location`. Returns `false` and
    /// drops the table if the location already succeeded earlier in the run.
    pub fn record_success(&self, location: &str, table: Table) -> bool {
        let mut sink = self.sink.lock().expect("source sink lock poisoned");
        if !sink.succeeded.insert(location.to_string()) {
            return false;
        }
        sink.tables.push(table);
        true
    }

    pub fn has_succeeded(&self, location: &str) -> bool {
        self.sink
            .lock()
            .expect("source sink lock poisoned")
            .succeeded
            .contains(location)
    }

    /// Number of locations that have reached the terminal succeeded state.
    pub fn success_count(&self) -> usize {
        self.sink
            .lock()
            .expect("source sink lock poisoned")
            .succeeded
            .len()
    }

    /// Take every accumulated table, leaving the succeeded set intact.
    pub fn take_tables(&self) -> Vec<Table> {
        std::mem::take(
            &mut self
                .sink
                .lock()
                .expect("source sink lock poisoned")
                .tables,
        )
    }
}

/// One [`SourceState`] per source, owned by the run and passed by reference
/// to the pool, retry loops, and aggregator.
#[derive(Debug, Default)]
pub struct RunStates {
    wunderground: SourceState,
    weather_gov: SourceState,
    weather_com: SourceState,
    aeris: SourceState,
}

impl RunStates {
    pub fn new() -> Self {
        Self {
            wunderground: SourceState::new(),
            weather_gov: SourceState::new(),
            weather_com: SourceState::new(),
            aeris: SourceState::new(),
        }
    }

    pub fn for_source(&self, source: SourceKind) -> &SourceState {
        match source {
            SourceKind::Wunderground => &self.wunderground,
            SourceKind::WeatherGov => &self.weather_gov,
            SourceKind::WeatherCom => &self.weather_com,
            SourceKind::Aeris => &self.aeris,
        }
    }
}
