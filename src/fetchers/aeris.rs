//! Aeris forecast API fetcher.
//!
//! Unlike the page sources, Aeris is queried directly as JSON and outside the
//! worker pool: requests run strictly one at a time to stay inside the API's
//! rate constraints. Each response's `response[0].periods` array becomes one
//! table restricted to a fixed subset of the fields Aeris publishes (the full
//! period objects roughly double the output size for fields nobody reads).

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::{fetch_with_deadline, Fetcher};
use crate::failures::SourceState;
use crate::models::{FetchError, Job, SourceKind, Table};

/// The period fields kept in the output, in column order.
const FIELDS: [&str; 25] = [
    "timestamp",
    "dateTimeISO",
    "tempC",
    "tempF",
    "feelslikeF",
    "dewpointF",
    "humidity",
    "pressureMB",
    "pressureIN",
    "windDir",
    "windDirDEG",
    "windSpeedMPH",
    "windGustMPH",
    "precipMM",
    "precipIN",
    "precipRateMM",
    "precipRateIN",
    "pop",
    "visibilityKM",
    "visibilityMI",
    "sky",
    "weather",
    "weatherPrimary",
    "spressureMB",
    "spressureIN",
];

pub struct AerisFetcher {
    client: reqwest::Client,
}

impl AerisFetcher {
    pub fn new(request_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for AerisFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::Aeris
    }

    #[instrument(level = "info", skip(self, endpoint), fields(location = %location))]
    async fn fetch(&self, endpoint: &str, location: &str) -> Result<Table, FetchError> {
        let payload: Value = self
            .client
            .get(endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut table = parse_periods(&payload)?;
        table.add_column("WS", location);
        info!(rows = table.row_count(), "Transformed Aeris periods");
        Ok(table)
    }
}

/// Issue one request per `(endpoint, location)` pair, strictly in sequence.
///
/// Successes accumulate in the source state; failures are recorded in its
/// tracker and isolated from each other. Never fails as a whole.
#[instrument(level = "info", skip_all, fields(pairs = pairs.len()))]
pub async fn fetch_batch(
    fetcher: &dyn Fetcher,
    pairs: &[(String, String)],
    state: &SourceState,
    deadline: Duration,
) {
    for (endpoint, location) in pairs {
        let job = Job::new(SourceKind::Aeris, endpoint.clone(), location.clone());
        match fetch_with_deadline(fetcher, &job, deadline).await {
            Ok(table) => {
                if !state.record_success(location, table) {
                    warn!(location, "Aeris location already succeeded; dropping duplicate");
                }
            }
            Err(e) => {
                error!(location, source = %job.source, error = %e, "Aeris query failed");
                state.tracker.record(job);
            }
        }
    }
}

/// Extract `response[0].periods` into a table limited to [`FIELDS`].
fn parse_periods(payload: &Value) -> Result<Table, FetchError> {
    let periods = payload
        .get("response")
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("periods"))
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Missing("response[0].periods".to_string()))?;
    if periods.is_empty() {
        return Err(FetchError::Missing("forecast periods".to_string()));
    }

    let mut table = Table::new(FIELDS);
    for period in periods {
        let object = period
            .as_object()
            .ok_or_else(|| FetchError::Parse("period is not an object".to_string()))?;
        table.push_row(FIELDS.iter().map(|f| cell(object.get(*f))).collect());
    }
    Ok(table)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
