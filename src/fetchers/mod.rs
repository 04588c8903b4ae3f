//! Per-source fetchers for retrieving hourly forecast data.
//!
//! Each source is an opaque capability behind the [`Fetcher`] trait: given an
//! endpoint and a station name it returns a normalized [`Table`] or a
//! [`FetchError`]. The scheduler core never knows how a source is fetched.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | Wunderground.com | [`wunderground`] | page rendering | Hourly forecast table |
//! | Weather.gov | [`weather_gov`] | page rendering | 48-hour digital forecast |
//! | Weather.com | [`weather_com`] | page rendering | Hour-by-hour details list |
//! | Aeris | [`aeris`] | JSON API | Sequential batch, fixed field subset |
//!
//! # Common Patterns
//!
//! The page fetchers share the [`RenderSession`] resource: an engine-flavored
//! HTTP client opened per job and dropped on every exit path. A session loads
//! a page by polling until the source's content marker is present, bounded by
//! the readiness wait. [`fetch_with_deadline`] additionally wraps any fetch
//! in an overall deadline so a hung fetch resolves to a failure outcome
//! rather than stalling its wave.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::models::{FetchError, Job, SourceKind, Table};
use crate::utils::truncate_for_log;

pub mod aeris;
pub mod weather_com;
pub mod weather_gov;
pub mod wunderground;

/// Capability that retrieves and normalizes one source's data for one
/// station.
///
/// Implementations never panic on bad input and never retry internally;
/// failure recovery belongs to the retry loop.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// The source this fetcher serves.
    fn source(&self) -> SourceKind;

    /// Fetch `endpoint` and normalize the result into a table tagged with
    /// `location`.
    async fn fetch(&self, endpoint: &str, location: &str) -> Result<Table, FetchError>;
}

/// Run a fetch under an overall deadline.
///
/// The deadline is the sole cancellation mechanism in the system: a fetch
/// that hangs (network stall, marker that never appears) is abandoned at the
/// deadline and converted into a terminal failure outcome.
pub async fn fetch_with_deadline(
    fetcher: &dyn Fetcher,
    job: &Job,
    deadline: Duration,
) -> Result<Table, FetchError> {
    match tokio::time::timeout(deadline, fetcher.fetch(&job.endpoint, &job.location)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Deadline(deadline)),
    }
}

/// The rendering engine a page-fetch session presents itself as.
///
/// Resolved once at startup from the CLI and injected into every page
/// fetcher; engines differ only in the User-Agent their sessions send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum RenderEngine {
    Chrome,
    Firefox,
    Edge,
}

impl RenderEngine {
    pub fn user_agent(&self) -> &'static str {
        match self {
            RenderEngine::Chrome => {
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/126.0.0.0 Safari/537.36"
            }
            RenderEngine::Firefox => {
                "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"
            }
            RenderEngine::Edge => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0"
            }
        }
    }
}

/// Interval between readiness polls while waiting for a content marker.
const RENDER_POLL: Duration = Duration::from_secs(2);

/// A per-job page-rendering session.
///
/// One session is opened for each job invocation and dropped when the job
/// reaches a terminal state, on success and failure alike; sessions are never
/// shared across jobs.
pub struct RenderSession {
    client: reqwest::Client,
}

impl RenderSession {
    /// Open a fresh session for one job.
    pub fn open(engine: RenderEngine, request_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(engine.user_agent())
            .timeout(request_timeout)
            .build()?;
        debug!(?engine, "Opened rendering session");
        Ok(Self { client })
    }

    /// Load `url` and wait for the CSS `marker` to be present, polling until
    /// the wait bound elapses.
    ///
    /// Returns the page source once the marker matches, or
    /// [`FetchError::Readiness`] if the bound is reached first.
    pub async fn load(&self, url: &str, marker: &str, wait: Duration) -> Result<String, FetchError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let body = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            if marker_present(&body, marker)? {
                return Ok(body);
            }
            if tokio::time::Instant::now() + RENDER_POLL > deadline {
                return Err(FetchError::Readiness {
                    marker: marker.to_string(),
                    waited: wait,
                });
            }
            debug!(
                url,
                marker,
                preview = %truncate_for_log(&body, 160),
                "Content marker not present yet; polling again"
            );
            tokio::time::sleep(RENDER_POLL).await;
        }
    }
}

fn marker_present(body: &str, marker: &str) -> Result<bool, FetchError> {
    let selector = Selector::parse(marker).map_err(|e| FetchError::Selector(e.to_string()))?;
    let document = Html::parse_document(body);
    Ok(document.select(&selector).next().is_some())
}

/// One fetcher per source, built once at startup and shared by the pool and
/// the retry loops.
pub struct FetcherSet {
    wunderground: Arc<dyn Fetcher>,
    weather_gov: Arc<dyn Fetcher>,
    weather_com: Arc<dyn Fetcher>,
    aeris: Arc<dyn Fetcher>,
}

impl FetcherSet {
    /// Build the production fetchers for the configured engine and wait
    /// bound.
    pub fn new(engine: RenderEngine, readiness_wait: Duration) -> Result<Self, FetchError> {
        Ok(Self::from_parts(
            Arc::new(wunderground::WundergroundFetcher::new(engine, readiness_wait)),
            Arc::new(weather_gov::WeatherGovFetcher::new(engine, readiness_wait)),
            Arc::new(weather_com::WeatherComFetcher::new(engine, readiness_wait)),
            Arc::new(aeris::AerisFetcher::new(readiness_wait)?),
        ))
    }

    /// Assemble a set from arbitrary fetchers (used by tests to substitute
    /// scripted sources).
    pub fn from_parts(
        wunderground: Arc<dyn Fetcher>,
        weather_gov: Arc<dyn Fetcher>,
        weather_com: Arc<dyn Fetcher>,
        aeris: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            wunderground,
            weather_gov,
            weather_com,
            aeris,
        }
    }

    pub fn for_source(&self, source: SourceKind) -> &dyn Fetcher {
        match source {
            SourceKind::Wunderground => self.wunderground.as_ref(),
            SourceKind::WeatherGov => self.weather_gov.as_ref(),
            SourceKind::WeatherCom => self.weather_com.as_ref(),
            SourceKind::Aeris => self.aeris.as_ref(),
        }
    }
}
