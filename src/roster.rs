//! Station roster loading and job dispatch.
//!
//! The roster is a YAML file naming each weather station (`ws`) and the
//! endpoint it is fetched from at each source:
//!
//! ```yaml
//! stations:
//!   - ws: "Miami FL"
//!     wunderground: "https://www.wunderground.com/hourly/us/fl/miami"
//!     weather_gov: "https://forecast.weather.gov/MapClick.php?lat=25.77&lon=-80.19&FcstType=digital"
//!     weather_com: "https://weather.com/weather/hourbyhour/l/Miami+FL"
//!     aeris: "https://api.aerisapi.com/forecasts/miami,fl?filter=1hr&client_id=..."
//! ```
//!
//! Every endpoint is optional: a station missing an endpoint for a source is
//! simply skipped for that source. The roster is loaded once at startup and
//! read-only for the rest of the run.

use serde::Deserialize;
use std::error::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::{Job, SourceKind};

/// One weather station and its per-source endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Station {
    /// Weather-station name; tags every output row for this location.
    pub ws: String,
    #[serde(default)]
    pub wunderground: Option<String>,
    #[serde(default)]
    pub weather_gov: Option<String>,
    #[serde(default)]
    pub weather_com: Option<String>,
    #[serde(default)]
    pub aeris: Option<String>,
}

impl Station {
    fn endpoint(&self, source: SourceKind) -> Option<&String> {
        match source {
            SourceKind::Wunderground => self.wunderground.as_ref(),
            SourceKind::WeatherGov => self.weather_gov.as_ref(),
            SourceKind::WeatherCom => self.weather_com.as_ref(),
            SourceKind::Aeris => self.aeris.as_ref(),
        }
    }
}

/// The immutable station roster for a run.
#[derive(Debug, Deserialize)]
pub struct Roster {
    pub stations: Vec<Station>,
}

impl Roster {
    /// Load the roster from a YAML file. An unreadable or malformed roster is
    /// a structural configuration error and fatal to the run.
    pub fn load(path: &str) -> Result<Self, Box<dyn Error>> {
        let text = std::fs::read_to_string(path)?;
        let roster: Roster = serde_yaml::from_str(&text)?;
        info!(count = roster.stations.len(), path, "Loaded station roster");
        Ok(roster)
    }

    /// Build the page-source job list: one job per (source, station) pair for
    /// each station that carries that source's endpoint, grouped per station
    /// in submission order.
    pub fn page_jobs(&self) -> Vec<Job> {
        let mut jobs = Vec::new();
        for station in &self.stations {
            for source in SourceKind::PAGE_SOURCES {
                match station.endpoint(source) {
                    Some(endpoint) if valid_endpoint(endpoint) => {
                        jobs.push(Job::new(source, endpoint.clone(), station.ws.clone()));
                    }
                    Some(endpoint) => {
                        warn!(%source, ws = %station.ws, endpoint, "Skipping malformed endpoint");
                    }
                    None => {
                        debug!(%source, ws = %station.ws, "Station has no endpoint for source");
                    }
                }
            }
        }
        jobs
    }

    /// Build the API batch list: `(endpoint, location)` pairs in roster order.
    pub fn api_jobs(&self) -> Vec<(String, String)> {
        self.stations
            .iter()
            .filter_map(|station| match station.aeris.as_ref() {
                Some(endpoint) if valid_endpoint(endpoint) => {
                    Some((endpoint.clone(), station.ws.clone()))
                }
                Some(endpoint) => {
                    warn!(ws = %station.ws, endpoint, "Skipping malformed Aeris endpoint");
                    None
                }
                None => {
                    debug!(ws = %station.ws, "Station has no Aeris endpoint");
                    None
                }
            })
            .collect()
    }
}

fn valid_endpoint(endpoint: &str) -> bool {
    Url::parse(endpoint).is_ok()
}
