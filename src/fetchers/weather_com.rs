//! Weather.com hour-by-hour forecast fetcher.
//!
//! The hourly page is a flat sibling sequence under one container: an `h2`
//! announces each day (`Thursday, August 7`), and every following `details`
//! element is one hour of that day. The parser walks the siblings starting
//! at `h2#currentDateId0`, carrying the current date into each hourly row.
//! Field values live in `data-testid`-attributed elements and keep their
//! unit suffixes (`°`, `%`, `km/h`, `mm`) in the markup; the suffixes are
//! stripped here.

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{info, instrument};

use super::{Fetcher, RenderEngine, RenderSession};
use crate::models::{FetchError, SourceKind, Table};
use crate::utils::scrape_stamp;

const CONTENT_MARKER: &str = "h2#currentDateId0";

const COLUMNS: [&str; 12] = [
    "date",
    "hour",
    "temperature (C)",
    "condition",
    "rain (%)",
    "wind speed",
    "wind direction",
    "feels like (C)",
    "humidity (%)",
    "uv index",
    "cloud cover",
    "rain amount",
];

static START_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2#currentDateId0").expect("static selector"));
static HOUR_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[data-testid] h3").expect("static selector"));
static COND_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[data-testid=\"wxIcon\"] span").expect("static selector"));
static TEMP_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[data-testid=\"detailsTemperature\"] span").expect("static selector")
});
static PRECIP_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[data-testid=\"Precip\"] span").expect("static selector"));
static FEELS_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li[data-testid=\"FeelsLikeSection\"] span[data-testid=\"TemperatureValue\"]")
        .expect("static selector")
});
static WIND_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li[data-testid=\"WindSection\"] span[data-testid=\"Wind\"]")
        .expect("static selector")
});
static HUMIDITY_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li[data-testid=\"HumiditySection\"] span[data-testid=\"PercentageValue\"]")
        .expect("static selector")
});
static UV_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li[data-testid=\"uvIndexSection\"] span[data-testid=\"UVIndexValue\"]")
        .expect("static selector")
});
static CLOUD_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li[data-testid=\"CloudCoverSection\"] span[data-testid=\"PercentageValue\"]")
        .expect("static selector")
});
static AMOUNT_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li[data-testid=\"AccumulationSection\"] span[data-testid=\"AccumulationValue\"]")
        .expect("static selector")
});

static WIND_SPEED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+)\s*km/h").expect("static regex"));
static WIND_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]+").expect("static regex"));

pub struct WeatherComFetcher {
    engine: RenderEngine,
    readiness_wait: Duration,
}

impl WeatherComFetcher {
    pub fn new(engine: RenderEngine, readiness_wait: Duration) -> Self {
        Self {
            engine,
            readiness_wait,
        }
    }
}

#[async_trait]
impl Fetcher for WeatherComFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::WeatherCom
    }

    #[instrument(level = "info", skip(self, endpoint), fields(location = %location))]
    async fn fetch(&self, endpoint: &str, location: &str) -> Result<Table, FetchError> {
        let session = RenderSession::open(self.engine, self.readiness_wait)?;
        let page = session
            .load(endpoint, CONTENT_MARKER, self.readiness_wait)
            .await?;

        let mut table = parse_hourly_details(&page, Local::now().year())?;
        table.add_column("time_scraped", &scrape_stamp());
        table.add_column("WS", location);
        info!(rows = table.row_count(), "Parsed Weather.com hourly forecast");
        Ok(table)
    }
}

/// Walk the sibling sequence from `h2#currentDateId0`, turning each
/// `details` element into one hourly row under the most recent `h2` date.
pub fn parse_hourly_details(html: &str, year: i32) -> Result<Table, FetchError> {
    let document = Html::parse_document(html);
    let start = document
        .select(&START_SEL)
        .next()
        .ok_or_else(|| FetchError::Missing("h2#currentDateId0".to_string()))?;

    let mut table = Table::new(COLUMNS);
    let mut date = String::new();
    let mut node = Some(*start);
    while let Some(current) = node {
        if let Some(el) = ElementRef::wrap(current) {
            match el.value().name() {
                "h2" => date = heading_date(&element_text(el), year)?,
                "details" => table.push_row(hourly_row(el, &date)?),
                _ => {}
            }
        }
        node = current.next_sibling();
    }

    if table.is_empty() {
        return Err(FetchError::Missing("hourly detail rows".to_string()));
    }
    Ok(table)
}

/// A day heading reads `Thursday, August 7`; reformat as `DD-MM-YYYY` with
/// the current year.
fn heading_date(heading: &str, year: i32) -> Result<String, FetchError> {
    let month_day = heading
        .split_once(',')
        .map(|(_, rest)| rest.trim())
        .ok_or_else(|| FetchError::Parse(format!("no day in heading {heading:?}")))?;
    let date = NaiveDate::parse_from_str(&format!("{month_day}, {year}"), "%B %d, %Y")
        .map_err(|e| FetchError::Parse(format!("day heading {heading:?}: {e}")))?;
    Ok(date.format("%d-%m-%Y").to_string())
}

fn hourly_row(details: ElementRef, date: &str) -> Result<Vec<String>, FetchError> {
    let wind_text = sel_text(details, &WIND_SEL, "Wind")?;
    let wind_speed = WIND_SPEED
        .captures(&wind_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let wind_dir = WIND_DIR
        .find(&wind_text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    Ok(vec![
        date.to_string(),
        sel_text(details, &HOUR_SEL, "hour")?,
        strip_unit(&sel_text(details, &TEMP_SEL, "detailsTemperature")?, "°"),
        sel_text(details, &COND_SEL, "wxIcon")?,
        strip_unit(&sel_text(details, &PRECIP_SEL, "Precip")?, "%"),
        wind_speed,
        wind_dir,
        strip_unit(&sel_text(details, &FEELS_SEL, "FeelsLikeSection")?, "°"),
        strip_unit(&sel_text(details, &HUMIDITY_SEL, "HumiditySection")?, "%"),
        sel_text(details, &UV_SEL, "uvIndexSection")?,
        strip_unit(&sel_text(details, &CLOUD_SEL, "CloudCoverSection")?, "%"),
        strip_unit(&sel_text(details, &AMOUNT_SEL, "AccumulationSection")?, " mm"),
    ])
}

fn sel_text(
    scope: ElementRef,
    selector: &Selector,
    field: &'static str,
) -> Result<String, FetchError> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .ok_or_else(|| FetchError::Missing(field.to_string()))
}

fn strip_unit(value: &str, unit: &str) -> String {
    value.strip_suffix(unit).unwrap_or(value).trim().to_string()
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}
