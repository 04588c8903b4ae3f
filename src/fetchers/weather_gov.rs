//! Weather.gov (forecast.weather.gov) digital forecast fetcher.
//!
//! The digital forecast page lays its data out sideways: the 8th `table` on
//! the page holds two stacked blocks of 13 series rows (hours 1-24 and
//! 25-48), each row a quantity with its label in the first cell and one cell
//! per hour after that. The parser transposes the series back into one row
//! per hour.
//!
//! Date cells are sparse: the page only prints `MM/DD` where the day
//! changes, so dates are forward-filled, with the fill value carried across
//! the block boundary.

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{info, instrument};

use super::{Fetcher, RenderEngine, RenderSession};
use crate::models::{FetchError, SourceKind, Table};
use crate::utils::scrape_stamp;

const CONTENT_MARKER: &str = "table";

const COLUMNS: [&str; 13] = [
    "date",
    "hour",
    "temperature (F)",
    "dew point (F)",
    "heat index (F)",
    "surface wind (mph)",
    "wind dir",
    "gust",
    "sky cover (%)",
    "precip potential (%)",
    "rel humidity (%)",
    "rain",
    "thunder",
];

static TABLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("static selector"));
static ROW_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("static selector"));
static CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("static selector"));

pub struct WeatherGovFetcher {
    engine: RenderEngine,
    readiness_wait: Duration,
}

impl WeatherGovFetcher {
    pub fn new(engine: RenderEngine, readiness_wait: Duration) -> Self {
        Self {
            engine,
            readiness_wait,
        }
    }
}

#[async_trait]
impl Fetcher for WeatherGovFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::WeatherGov
    }

    #[instrument(level = "info", skip(self, endpoint), fields(location = %location))]
    async fn fetch(&self, endpoint: &str, location: &str) -> Result<Table, FetchError> {
        let session = RenderSession::open(self.engine, self.readiness_wait)?;
        let page = session
            .load(endpoint, CONTENT_MARKER, self.readiness_wait)
            .await?;

        let mut table = parse_digital_forecast(&page, Local::now().year())?;
        table.add_column("time_scraped", &scrape_stamp());
        table.add_column("WS", location);
        info!(rows = table.row_count(), "Parsed Weather.gov digital forecast");
        Ok(table)
    }
}

/// Transpose the 48-hour digital forecast table into one row per hour.
pub fn parse_digital_forecast(html: &str, year: i32) -> Result<Table, FetchError> {
    let document = Html::parse_document(html);

    let tables: Vec<_> = document.select(&TABLE_SEL).collect();
    let forecast = tables
        .get(7)
        .ok_or_else(|| FetchError::Missing("digital forecast table".to_string()))?;

    let rows: Vec<Vec<String>> = forecast
        .select(&ROW_SEL)
        .map(|tr| tr.select(&CELL_SEL).map(element_text).collect())
        .collect();
    if rows.len() < 28 {
        return Err(FetchError::Parse(format!(
            "expected 28 digital forecast rows, found {}",
            rows.len()
        )));
    }

    let mut table = Table::new(COLUMNS);
    let mut fill = String::new();
    append_block(&mut table, &rows[1..=13], &mut fill, year)?;
    append_block(&mut table, &rows[15..=27], &mut fill, year)?;

    if table.is_empty() {
        return Err(FetchError::Missing("digital forecast hours".to_string()));
    }
    Ok(table)
}

/// Append one 13-series block. `series[0]` is the date row; every row's
/// first cell is its label.
fn append_block(
    table: &mut Table,
    series: &[Vec<String>],
    fill: &mut String,
    year: i32,
) -> Result<(), FetchError> {
    let width = series
        .iter()
        .map(|row| row.len().saturating_sub(1))
        .min()
        .unwrap_or(0);
    if width == 0 {
        return Ok(());
    }

    let dates = fill_dates(&series[0][1..], fill, year)?;
    for hour in 0..width {
        let mut row = Vec::with_capacity(COLUMNS.len());
        row.push(dates[hour].clone());
        for quantity in &series[1..] {
            row.push(quantity[1 + hour].clone());
        }
        table.push_row(row);
    }
    Ok(())
}

/// Forward-fill the sparse `MM/DD` date cells, reformatting as `DD/MM/YYYY`.
/// `fill` carries the last seen date across calls.
fn fill_dates(raw: &[String], fill: &mut String, year: i32) -> Result<Vec<String>, FetchError> {
    let mut out = Vec::with_capacity(raw.len());
    for cell in raw {
        let cell = cell.trim();
        if !cell.is_empty() {
            let date = NaiveDate::parse_from_str(&format!("{cell}/{year}"), "%m/%d/%Y")
                .map_err(|e| FetchError::Parse(format!("digital forecast date {cell:?}: {e}")))?;
            *fill = date.format("%d/%m/%Y").to_string();
        }
        out.push(fill.clone());
    }
    Ok(out)
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_row(label: &str, cells: [&str; 3]) -> String {
        format!(
            "<tr><td>{label}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            cells[0], cells[1], cells[2]
        )
    }

    /// Seven decoy tables followed by a digital forecast table with two
    /// three-hour blocks.
    fn fixture() -> String {
        let decoys = "<table><tr><td>decoy</td></tr></table>".repeat(7);

        let mut forecast = String::from("<table>");
        forecast.push_str("<tr><td>Digital Forecast</td></tr>");
        // Block 1: the date appears only on the first hour.
        forecast.push_str(&series_row("Date", ["08/07", "", ""]));
        forecast.push_str(&series_row("Hour (EDT)", ["22", "23", "00"]));
        forecast.push_str(&series_row("Temperature (°F)", ["80", "81", "82"]));
        forecast.push_str(&series_row("Dewpoint (°F)", ["70", "70", "70"]));
        forecast.push_str(&series_row("Heat Index (°F)", ["85", "85", "85"]));
        forecast.push_str(&series_row("Surface Wind (mph)", ["9", "9", "9"]));
        forecast.push_str(&series_row("Wind Dir", ["SE", "SE", "SE"]));
        forecast.push_str(&series_row("Gust", ["", "", ""]));
        forecast.push_str(&series_row("Sky Cover (%)", ["50", "55", "60"]));
        forecast.push_str(&series_row("Precipitation Potential (%)", ["20", "20", "30"]));
        forecast.push_str(&series_row("Relative Humidity (%)", ["70", "72", "74"]));
        forecast.push_str(&series_row("Rain", ["", "Chc", "Chc"]));
        forecast.push_str(&series_row("Thunder", ["", "", "Sct"]));
        forecast.push_str("<tr><td></td></tr>");
        // Block 2: the day changes one hour in.
        forecast.push_str(&series_row("Date", ["", "08/08", ""]));
        forecast.push_str(&series_row("Hour (EDT)", ["01", "02", "03"]));
        forecast.push_str(&series_row("Temperature (°F)", ["83", "84", "85"]));
        forecast.push_str(&series_row("Dewpoint (°F)", ["71", "71", "71"]));
        forecast.push_str(&series_row("Heat Index (°F)", ["86", "86", "86"]));
        forecast.push_str(&series_row("Surface Wind (mph)", ["8", "8", "8"]));
        forecast.push_str(&series_row("Wind Dir", ["S", "S", "S"]));
        forecast.push_str(&series_row("Gust", ["", "", ""]));
        forecast.push_str(&series_row("Sky Cover (%)", ["65", "70", "75"]));
        forecast.push_str(&series_row("Precipitation Potential (%)", ["30", "40", "40"]));
        forecast.push_str(&series_row("Relative Humidity (%)", ["76", "78", "80"]));
        forecast.push_str(&series_row("Rain", ["Chc", "Lkly", "Lkly"]));
        forecast.push_str(&series_row("Thunder", ["", "", ""]));
        forecast.push_str("</table>");

        format!("<html><body>{decoys}{forecast}</body></html>")
    }

    #[test]
    fn test_parse_digital_forecast() {
        let table = parse_digital_forecast(&fixture(), 2026).unwrap();

        assert_eq!(table.row_count(), 6);
        assert_eq!(
            table.column_values("hour"),
            vec!["22", "23", "00", "01", "02", "03"]
        );
        assert_eq!(
            table.column_values("temperature (F)"),
            vec!["80", "81", "82", "83", "84", "85"]
        );
    }

    #[test]
    fn test_dates_forward_fill_across_blocks() {
        let table = parse_digital_forecast(&fixture(), 2026).unwrap();

        // Block 2's first hour has no date cell; the fill carries over from
        // block 1 until 08/08 appears.
        assert_eq!(
            table.column_values("date"),
            vec![
                "07/08/2026",
                "07/08/2026",
                "07/08/2026",
                "07/08/2026",
                "08/08/2026",
                "08/08/2026"
            ]
        );
    }

    #[test]
    fn test_too_few_tables_is_missing() {
        let html = "<html><body><table><tr><td>only one</td></tr></table></body></html>";
        assert!(matches!(
            parse_digital_forecast(html, 2026),
            Err(FetchError::Missing(_))
        ));
    }

    #[test]
    fn test_too_few_rows_is_a_parse_error() {
        let decoys = "<table><tr><td>decoy</td></tr></table>".repeat(7);
        let html = format!(
            "<html><body>{decoys}<table><tr><td>Date</td></tr></table></body></html>"
        );
        assert!(matches!(
            parse_digital_forecast(&html, 2026),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_bad_date_cell_is_a_parse_error() {
        let html = fixture().replace("08/07", "8/banana");
        assert!(matches!(
            parse_digital_forecast(&html, 2026),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_fill_dates_state() {
        let mut fill = String::new();
        let raw: Vec<String> = vec!["08/07".into(), "".into(), "08/08".into()];
        let dates = fill_dates(&raw, &mut fill, 2026).unwrap();
        assert_eq!(dates, vec!["07/08/2026", "07/08/2026", "08/08/2026"]);
        assert_eq!(fill, "08/08/2026");
    }
}
