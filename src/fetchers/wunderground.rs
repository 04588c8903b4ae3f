//! Wunderground.com hourly forecast fetcher.
//!
//! The hourly page renders its data into `table#hourly-forecast-table`, one
//! `tr` per hour with each cell's value inside a `span`. The forecast date is
//! published separately in `#forecast-title-short` as `MM/DD` and is stamped
//! onto every row as `DD/MM/YYYY`.

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

const CONTENT_MARKER: &str = "table#hourly-forecast-table";

const COLUMNS: [&str; 12] = [
    "date",
    "hour",
    "condition",
    "temperature",
    "feels like",
    "precip(%)",
    "amount",
    "cloud cover",
    "dew point",
    "humidity",
    "wind",
    "pressure",
];

static ROW_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table#hourly-forecast-table tbody tr").expect("static selector"));
static CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("static selector"));
static SPAN_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("span").expect("static selector"));
static TITLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#forecast-title-short").expect("static selector"));

static INT_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]*").expect("static regex"));
static DEC_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]*(\.[0-9]*)?").expect("static regex"));
static TITLE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{1,2}/[0-9]{1,2})\s*$").expect("static regex"));

pub struct WundergroundFetcher {
    engine: RenderEngine,
    readiness_wait: Duration,
}

impl WundergroundFetcher {
    pub fn new(engine: RenderEngine, readiness_wait: Duration) -> Self {
        Self {
            engine,
            readiness_wait,
        }
    }
}

#[async_trait]
impl Fetcher for WundergroundFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::Wunderground
    }

    #[instrument(level = "info", skip(self, endpoint), fields(location = %location))]
    async fn fetch(&self, endpoint: &str, location: &str) -> Result<Table, FetchError> {
        // One session per job, dropped on every exit path.
        let session = RenderSession::open(self.engine, self.readiness_wait)?;
        let page = session
            .load(endpoint, CONTENT_MARKER, self.readiness_wait)
            .await?;

        let mut table = parse_hourly_table(&page, Local::now().year())?;
        table.add_column("time_scraped", &scrape_stamp());
        table.add_column("WS", location);
        info!(rows = table.row_count(), "Parsed Wunderground hourly forecast");
        Ok(table)
    }
}

/// Extract the hourly forecast table from a rendered Wunderground page.
pub fn parse_hourly_table(html: &str, year: i32) -> Result<Table, FetchError> {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SEL)
        .next()
        .ok_or_else(|| FetchError::Missing("#forecast-title-short".to_string()))?;
    let date = forecast_date(&element_text(title), year)?;

    let mut table = Table::new(COLUMNS);
    for row in document.select(&ROW_SEL) {
        let cells: Vec<String> = row
            .select(&CELL_SEL)
            .map(|td| {
                td.select(&SPAN_SEL)
                    .next()
                    .map(element_text)
                    .unwrap_or_default()
            })
            .collect();
        if cells.len() < 11 {
            return Err(FetchError::Parse(format!(
                "expected 11 hourly cells, found {}",
                cells.len()
            )));
        }

        table.push_row(vec![
            date.clone(),
            cells[0].clone(),
            cells[1].clone(),
            int_prefix(&cells[2]),
            int_prefix(&cells[3]),
            int_prefix(&cells[4]),
            dec_prefix(&cells[5]),
            int_prefix(&cells[6]),
            int_prefix(&cells[7]),
            int_prefix(&cells[8]),
            int_prefix(&cells[9]),
            dec_prefix(&cells[10]),
        ]);
    }

    if table.is_empty() {
        return Err(FetchError::Missing("hourly forecast rows".to_string()));
    }
    Ok(table)
}

/// The forecast title carries the day as `MM/DD`; reformat as `DD/MM/YYYY`
/// with the current year.
fn forecast_date(title: &str, year: i32) -> Result<String, FetchError> {
    let mmdd = TITLE_DATE
        .captures(title)
        .and_then(|c| c.get(1))
        .ok_or_else(|| FetchError::Parse(format!("no MM/DD in forecast title {title:?}")))?;
    let date = NaiveDate::parse_from_str(&format!("{}/{year}", mmdd.as_str()), "%m/%d/%Y")
        .map_err(|e| FetchError::Parse(format!("forecast title date: {e}")))?;
    Ok(date.format("%d/%m/%Y").to_string())
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Keep only the leading integer of a cell like `88 °F` or `15%`.
fn int_prefix(cell: &str) -> String {
    INT_PREFIX
        .find(cell)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Keep the leading decimal of a cell like `0.12 in` or `30.04 in`.
fn dec_prefix(cell: &str) -> String {
    DEC_PREFIX
        .find(cell)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        let row = |hour: &str, temp: &str| {
            format!(
                "<tr>\
                 <td><span>{hour}</span></td>\
                 <td><span>Partly Cloudy</span></td>\
                 <td><span>{temp} °F</span></td>\
                 <td><span>97 °F</span></td>\
                 <td><span>15%</span></td>\
                 <td><span>0.1 in</span></td>\
                 <td><span>42%</span></td>\
                 <td><span>75 °F</span></td>\
                 <td><span>65%</span></td>\
                 <td><span>12 mph</span></td>\
                 <td><span>30.04 in</span></td>\
                 </tr>"
            )
        };
        format!(
            "<html><body>\
             <div id=\"forecast-title-short\">Friday, 08/07</div>\
             <table id=\"hourly-forecast-table\"><tbody>{}{}</tbody></table>\
             </body></html>",
            row("1:00 pm", "88"),
            row("2:00 pm", "89"),
        )
    }

    #[test]
    fn test_parse_hourly_table() {
        let table = parse_hourly_table(&fixture(), 2026).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_values("date"), vec!["07/08/2026", "07/08/2026"]);
        assert_eq!(table.column_values("hour"), vec!["1:00 pm", "2:00 pm"]);
        assert_eq!(table.column_values("temperature"), vec!["88", "89"]);
        assert_eq!(table.column_values("amount"), vec!["0.1", "0.1"]);
        assert_eq!(table.column_values("pressure"), vec!["30.04", "30.04"]);
        assert_eq!(
            table.column_values("condition"),
            vec!["Partly Cloudy", "Partly Cloudy"]
        );
    }

    #[test]
    fn test_parse_requires_title() {
        let html = "<html><body><table id=\"hourly-forecast-table\"><tbody></tbody></table></body></html>";
        assert!(matches!(
            parse_hourly_table(html, 2026),
            Err(FetchError::Missing(_))
        ));
    }

    #[test]
    fn test_parse_requires_rows() {
        let html = "<html><body>\
                    <div id=\"forecast-title-short\">Friday, 08/07</div>\
                    <table id=\"hourly-forecast-table\"><tbody></tbody></table>\
                    </body></html>";
        assert!(matches!(
            parse_hourly_table(html, 2026),
            Err(FetchError::Missing(_))
        ));
    }

    #[test]
    fn test_short_row_is_a_parse_error() {
        let html = "<html><body>\
                    <div id=\"forecast-title-short\">Friday, 08/07</div>\
                    <table id=\"hourly-forecast-table\"><tbody>\
                    <tr><td><span>1:00 pm</span></td></tr>\
                    </tbody></table></body></html>";
        assert!(matches!(
            parse_hourly_table(html, 2026),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_forecast_date_reformat() {
        assert_eq!(forecast_date("Friday, 08/07", 2026).unwrap(), "07/08/2026");
        assert_eq!(forecast_date("12/31", 2026).unwrap(), "31/12/2026");
        assert!(forecast_date("no date here", 2026).is_err());
    }

    #[test]
    fn test_numeric_prefixes() {
        assert_eq!(int_prefix("88 °F"), "88");
        assert_eq!(int_prefix("Partly Cloudy"), "");
        assert_eq!(dec_prefix("0.12 in"), "0.12");
        assert_eq!(dec_prefix("30 in"), "30");
    }
}
