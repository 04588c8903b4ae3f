//! Core data types for the harvest run.
//!
//! This module defines the vocabulary shared by the dispatcher, worker pool,
//! retry loops, and aggregator:
//! - [`SourceKind`]: which of the four forecast sources a value belongs to
//! - [`Job`]: one (source, endpoint, location) fetch attempt
//! - [`Table`]: a normalized tabular result (ordered columns, string cells)
//! - [`FetchError`]: why a single fetch attempt failed
//!
//! Tables deliberately carry string cells rather than typed fields: every
//! source publishes a different column set, and the only consumers are the
//! per-source CSV files.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// The four forecast sources harvested by a run.
///
/// The first three are browser-rendered websites fetched through the worker
/// pool; [`SourceKind::Aeris`] is a JSON API queried sequentially.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Wunderground,
    WeatherGov,
    WeatherCom,
    Aeris,
}

impl SourceKind {
    /// The page-rendered sources, in dispatch order.
    pub const PAGE_SOURCES: [SourceKind; 3] = [
        SourceKind::Wunderground,
        SourceKind::WeatherGov,
        SourceKind::WeatherCom,
    ];

    /// Human-readable source name used in log records.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Wunderground => "Wunderground.com",
            SourceKind::WeatherGov => "Weather.gov",
            SourceKind::WeatherCom => "Weather.com",
            SourceKind::Aeris => "Aeris",
        }
    }

    /// Stem of the per-source output file, e.g. `wunderground_forecast_*.csv`.
    pub fn file_stem(&self) -> &'static str {
        match self {
            SourceKind::Wunderground => "wunderground",
            SourceKind::WeatherGov => "weather_gov",
            SourceKind::WeatherCom => "weather_com",
            SourceKind::Aeris => "aeris",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One fetch attempt: a source, the endpoint to fetch, and the station the
/// endpoint belongs to.
///
/// Jobs are created by the dispatcher from the roster and re-created by the
/// retry loop from failure records. Within a per-source failure tracker the
/// dedup identity of a job is its endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub source: SourceKind,
    pub endpoint: String,
    pub location: String,
}

impl Job {
    pub fn new(
        source: SourceKind,
        endpoint: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            source,
            endpoint: endpoint.into(),
            location: location.into(),
        }
    }
}

/// A normalized tabular result: ordered column names plus rows of string
/// cells.
///
/// Page fetchers tag their tables with a `time_scraped` capture timestamp and
/// a `WS` station column via [`Table::add_column`]; the aggregator
/// concatenates per-location tables with [`Table::concat`] and renders them
/// with [`Table::to_csv`].
#[derive(Clone, Debug, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width must match header");
        self.rows.push(row);
    }

    /// Append a constant-valued column to every row (e.g. the `WS` tag).
    pub fn add_column(&mut self, name: &str, value: &str) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All cell values of the named column, in row order. Empty if the column
    /// does not exist.
    pub fn column_values(&self, name: &str) -> Vec<&str> {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => self.rows.iter().map(|row| row[idx].as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// Concatenate tables row-wise. The first non-empty table's header wins;
    /// per-source tables all share one shape, so this is a plain append.
    pub fn concat<I>(tables: I) -> Table
    where
        I: IntoIterator<Item = Table>,
    {
        let mut out = Table::default();
        for table in tables {
            if out.columns.is_empty() {
                out.columns = table.columns;
            } else {
                debug_assert_eq!(out.columns, table.columns, "mismatched table headers");
            }
            out.rows.extend(table.rows);
        }
        out
    }

    /// Render the table as CSV: header row first, fields quoted only when
    /// they contain a delimiter, quote, or line break.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_csv_line(&mut out, self.columns.iter().map(String::as_str));
        for row in &self.rows {
            push_csv_line(&mut out, row.iter().map(String::as_str));
        }
        out
    }
}

fn push_csv_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_csv_field(field));
    }
    out.push('\n');
}

fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Why a single fetch attempt failed.
///
/// Every variant is terminal for the attempt; recovery happens one level up
/// in the retry loop, never inside a fetcher.
#[derive(Debug)]
pub enum FetchError {
    /// Transport-level failure (connect, TLS, per-request timeout, bad status).
    Http(reqwest::Error),
    /// The page never presented its content marker within the readiness wait.
    Readiness { marker: String, waited: Duration },
    /// The whole fetch exceeded the job deadline.
    Deadline(Duration),
    /// A CSS selector failed to compile.
    Selector(String),
    /// The payload was present but could not be interpreted.
    Parse(String),
    /// A field the source is expected to publish was absent.
    Missing(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "http error: {e}"),
            FetchError::Readiness { marker, waited } => {
                write!(f, "content marker {marker:?} not present after {waited:?}")
            }
            FetchError::Deadline(limit) => write!(f, "fetch exceeded the {limit:?} deadline"),
            FetchError::Selector(s) => write!(f, "invalid selector: {s}"),
            FetchError::Parse(s) => write!(f, "parse error: {s}"),
            FetchError::Missing(field) => write!(f, "missing expected field: {field}"),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FetchError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e)
    }
}
