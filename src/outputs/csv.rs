//! CSV rendering and writing for the per-source forecast tables.

use itertools::Itertools;
use std::error::Error;
use tokio::fs;
use tracing::{info, instrument};

use crate::models::{SourceKind, Table};

/// Concatenate a source's accumulated tables and write them as one CSV named
/// `{source}_forecast_{stamp}.csv` under `output_dir`.
///
/// Zero accumulated tables is a hard failure for this source: there is
/// nothing to write. Returns the path written.
#[instrument(level = "info", skip(tables), fields(source = %source, tables = tables.len()))]
pub async fn write_source_csv(
    source: SourceKind,
    tables: Vec<Table>,
    output_dir: &str,
    stamp: &str,
) -> Result<String, Box<dyn Error>> {
    if tables.is_empty() {
        return Err(format!("no successful tables for {source}; nothing to write").into());
    }

    let merged = Table::concat(tables);
    let stations = merged.column_values("WS").into_iter().unique().count();
    let path = format!(
        "{}/{}_forecast_{stamp}.csv",
        output_dir.trim_end_matches('/'),
        source.file_stem()
    );

    info!(
        path = %path,
        rows = merged.row_count(),
        columns = merged.columns().len(),
        "Saving output to CSV"
    );
    fs::write(&path, merged.to_csv()).await?;
    info!(path = %path, stations, "Saved weather stations");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station_table(ws: &str, rows: usize) -> Table {
        let mut table = Table::new(["hour", "temperature"]);
        for i in 0..rows {
            table.push_row(vec![format!("{i} pm"), format!("{}", 80 + i)]);
        }
        table.add_column("WS", ws);
        table
    }

    fn scratch_dir(test: &str) -> String {
        let dir = std::env::temp_dir().join(format!(
            "forecast_harvest_{test}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_write_concatenates_and_stamps() {
        let dir = scratch_dir("write");
        let tables = vec![station_table("Miami FL", 2), station_table("Tampa FL", 3)];

        let path = write_source_csv(SourceKind::Wunderground, tables, &dir, "20260807_1405")
            .await
            .unwrap();

        assert!(path.ends_with("wunderground_forecast_20260807_1405.csv"));
        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("hour,temperature,WS"));
        // Two rows for Miami, three for Tampa.
        assert_eq!(lines.count(), 5);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_zero_tables_is_a_hard_failure() {
        let dir = scratch_dir("empty");
        let result = write_source_csv(SourceKind::Aeris, Vec::new(), &dir, "20260807_1405").await;
        assert!(result.is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_an_error() {
        let result = write_source_csv(
            SourceKind::WeatherCom,
            vec![station_table("Miami FL", 1)],
            "/nonexistent/forecast_harvest_test",
            "20260807_1405",
        )
        .await;
        assert!(result.is_err());
    }
}
