//! Output generation for the harvested forecast data.
//!
//! One CSV file is written per source per run, named after the source and
//! the run stamp so consecutive runs never overwrite each other:
//!
//! ```text
//! output_dir/
//! ├── wunderground_forecast_20260807_1405.csv
//! ├── weather_gov_forecast_20260807_1405.csv
//! ├── weather_com_forecast_20260807_1405.csv
//! └── aeris_forecast_20260807_1405.csv
//! ```
//!
//! Each source's write is independently scoped: a failure writing one file
//! never prevents the others from being attempted.

pub mod csv;
