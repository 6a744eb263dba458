//! Bar data loading
//!
//! Reads OHLC bars from CSV (Datetime/Open/High/Low/Close columns), tolerates
//! a handful of timestamp formats, sorts by time, and drops duplicate
//! timestamps keeping the first occurrence. Rows with unusable prices are
//! skipped with a warning rather than failing the whole load.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::types::Bar;

#[derive(Debug, Deserialize)]
struct CsvBar {
    #[serde(alias = "Datetime", alias = "Date", alias = "date")]
    datetime: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
}

/// Load bars from a CSV file, sorted and de-duplicated by timestamp.
pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut bars = Vec::new();
    let mut skipped = 0usize;

    for (row, record) in reader.deserialize::<CsvBar>().enumerate() {
        let record = record.with_context(|| format!("Failed to parse CSV row {}", row + 1))?;
        let datetime = parse_timestamp(&record.datetime)
            .with_context(|| format!("Bad timestamp in CSV row {}", row + 1))?;

        match Bar::new(datetime, record.open, record.high, record.low, record.close) {
            Ok(bar) => bars.push(bar),
            Err(err) => {
                warn!(row = row + 1, %err, "skipping bar with unusable prices");
                skipped += 1;
            }
        }
    }

    bars.sort_by_key(|b| b.datetime);
    let before = bars.len();
    bars.dedup_by(|later, earlier| later.datetime == earlier.datetime);
    let duplicates = before - bars.len();

    info!(
        bars = bars.len(),
        skipped,
        duplicates,
        file = %path.display(),
        "loaded bar data"
    );
    Ok(bars)
}

/// Keep bars inside the inclusive `[start, end]` range. Date-only bounds
/// cover the whole day.
pub fn filter_by_date(
    bars: Vec<Bar>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Vec<Bar>> {
    let start_bound = start.map(|s| parse_bound(s, false)).transpose()?;
    let end_bound = end.map(|s| parse_bound(s, true)).transpose()?;

    Ok(bars
        .into_iter()
        .filter(|bar| {
            start_bound.map_or(true, |s| bar.datetime >= s)
                && end_bound.map_or(true, |e| bar.datetime < e)
        })
        .collect())
}

/// Load the CSV named by the config section and apply its date range.
pub fn load_from_config(data: &DataConfig) -> Result<Vec<Bar>> {
    let bars = load_bars(&data.csv_path)?;
    filter_by_date(bars, data.start_date.as_deref(), data.end_date.as_deref())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y.%m.%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    bail!("unrecognized timestamp format: {}", s)
}

/// Exclusive upper bound / inclusive lower bound for a date filter string.
fn parse_bound(s: &str, is_end: bool) -> Result<DateTime<Utc>> {
    let parsed = parse_timestamp(s)?;
    let date_only = NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok();
    if is_end {
        // Date-only end bounds cover the whole day; timestamps are exact.
        if date_only {
            Ok(parsed + Duration::days(1))
        } else {
            Ok(parsed + Duration::seconds(1))
        }
    } else {
        Ok(parsed)
    }
}
