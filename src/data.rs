//! Data loading
//!
//! Loads daily OHLCV history from CSV files. Data retrieval from exchanges
//! or vendors is out of scope; files are expected to already exist on disk
//! in `datetime,open,high,low,close,volume` column order.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use tracing::{info, warn};

use crate::{Candle, Symbol};

/// Load OHLCV data from a CSV file
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = dt_str
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                // Try parsing without timezone and assume UTC
                chrono::NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            })
            .or_else(|_| {
                // Daily files often carry only a date
                NaiveDate::parse_from_str(dt_str, "%Y-%m-%d").map(|d| {
                    DateTime::<Utc>::from_naive_utc_and_offset(
                        d.and_hms_opt(0, 0, 0).unwrap(),
                        Utc,
                    )
                })
            })
            .context(format!("Failed to parse datetime: {}", dt_str))?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .context("Failed to parse open")?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .context("Failed to parse high")?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .context("Failed to parse low")?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .context("Failed to parse close")?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .context("Failed to parse volume")?;

        let candle = Candle {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        if let Err(e) = candle.validate() {
            warn!("Skipping invalid row {}: {}", row_idx + 1, e);
            continue;
        }
        candles.push(candle);
    }

    Ok(candles)
}

/// Load daily history for one symbol from `{data_dir}/{SYMBOL}_1d.csv`
pub fn load_symbol(data_dir: impl AsRef<Path>, symbol: &Symbol) -> Result<Vec<Candle>> {
    let filename = format!("{}_1d.csv", symbol.as_str());
    let path = data_dir.as_ref().join(&filename);

    let candles =
        load_csv(&path).context(format!("Failed to load data for {}", symbol))?;
    info!("Loaded {} candles for {}", candles.len(), symbol);

    if candles.is_empty() {
        anyhow::bail!("No candles in {}", path.display());
    }

    Ok(candles)
}

/// Restrict candles to an inclusive [start, end] date range
pub fn filter_date_range(
    candles: Vec<Candle>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Vec<Candle>> {
    let parse = |s: &str| -> Result<NaiveDate> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").context(format!("Invalid date: {}", s))
    };

    let start = start.map(parse).transpose()?;
    let end = end.map(parse).transpose()?;

    Ok(candles
        .into_iter()
        .filter(|c| {
            let date = c.datetime.date_naive();
            start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
        })
        .collect())
}
