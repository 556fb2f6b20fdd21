//! File I/O for the CLI: OHLC CSV ingestion, feature-table CSV round-trip,
//! and JSON report writers.
//!
//! The OHLC contract is a CSV with a `timestamp,open,high,low,close,volume`
//! header; timestamps are UTC, RFC 3339 or `YYYY-MM-DD HH:MM:SS`. Missing
//! volume defaults to 0. Undefined table cells serialize as empty CSV fields
//! and null JSON values.

use crate::renko::{Brick, WickMode};
use crate::table::{FeatureTable, TableSettings};
use crate::types::OhlcBar;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::Path;

const TABLE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
struct OhlcRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TABLE_DATETIME_FORMAT) {
        return Ok(naive.and_utc());
    }
    bail!("unrecognized timestamp '{raw}'")
}

/// Read source OHLC bars from a CSV file.
pub fn read_ohlc_csv(path: &Path) -> Result<Vec<OhlcBar>> {
    let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let mut bars = Vec::new();
    for result in reader.deserialize() {
        let row: OhlcRow = result.with_context(|| format!("failed to parse CSV row in {path:?}"))?;
        let timestamp = parse_timestamp(&row.timestamp)
            .with_context(|| format!("bad timestamp in {path:?}"))?;
        bars.push(OhlcBar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.unwrap_or(0.0),
        });
    }
    tracing::debug!("loaded {} OHLC bars from {:?}", bars.len(), path);
    Ok(bars)
}

/// Write completed bricks to CSV.
pub fn write_bricks_csv(path: &Path, bricks: &[Brick]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));

    writer.write_record([
        "timestamp_open",
        "timestamp_close",
        "open",
        "high",
        "low",
        "close",
        "direction",
        "is_reversal",
        "source_index_open",
        "source_index_close",
        "brick_size",
        "reversal_size",
        "adr_value",
    ])?;
    for b in bricks {
        writer.write_record([
            b.timestamp_open.format(TABLE_DATETIME_FORMAT).to_string(),
            b.timestamp_close.format(TABLE_DATETIME_FORMAT).to_string(),
            b.open.to_string(),
            b.high.to_string(),
            b.low.to_string(),
            b.close.to_string(),
            b.direction.to_string(),
            (b.is_reversal as u8).to_string(),
            b.source_index_open.to_string(),
            b.source_index_close.to_string(),
            b.brick_size.to_string(),
            b.reversal_size.to_string(),
            b.adr_value.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the feature table to CSV: datetime, session_date, then every column
/// in its contract order. Undefined cells are empty fields.
pub fn write_table_csv(path: &Path, table: &FeatureTable) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));

    let mut header = vec!["datetime".to_string(), "session_date".to_string()];
    header.extend(table.column_names().map(String::from));
    writer.write_record(&header)?;

    let columns: Vec<&[Option<f64>]> = table.columns().map(|(_, c)| c).collect();
    for i in 0..table.len() {
        let mut record = Vec::with_capacity(columns.len() + 2);
        record.push(table.timestamps()[i].format(TABLE_DATETIME_FORMAT).to_string());
        record.push(table.session_dates()[i].to_string());
        for col in &columns {
            record.push(col[i].map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a feature table back from CSV. Settings are reconstructed from the
/// constant echo columns; fields without one keep their defaults.
pub fn read_table_csv(path: &Path) -> Result<FeatureTable> {
    let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let header: Vec<String> = reader
        .headers()
        .context("missing CSV header")?
        .iter()
        .map(String::from)
        .collect();
    if header.first().map(String::as_str) != Some("datetime")
        || header.get(1).map(String::as_str) != Some("session_date")
    {
        bail!("feature table CSV must start with datetime,session_date columns");
    }

    let mut timestamps = Vec::new();
    let mut session_dates = Vec::new();
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); header.len() - 2];
    for result in reader.records() {
        let record = result.with_context(|| format!("failed to read CSV row in {path:?}"))?;
        let raw_ts = record.get(0).unwrap_or_default();
        timestamps.push(parse_timestamp(raw_ts)?);
        let raw_date = record.get(1).unwrap_or_default();
        session_dates.push(
            NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
                .with_context(|| format!("bad session_date '{raw_date}'"))?,
        );
        for (k, column) in columns.iter_mut().enumerate() {
            let cell = record.get(k + 2).unwrap_or_default();
            if cell.is_empty() {
                column.push(None);
            } else {
                let value: f64 = cell
                    .parse()
                    .with_context(|| format!("bad numeric cell '{cell}' in column {}", header[k + 2]))?;
                column.push(Some(value));
            }
        }
    }

    // Rebuild the settings echo from the constant columns where present
    let mut settings = TableSettings {
        adr_period: 14,
        brick_size: 0.0010,
        reversal_size: 0.0020,
        wick_mode: Default::default(),
        ma1_period: 20,
        ma2_period: 50,
        ma3_period: 200,
        chop_period: 20,
        smae1_period: 20,
        smae1_deviation: 1.0,
        smae2_period: 50,
        smae2_deviation: 1.0,
        pwap_sigmas: vec![1.0, 2.0, 2.5, 3.0],
    };
    let first_value = |name: &str| -> Option<f64> {
        header
            .iter()
            .position(|h| h == name)
            .and_then(|idx| columns[idx - 2].first().copied().flatten())
    };
    if let Some(v) = first_value("adr_period") {
        settings.adr_period = v as usize;
    }
    if let Some(v) = first_value("brick_size") {
        settings.brick_size = v;
    }
    if let Some(v) = first_value("reversal_size") {
        settings.reversal_size = v;
    }
    if let Some(v) = first_value("wick_mode") {
        settings.wick_mode = match v as u8 {
            1 => WickMode::Big,
            2 => WickMode::None,
            _ => WickMode::All,
        };
    }
    if let Some(v) = first_value("ma1_period") {
        settings.ma1_period = v as usize;
    }
    if let Some(v) = first_value("ma2_period") {
        settings.ma2_period = v as usize;
    }
    if let Some(v) = first_value("ma3_period") {
        settings.ma3_period = v as usize;
    }
    if let Some(v) = first_value("chop_period") {
        settings.chop_period = v as usize;
    }
    if let Some(v) = first_value("smae1_period") {
        settings.smae1_period = v as usize;
    }
    if let Some(v) = first_value("smae1_deviation") {
        settings.smae1_deviation = v;
    }
    if let Some(v) = first_value("smae2_period") {
        settings.smae2_period = v as usize;
    }
    if let Some(v) = first_value("smae2_deviation") {
        settings.smae2_deviation = v;
    }
    let mut sigmas = Vec::new();
    for k in 1.. {
        match first_value(&format!("pwap_sigma{k}")) {
            Some(v) => sigmas.push(v),
            None => break,
        }
    }
    if !sigmas.is_empty() {
        settings.pwap_sigmas = sigmas;
    }

    let mut table = FeatureTable::new(timestamps, session_dates, settings);
    for (k, name) in header.iter().enumerate().skip(2) {
        table.push_column(name, std::mem::take(&mut columns[k - 2]));
    }
    Ok(table)
}

/// Write any serializable report as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize JSON to {path:?}"))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read a JSON file into any deserializable value.
pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse JSON from {path:?}"))
}
