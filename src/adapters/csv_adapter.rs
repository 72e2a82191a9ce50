//! Tab-separated OHLCV files and comma-separated feature tables.
//!
//! OHLCV files carry a header naming at least `timestamp`, `open`, `high`,
//! `low`, `close` and `volume`; other columns are ignored. Timestamps use
//! `%Y-%m-%d %H:%M:%S` (a bare `%Y-%m-%d` is read as midnight).

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::error::AlphalabError;
use crate::domain::features::FeatureTable;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::tuning::TIMESTAMP_FORMAT;
use crate::ports::data_port::MarketDataPort;

const OHLCV_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

fn format_error(path: &Path, reason: impl Into<String>) -> AlphalabError {
    AlphalabError::DataFormat {
        source_name: path.display().to_string(),
        reason: reason.into(),
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

fn ensure_parent(path: &Path) -> Result<(), AlphalabError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Read every bar of a tab-separated OHLCV file, sorted by timestamp.
pub fn read_ohlcv(path: &Path, symbol: &str) -> Result<Vec<OhlcvBar>, AlphalabError> {
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new().delimiter(b'\t').from_reader(file);

    let headers = rdr
        .headers()
        .map_err(|e| format_error(path, format!("CSV header error: {}", e)))?
        .clone();
    let mut index = [0usize; 6];
    for (slot, name) in index.iter_mut().zip(OHLCV_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| format_error(path, format!("missing {} column", name)))?;
    }

    let mut bars = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| format_error(path, format!("CSV parse error: {}", e)))?;
        let field = |k: usize| record.get(index[k]).unwrap_or("").trim();

        let timestamp = parse_timestamp(field(0)).ok_or_else(|| {
            format_error(path, format!("row {}: invalid timestamp {:?}", line + 1, field(0)))
        })?;
        let mut values = [0.0f64; 5];
        for (k, value) in values.iter_mut().enumerate() {
            *value = field(k + 1).parse().map_err(|_| {
                format_error(
                    path,
                    format!("row {}: invalid {} value {:?}", line + 1, OHLCV_COLUMNS[k + 1], field(k + 1)),
                )
            })?;
        }
        let [open, high, low, close, volume] = values;
        bars.push(OhlcvBar {
            symbol: symbol.to_string(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

pub fn write_ohlcv(path: &Path, bars: &[OhlcvBar]) -> Result<(), AlphalabError> {
    ensure_parent(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| format_error(path, e.to_string()))?;
    let write_err = |e: csv::Error| format_error(path, e.to_string());

    wtr.write_record(OHLCV_COLUMNS).map_err(write_err)?;
    for bar in bars {
        wtr.write_record([
            bar.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])
        .map_err(write_err)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a feature table with a leading `timestamp` column. Missing values
/// are written as empty fields.
pub fn write_feature_table(path: &Path, table: &FeatureTable) -> Result<(), AlphalabError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(|e| format_error(path, e.to_string()))?;
    let write_err = |e: csv::Error| format_error(path, e.to_string());

    let mut header = vec!["timestamp".to_string()];
    header.extend(table.columns.iter().map(|c| c.name.clone()));
    wtr.write_record(&header).map_err(write_err)?;

    for (i, ts) in table.timestamps.iter().enumerate() {
        let mut row = Vec::with_capacity(table.columns.len() + 1);
        row.push(ts.format(TIMESTAMP_FORMAT).to_string());
        for col in &table.columns {
            row.push(col.values[i].map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&row).map_err(write_err)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_feature_table(path: &Path) -> Result<FeatureTable, AlphalabError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| match e.into_kind() {
        csv::ErrorKind::Io(io) => AlphalabError::Io(io),
        other => format_error(path, format!("{:?}", other)),
    })?;
    let headers = rdr
        .headers()
        .map_err(|e| format_error(path, e.to_string()))?
        .clone();
    if headers.get(0) != Some("timestamp") {
        return Err(format_error(path, "first column must be timestamp"));
    }
    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut timestamps = Vec::new();
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); names.len()];
    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| format_error(path, e.to_string()))?;
        let ts = record.get(0).and_then(parse_timestamp).ok_or_else(|| {
            format_error(path, format!("row {}: invalid timestamp", line + 1))
        })?;
        timestamps.push(ts);
        for (j, col) in columns.iter_mut().enumerate() {
            let raw = record.get(j + 1).unwrap_or("").trim();
            let value = if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                None
            } else {
                Some(raw.parse::<f64>().map_err(|_| {
                    format_error(path, format!("row {}: invalid {} value {:?}", line + 1, names[j], raw))
                })?)
            };
            col.push(value);
        }
    }

    let mut table = FeatureTable::new(timestamps);
    for (name, values) in names.iter().zip(columns) {
        table.insert(name, values)?;
    }
    Ok(table)
}

/// Serves bars from one OHLCV file.
pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl MarketDataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _interval: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, AlphalabError> {
        let bars: Vec<OhlcvBar> = read_ohlcv(&self.path, symbol)?
            .into_iter()
            .filter(|b| b.date() >= start && b.date() <= end)
            .collect();
        if bars.is_empty() {
            return Err(AlphalabError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}
