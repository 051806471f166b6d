//! CSV minute-bar history adapter.
//!
//! Reads a whole minute-bar file up front (column order: time, open, high,
//! low, close, optional volume; header names matched case-insensitively by
//! prefix, so "Time (UTC)", "OPEN", "close_px" all resolve). Timestamps are
//! either naive `%Y-%m-%d %H:%M:%S` interpreted as UTC, or RFC 3339.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::domain::bar::MinuteBar;
use crate::domain::error::EngineError;
use crate::ports::market_data_port::MarketDataPort;

#[derive(Debug)]
pub struct CsvBarAdapter {
    bars: Vec<MinuteBar>,
}

struct ColumnMap {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn map_columns(headers: &csv::StringRecord, path: &Path) -> Result<ColumnMap, EngineError> {
    let mut time = None;
    let mut open = None;
    let mut high = None;
    let mut low = None;
    let mut close = None;
    let mut volume = None;

    for (index, raw) in headers.iter().enumerate() {
        let name = normalize(raw);
        if time.is_none() && (name.starts_with("time") || name.contains("datetime")) {
            time = Some(index);
        } else if open.is_none() && name.starts_with("open") {
            open = Some(index);
        } else if high.is_none() && name.starts_with("high") {
            high = Some(index);
        } else if low.is_none() && name.starts_with("low") {
            low = Some(index);
        } else if close.is_none() && name.starts_with("close") {
            close = Some(index);
        } else if volume.is_none() && name.starts_with("vol") {
            volume = Some(index);
        }
    }

    match (time, open, high, low, close) {
        (Some(time), Some(open), Some(high), Some(low), Some(close)) => Ok(ColumnMap {
            time,
            open,
            high,
            low,
            close,
            volume,
        }),
        _ => Err(EngineError::DataSource {
            reason: format!(
                "{}: could not locate time/open/high/low/close columns",
                path.display()
            ),
        }),
    }
}

fn parse_timestamp(raw: &str, path: &Path, line: usize) -> Result<DateTime<Utc>, EngineError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| EngineError::DataSource {
            reason: format!("{}:{line}: invalid timestamp {raw:?}", path.display()),
        })
}

fn parse_price(
    record: &csv::StringRecord,
    index: usize,
    field: &str,
    path: &Path,
    line: usize,
) -> Result<f64, EngineError> {
    record
        .get(index)
        .and_then(|raw| raw.trim().parse().ok())
        .ok_or_else(|| EngineError::DataSource {
            reason: format!("{}:{line}: invalid {field} value", path.display()),
        })
}

impl CsvBarAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| EngineError::DataSource {
            reason: format!("failed to open {}: {e}", path.display()),
        })?;
        let mut reader = csv::Reader::from_reader(file);

        let headers = reader.headers().map_err(|e| EngineError::DataSource {
            reason: format!("{}: {e}", path.display()),
        })?;
        let columns = map_columns(headers, &path)?;

        let mut bars = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let line = row + 2;
            let record = result.map_err(|e| EngineError::DataSource {
                reason: format!("{}:{line}: {e}", path.display()),
            })?;

            let raw_time = record.get(columns.time).ok_or_else(|| EngineError::DataSource {
                reason: format!("{}:{line}: missing time column", path.display()),
            })?;
            let open_time = parse_timestamp(raw_time, &path, line)?;

            bars.push(MinuteBar {
                open_time,
                close_time: open_time + Duration::minutes(1),
                open: parse_price(&record, columns.open, "open", &path, line)?,
                high: parse_price(&record, columns.high, "high", &path, line)?,
                low: parse_price(&record, columns.low, "low", &path, line)?,
                close: parse_price(&record, columns.close, "close", &path, line)?,
                volume: columns
                    .volume
                    .and_then(|i| record.get(i))
                    .and_then(|raw| raw.trim().parse().ok())
                    .unwrap_or(0),
            });
        }

        bars.sort_by_key(|b| b.open_time);
        Ok(Self { bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// All loaded bars in open-time order, for replay driving.
    pub fn bars(&self) -> &[MinuteBar] {
        &self.bars
    }
}

impl MarketDataPort for CsvBarAdapter {
    fn fetch_minute_bars(
        &self,
        _symbol: &str,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
    ) -> Result<Vec<MinuteBar>, EngineError> {
        Ok(self
            .bars
            .iter()
            .filter(|b| b.open_time >= from_utc && b.open_time < to_utc)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn loads_and_sorts_minute_bars() {
        let file = write_csv(
            "Time,Open,High,Low,Close,Volume\n\
             2024-03-15 14:31:00,101.0,102.0,100.5,101.5,250\n\
             2024-03-15 14:30:00,100.0,101.0,99.5,100.5,300\n",
        );
        let adapter = CsvBarAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.len(), 2);
        let first = &adapter.bars()[0];
        assert_eq!(
            first.open_time,
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()
        );
        assert_eq!(
            first.close_time,
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 31, 0).unwrap()
        );
        assert_eq!(first.volume, 300);
    }

    #[test]
    fn tolerant_header_matching() {
        let file = write_csv(
            "Time (UTC),OPEN_px,High_px,low_px,Close_px\n\
             2024-03-15 14:30:00,100.0,101.0,99.5,100.5\n",
        );
        let adapter = CsvBarAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.len(), 1);
        assert_eq!(adapter.bars()[0].volume, 0);
    }

    #[test]
    fn rfc3339_timestamps_accepted() {
        let file = write_csv(
            "time,open,high,low,close\n\
             2024-03-15T14:30:00+02:00,100.0,101.0,99.5,100.5\n",
        );
        let adapter = CsvBarAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.bars()[0].open_time,
            Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn fetch_respects_half_open_interval() {
        let file = write_csv(
            "time,open,high,low,close\n\
             2024-03-15 14:30:00,1,1,1,1\n\
             2024-03-15 14:31:00,2,2,2,2\n\
             2024-03-15 14:32:00,3,3,3,3\n",
        );
        let adapter = CsvBarAdapter::from_file(file.path()).unwrap();
        let bars = adapter
            .fetch_minute_bars(
                "MNQ",
                Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 15, 14, 32, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert!((bars[1].close - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_columns_error() {
        let file = write_csv("time,open,close\n2024-03-15 14:30:00,1,1\n");
        let err = CsvBarAdapter::from_file(file.path()).unwrap_err();
        assert!(matches!(err, EngineError::DataSource { .. }));
    }

    #[test]
    fn bad_timestamp_errors_with_line() {
        let file = write_csv("time,open,high,low,close\nnot-a-time,1,1,1,1\n");
        let err = CsvBarAdapter::from_file(file.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(":2:"), "got: {message}");
    }
}
