//! Session clock resolution
//!
//! Converts the nominated time column into float seconds and re-orders the
//! table by it. Three interpretations are tried in turn:
//! - plain numbers (used as-is)
//! - elapsed durations such as `0 days 00:01:02.5`, `00:01:02` or `1m 30s`
//! - absolute timestamps, made relative to the first valid sample
//!
//! Rows whose time does not resolve are dropped after the stable sort.

use crate::data::table::{parse_number, FlightTable, RawColumn};
use crate::error::{FdrError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// How the time column was read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInterpretation {
    Numeric,
    Duration,
    Timestamp,
}

/// Rows ordered by resolved time
#[derive(Debug, Clone)]
pub struct TimeSeries {
    /// Seconds, non-decreasing
    pub timestamps: Vec<f64>,
    /// Input table restricted to resolved rows, in timestamp order
    pub table: FlightTable,
    pub interpretation: TimeInterpretation,
    /// Rows removed because their time did not resolve
    pub dropped_rows: usize,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Parser for elapsed-time strings
#[derive(Debug, Clone)]
struct DurationParser {
    clock: Regex,
    unit: Regex,
}

impl DurationParser {
    fn new() -> Result<Self> {
        let clock = Regex::new(
            r"^(?P<sign>-)?(?:(?P<days>\d+)\s*days?,?\s*)?(?P<h>\d+):(?P<m>\d{1,2}):(?P<s>\d{1,2}(?:\.\d+)?)$",
        )
        .map_err(|e| FdrError::ComputationError(e.to_string()))?;
        let unit = Regex::new(
            r"(?i)(?P<num>\d+(?:\.\d+)?)\s*(?P<unit>days?|d|hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s|milliseconds?|ms|microseconds?|us|nanoseconds?|ns)\b",
        )
        .map_err(|e| FdrError::ComputationError(e.to_string()))?;
        Ok(Self { clock, unit })
    }

    fn parse(&self, raw: &str) -> Option<f64> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(caps) = self.clock.captures(text) {
            let days: f64 = caps.name("days").map_or(Some(0.0), |m| m.as_str().parse().ok())?;
            let hours: f64 = caps["h"].parse().ok()?;
            let minutes: f64 = caps["m"].parse().ok()?;
            let seconds: f64 = caps["s"].parse().ok()?;
            let total = days * 86_400.0 + hours * 3_600.0 + minutes * 60.0 + seconds;
            return Some(if caps.name("sign").is_some() { -total } else { total });
        }

        self.parse_units(text)
    }

    fn parse_units(&self, text: &str) -> Option<f64> {
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, text),
        };

        let mut total = 0.0;
        let mut covered = 0usize;
        let mut cursor = 0usize;
        for caps in self.unit.captures_iter(body) {
            let whole = caps.get(0)?;
            if !body[cursor..whole.start()].trim().is_empty() {
                return None;
            }
            cursor = whole.end();
            covered += 1;

            let value: f64 = caps["num"].parse().ok()?;
            let factor = match caps["unit"].to_ascii_lowercase().as_str() {
                "d" | "day" | "days" => 86_400.0,
                "h" | "hr" | "hrs" | "hour" | "hours" => 3_600.0,
                "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
                "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
                "ms" | "millisecond" | "milliseconds" => 1e-3,
                "us" | "microsecond" | "microseconds" => 1e-6,
                "ns" | "nanosecond" | "nanoseconds" => 1e-9,
                _ => return None,
            };
            total += value * factor;
        }

        if covered == 0 || !body[cursor..].trim().is_empty() {
            return None;
        }
        Some(if negative { -total } else { total })
    }
}

/// Absolute timestamp in epoch seconds
fn parse_timestamp(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_micros() as f64 / 1e6);
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ndt.and_utc().timestamp_micros() as f64 / 1e6);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            let ndt = date.and_hms_opt(0, 0, 0)?;
            return Some(ndt.and_utc().timestamp_micros() as f64 / 1e6);
        }
    }
    None
}

/// Resolves the session clock of a table
#[derive(Debug, Clone)]
pub struct TimeResolver {
    column: String,
    durations: DurationParser,
}

impl TimeResolver {
    pub fn new(column: impl Into<String>) -> Result<Self> {
        Ok(Self {
            column: column.into(),
            durations: DurationParser::new()?,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Parse the time column, sort rows by it and drop unresolved rows
    pub fn resolve(&self, table: &FlightTable) -> Result<TimeSeries> {
        let raw = table
            .column(&self.column)
            .ok_or_else(|| FdrError::MissingTimeColumn(self.column.clone()))?;

        if table.n_rows() == 0 {
            return Err(FdrError::EmptyInput);
        }

        let (seconds, interpretation) = self.parse_column(raw)?;

        let mut order: Vec<usize> = (0..seconds.len()).filter(|&i| seconds[i].is_some()).collect();
        order.sort_by(|&a, &b| {
            let (ta, tb) = (seconds[a].unwrap_or(f64::NAN), seconds[b].unwrap_or(f64::NAN));
            ta.total_cmp(&tb)
        });

        if order.is_empty() {
            return Err(FdrError::EmptyInput);
        }

        let timestamps: Vec<f64> = order.iter().filter_map(|&i| seconds[i]).collect();
        let dropped_rows = table.n_rows() - order.len();

        info!(
            column = %self.column,
            interpretation = ?interpretation,
            rows = order.len(),
            dropped_rows,
            "Resolved session time"
        );

        Ok(TimeSeries {
            timestamps,
            table: table.take_rows(&order),
            interpretation,
            dropped_rows,
        })
    }

    /// Interpret a raw time column as seconds
    pub fn parse_column(&self, raw: &RawColumn) -> Result<(Vec<Option<f64>>, TimeInterpretation)> {
        let parse_error = || FdrError::TimeParse(self.column.clone());

        let text = match raw {
            RawColumn::Numeric(values) => {
                if values.iter().all(Option::is_none) {
                    return Err(parse_error());
                }
                return Ok((values.clone(), TimeInterpretation::Numeric));
            }
            RawColumn::Text(values) => values,
        };

        let present: Vec<&str> = text
            .iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if present.is_empty() {
            return Err(parse_error());
        }

        if present.iter().all(|s| parse_number(s).is_some()) {
            debug!(column = %self.column, "Time column holds plain numbers");
            return Ok((raw.to_numeric(), TimeInterpretation::Numeric));
        }

        let durations: Vec<Option<f64>> = text
            .iter()
            .map(|v| v.as_deref().and_then(|s| self.durations.parse(s)))
            .collect();
        if durations.iter().any(Option::is_some) {
            return Ok((durations, TimeInterpretation::Duration));
        }

        let absolute: Vec<Option<f64>> = text
            .iter()
            .map(|v| v.as_deref().and_then(parse_timestamp))
            .collect();
        if let Some(base) = absolute.iter().flatten().next().copied() {
            let relative = absolute.into_iter().map(|v| v.map(|t| t - base)).collect();
            return Ok((relative, TimeInterpretation::Timestamp));
        }

        Err(parse_error())
    }
}
