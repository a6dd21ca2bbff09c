//! Normalization of upstream price payloads into a uniform daily series.
//!
//! Upstream chart APIs are loosely typed: values come back as `{x, y}`
//! objects, `[ts, price]` pairs, numbers or numeric strings, seconds or
//! milliseconds. Everything here funnels into `PriceSeries`, sorted by time
//! with one positive price per timestamp.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DAY_SECS: i64 = 86_400;

/// Numeric timestamps above this are milliseconds.
const MS_THRESHOLD: f64 = 1e11;
/// Spacing (in days) above which consecutive samples are reported as a gap.
const GAP_THRESHOLD_DAYS: i64 = 7;
const MAX_ROW_WARNINGS: usize = 5;

const TS_KEYS: [&str; 5] = ["x", "time", "date", "timestamp", "t"];
const PRICE_KEYS: [&str; 5] = ["y", "price", "close", "value", "p"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeriesError {
    #[error("unrecognized payload shape: {0}")]
    UnrecognizedShape(String),
    #[error("payload contains no usable price rows")]
    Empty,
    #[error("upstream reported status {0:?}")]
    UpstreamStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix seconds
    pub ts: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub start_ts: i64,
    pub end_ts: i64,
    pub missing_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesReport {
    pub rows: u64,
    pub kept: u64,
    pub dropped: u64,
    pub duplicates: u64,
    pub gaps: Vec<Gap>,
    pub first_ts: Option<i64>,
    pub last_ts: Option<i64>,
    pub stale: bool,
    pub warnings: Vec<String>,
}

impl PriceSeries {
    /// Builds a series from arbitrary points: invalid prices are dropped, the
    /// rest sorted, and for duplicate timestamps the last one wins.
    pub fn from_points(points: Vec<PricePoint>) -> Result<Self, SeriesError> {
        let (series, _) = Self::assemble(points);
        if series.is_empty() {
            return Err(SeriesError::Empty);
        }
        Ok(series)
    }

    fn assemble(mut points: Vec<PricePoint>) -> (Self, u64) {
        points.retain(|p| p.price.is_finite() && p.price > 0.0);
        points.sort_by_key(|p| p.ts);

        let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
        let mut duplicates = 0u64;
        for p in points {
            match out.last_mut() {
                Some(last) if last.ts == p.ts => {
                    *last = p;
                    duplicates += 1;
                }
                _ => out.push(p),
            }
        }
        (Self { points: out }, duplicates)
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Points with `start_ts <= ts <= end_ts`.
    pub fn window(&self, start_ts: i64, end_ts: i64) -> PriceSeries {
        let lo = self.points.partition_point(|p| p.ts < start_ts);
        let hi = self.points.partition_point(|p| p.ts <= end_ts);
        PriceSeries {
            points: self.points[lo..hi.max(lo)].to_vec(),
        }
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.ts).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }
}

/// Normalize an upstream payload into a sorted, deduplicated series.
pub fn normalize(value: &Value) -> Result<PriceSeries, SeriesError> {
    let rows = extract_rows(value)?;
    let (points, _, _) = parse_rows(rows);
    PriceSeries::from_points(points)
}

/// Like [`normalize`], also reporting what was dropped and whether the last
/// sample is older than `ttl_secs` relative to `now_ts`.
pub fn normalize_with_report(
    value: &Value,
    now_ts: i64,
    ttl_secs: i64,
) -> Result<(PriceSeries, SeriesReport), SeriesError> {
    let rows = extract_rows(value)?;
    let (points, dropped, warnings) = parse_rows(rows);
    let (series, duplicates) = PriceSeries::assemble(points);
    if series.is_empty() {
        return Err(SeriesError::Empty);
    }

    let gaps = series
        .points
        .windows(2)
        .filter_map(|w| {
            let span = w[1].ts.saturating_sub(w[0].ts);
            (span > GAP_THRESHOLD_DAYS * DAY_SECS).then(|| Gap {
                start_ts: w[0].ts,
                end_ts: w[1].ts,
                missing_days: span / DAY_SECS - 1,
            })
        })
        .collect();

    let first_ts = series.first().map(|p| p.ts);
    let last_ts = series.last().map(|p| p.ts);
    let stale = last_ts
        .map(|ts| now_ts.saturating_sub(ts) > ttl_secs)
        .unwrap_or(true);

    let report = SeriesReport {
        rows: rows.len() as u64,
        kept: series.len() as u64,
        dropped: dropped + duplicates,
        duplicates,
        gaps,
        first_ts,
        last_ts,
        stale,
        warnings,
    };
    Ok((series, report))
}

fn extract_rows(value: &Value) -> Result<&Vec<Value>, SeriesError> {
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(map) => {
            if let Some(status) = map.get("status").and_then(Value::as_str) {
                if !status.eq_ignore_ascii_case("ok") {
                    return Err(SeriesError::UpstreamStatus(status.to_string()));
                }
            }
            if let Some(err) = map.get("error").and_then(Value::as_str) {
                return Err(SeriesError::UpstreamStatus(err.to_string()));
            }
            for key in ["values", "prices", "data"] {
                match map.get(key) {
                    Some(Value::Array(rows)) => return Ok(rows),
                    Some(inner @ Value::Object(_)) => return extract_rows(inner),
                    _ => {}
                }
            }
            Err(SeriesError::UnrecognizedShape(
                "object without values/prices/data".to_string(),
            ))
        }
        Value::Null => Err(SeriesError::UnrecognizedShape("null".to_string())),
        Value::Bool(_) => Err(SeriesError::UnrecognizedShape("bool".to_string())),
        Value::Number(_) => Err(SeriesError::UnrecognizedShape("number".to_string())),
        Value::String(_) => Err(SeriesError::UnrecognizedShape("string".to_string())),
    }
}

fn parse_rows(rows: &[Value]) -> (Vec<PricePoint>, u64, Vec<String>) {
    let mut points = Vec::with_capacity(rows.len());
    let mut dropped = 0u64;
    let mut warnings = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        match parse_row(row) {
            Some(p) if p.price.is_finite() && p.price > 0.0 => points.push(p),
            parsed => {
                dropped += 1;
                if warnings.len() < MAX_ROW_WARNINGS {
                    let why = if parsed.is_some() { "non_positive_price" } else { "unparseable" };
                    warnings.push(format!("bad_row[{}]: {}", i, why));
                }
            }
        }
    }
    if dropped as usize > MAX_ROW_WARNINGS {
        warnings.push(format!("{} more bad rows", dropped as usize - MAX_ROW_WARNINGS));
    }
    (points, dropped, warnings)
}

fn parse_row(row: &Value) -> Option<PricePoint> {
    match row {
        Value::Array(cells) if cells.len() >= 2 => Some(PricePoint {
            ts: parse_ts(&cells[0])?,
            price: parse_num(&cells[1])?,
        }),
        Value::Object(map) => {
            let ts = TS_KEYS.iter().find_map(|k| map.get(*k)).and_then(parse_ts)?;
            let price = PRICE_KEYS.iter().find_map(|k| map.get(*k)).and_then(parse_num)?;
            Some(PricePoint { ts, price })
        }
        _ => None,
    }
}

fn parse_num(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_ts(v: &Value) -> Option<i64> {
    if let Some(n) = parse_num(v) {
        let secs = if n.abs() > MS_THRESHOLD { n / 1000.0 } else { n };
        // `as` saturates; anything chrono cannot represent is unparseable
        let ts = secs.floor() as i64;
        return DateTime::from_timestamp(ts, 0).map(|_| ts);
    }
    let s = v.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_blockchain_values_shape() {
        let payload = json!({
            "status": "ok",
            "name": "Market Price (USD)",
            "values": [
                {"x": 1_600_000_000, "y": 10_500.0},
                {"x": 1_600_086_400, "y": 10_700.5}
            ]
        });
        let series = normalize(&payload).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().price, 10_500.0);
    }

    #[test]
    fn parses_millisecond_pairs_under_prices() {
        let payload = json!({"prices": [[1_600_086_400_000i64, 2.0], [1_600_000_000_000i64, 1.0]]});
        let series = normalize(&payload).unwrap();
        assert_eq!(series.timestamps(), vec![1_600_000_000, 1_600_086_400]);
        assert_eq!(series.prices(), vec![1.0, 2.0]);
    }

    #[test]
    fn parses_string_numbers_and_date_strings() {
        let payload = json!([
            {"date": "2021-01-01", "close": "29000.5"},
            {"time": "2021-01-02T00:00:00Z", "price": 32000}
        ]);
        let series = normalize(&payload).unwrap();
        assert_eq!(series.first().unwrap().ts, 1_609_459_200);
        assert_eq!(series.first().unwrap().price, 29000.5);
        assert_eq!(series.last().unwrap().ts, 1_609_545_600);
    }

    #[test]
    fn unwraps_nested_data_object() {
        let payload = json!({"data": {"values": [{"x": 10, "y": 1.5}]}});
        assert_eq!(normalize(&payload).unwrap().len(), 1);
    }

    #[test]
    fn drops_zero_and_garbage_rows() {
        let payload = json!({"values": [
            {"x": 1, "y": 0.0},
            {"x": 2, "y": -3.0},
            {"x": 3, "y": "n/a"},
            {"x": 4},
            "junk",
            {"x": 5, "y": 7.0}
        ]});
        let series = normalize(&payload).unwrap();
        assert_eq!(series.points(), &[PricePoint { ts: 5, price: 7.0 }]);
    }

    #[test]
    fn duplicate_timestamps_keep_last() {
        let payload = json!([[100, 1.0], [100, 2.0], [50, 3.0]]);
        let (series, report) = normalize_with_report(&payload, 100, 1_000).unwrap();
        assert_eq!(series.prices(), vec![3.0, 2.0]);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.kept, 2);
    }

    #[test]
    fn error_status_is_reported() {
        let payload = json!({"status": "error", "values": []});
        assert_eq!(
            normalize(&payload),
            Err(SeriesError::UpstreamStatus("error".to_string()))
        );
    }

    #[test]
    fn empty_and_unknown_shapes_fail() {
        assert_eq!(normalize(&json!({"values": []})), Err(SeriesError::Empty));
        assert!(matches!(
            normalize(&json!({"foo": 1})),
            Err(SeriesError::UnrecognizedShape(_))
        ));
        assert!(matches!(
            normalize(&json!(42)),
            Err(SeriesError::UnrecognizedShape(_))
        ));
    }

    #[test]
    fn report_detects_gaps_and_staleness() {
        let day = DAY_SECS;
        let payload = json!([[0, 1.0], [day, 1.0], [11 * day, 1.0], [12 * day, "bad"]]);
        let (_, report) = normalize_with_report(&payload, 20 * day, 2 * day).unwrap();
        assert_eq!(report.rows, 4);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].missing_days, 9);
        assert!(report.stale);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn out_of_range_timestamps_are_dropped() {
        let payload = json!([[-1e300, 1.0], [1e300, 1.0], [1_600_000_000i64, 2.0], [1_600_086_400i64, 3.0]]);
        let (series, report) = normalize_with_report(&payload, 1_600_086_400, DAY_SECS).unwrap();
        assert_eq!(series.timestamps(), vec![1_600_000_000, 1_600_086_400]);
        assert_eq!(report.dropped, 2);
        assert!(report.gaps.is_empty());
        assert_eq!(report.warnings, vec!["bad_row[0]: unparseable", "bad_row[1]: unparseable"]);
    }

    #[test]
    fn window_is_inclusive() {
        let series = PriceSeries::from_points(
            (0..10).map(|i| PricePoint { ts: i * 10, price: 1.0 }).collect(),
        )
        .unwrap();
        let w = series.window(20, 50);
        assert_eq!(w.timestamps(), vec![20, 30, 40, 50]);
        assert!(series.window(1_000, 2_000).is_empty());
    }
}
