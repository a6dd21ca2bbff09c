use serde::{Deserialize, Serialize};

use crate::series::{PriceSeries, DAY_SECS};

/// Visible time range, always ending at the newest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Range {
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "all")]
    All,
}

pub const ALL_RANGES: [Range; 7] = [
    Range::OneMonth,
    Range::ThreeMonths,
    Range::SixMonths,
    Range::OneYear,
    Range::TwoYears,
    Range::FiveYears,
    Range::All,
];

impl Range {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Some(Self::OneMonth),
            "3m" => Some(Self::ThreeMonths),
            "6m" => Some(Self::SixMonths),
            "1y" => Some(Self::OneYear),
            "2y" => Some(Self::TwoYears),
            "5y" => Some(Self::FiveYears),
            "all" | "max" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMonth => "1m",
            Self::ThreeMonths => "3m",
            Self::SixMonths => "6m",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::All => "all",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
            Self::TwoYears => "2Y",
            Self::FiveYears => "5Y",
            Self::All => "All",
        }
    }

    pub fn days(&self) -> Option<i64> {
        match self {
            Self::OneMonth => Some(30),
            Self::ThreeMonths => Some(91),
            Self::SixMonths => Some(182),
            Self::OneYear => Some(365),
            Self::TwoYears => Some(730),
            Self::FiveYears => Some(1826),
            Self::All => None,
        }
    }

    /// Upstream `timespan` parameter covering this range.
    pub fn timespan(&self) -> &'static str {
        match self {
            Self::OneMonth => "30days",
            Self::ThreeMonths => "3months",
            Self::SixMonths => "6months",
            Self::OneYear => "1years",
            Self::TwoYears => "2years",
            Self::FiveYears => "5years",
            Self::All => "all",
        }
    }

    /// `(start_ts, end_ts)` of the window over `series`, or `None` when the
    /// series is empty.
    pub fn bounds(&self, series: &PriceSeries) -> Option<(i64, i64)> {
        let first = series.first()?.ts;
        let end = series.last()?.ts;
        let start = match self.days() {
            Some(d) => (end - d * DAY_SECS).max(first),
            None => first,
        };
        Some((start, end))
    }

    pub fn apply(&self, series: &PriceSeries) -> PriceSeries {
        match self.bounds(series) {
            Some((start, end)) => series.window(start, end),
            None => PriceSeries::default(),
        }
    }
}
