use chrono::NaiveDate;

use crate::bands::{BandLayout, BandSet};
use crate::chart::ChartOptions;
use crate::range::Range;
use crate::regression::{RegressionModel, GENESIS_TS};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub upstream_url: String,
    pub upstream_timeout_secs: u64,
    pub upstream_retries: u32,
    /// Serve this JSON payload instead of calling the upstream API.
    pub price_file: Option<String>,
    pub cache_max_age: u64,
    pub cache_swr: u64,
    pub default_range: Range,
    pub default_layout: BandLayout,
    pub band_set: BandSet,
    pub model: RegressionModel,
    pub model_origin_ts: i64,
    pub projection_days: u32,
    pub stale_ttl_secs: i64,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            upstream_url: "https://api.blockchain.info/charts/market-price".to_string(),
            upstream_timeout_secs: 15,
            upstream_retries: 0,
            price_file: None,
            cache_max_age: 3600,
            cache_swr: 86_400,
            default_range: Range::All,
            default_layout: BandLayout::Stacked,
            band_set: BandSet::Classic,
            model: RegressionModel::LogPower,
            model_origin_ts: GENESIS_TS,
            projection_days: 0,
            stale_ttl_secs: 3 * 86_400,
            chart_width: 1100,
            chart_height: 560,
        }
    }
}

fn parse_origin(s: &str) -> Option<i64> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(d.host),
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.port),
            upstream_url: std::env::var("UPSTREAM_URL").unwrap_or(d.upstream_url),
            upstream_timeout_secs: std::env::var("UPSTREAM_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.upstream_timeout_secs),
            upstream_retries: std::env::var("UPSTREAM_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.upstream_retries),
            price_file: std::env::var("PRICE_FILE").ok().filter(|v| !v.is_empty()),
            cache_max_age: std::env::var("CACHE_MAX_AGE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.cache_max_age),
            cache_swr: std::env::var("CACHE_SWR").ok().and_then(|v| v.parse().ok()).unwrap_or(d.cache_swr),
            default_range: std::env::var("DEFAULT_RANGE").ok().and_then(|v| Range::parse(&v)).unwrap_or(d.default_range),
            default_layout: std::env::var("DEFAULT_LAYOUT").ok().and_then(|v| BandLayout::parse(&v)).unwrap_or(d.default_layout),
            band_set: std::env::var("BAND_SET").ok().and_then(|v| BandSet::parse(&v)).unwrap_or(d.band_set),
            model: std::env::var("REGRESSION_MODEL").ok().and_then(|v| RegressionModel::parse(&v)).unwrap_or(d.model),
            model_origin_ts: std::env::var("MODEL_ORIGIN").ok().and_then(|v| parse_origin(&v)).unwrap_or(d.model_origin_ts),
            projection_days: std::env::var("PROJECTION_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.projection_days),
            stale_ttl_secs: std::env::var("STALE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.stale_ttl_secs),
            chart_width: std::env::var("CHART_WIDTH").ok().and_then(|v| v.parse().ok()).unwrap_or(d.chart_width),
            chart_height: std::env::var("CHART_HEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.chart_height),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cache_control(&self) -> String {
        format!(
            "public, s-maxage={}, stale-while-revalidate={}",
            self.cache_max_age, self.cache_swr
        )
    }

    /// Chart options from configured defaults.
    pub fn chart_options(&self) -> ChartOptions {
        ChartOptions {
            range: self.default_range,
            layout: self.default_layout,
            bands: self.band_set,
            model: self.model,
            origin_ts: self.model_origin_ts,
            projection_days: self.projection_days,
            width: self.chart_width,
            height: self.chart_height,
        }
    }
}
