//! Fetch, normalize, fit, band: the path from a price source to `ChartData`.

use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::chart::{ChartData, ChartOptions};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::regression::RegressionError;
use crate::series::{normalize_with_report, PriceSeries, SeriesError, SeriesReport};
use crate::upstream::PriceSource;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream request failed: {0:#}")]
    Upstream(anyhow::Error),
    #[error("upstream answered with status {0}")]
    UpstreamStatus(u16),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Regression(#[from] RegressionError),
}

/// Full price history from `source`. The regression always needs every
/// sample, so the upstream timespan is pinned to `all`.
pub async fn fetch_series(
    source: &dyn PriceSource,
    stale_ttl_secs: i64,
) -> Result<(PriceSeries, SeriesReport), PipelineError> {
    let query = [("timespan".to_string(), "all".to_string())];
    let resp = source.fetch(&query).await.map_err(PipelineError::Upstream)?;
    if !resp.is_success() {
        return Err(PipelineError::UpstreamStatus(resp.status));
    }

    let (series, report) = normalize_with_report(&resp.body, Utc::now().timestamp(), stale_ttl_secs)?;
    let level = if report.dropped > 0 || report.stale { Level::Warn } else { Level::Debug };
    log(
        level,
        Domain::Series,
        "normalized",
        obj(&[
            ("source", v_str(&source.describe())),
            ("rows", json!(report.rows)),
            ("kept", json!(report.kept)),
            ("dropped", json!(report.dropped)),
            ("gaps", json!(report.gaps.len())),
            ("stale", json!(report.stale)),
            ("warnings", json!(report.warnings)),
        ]),
    );
    Ok((series, report))
}

pub async fn load_chart(
    source: &dyn PriceSource,
    opts: &ChartOptions,
    stale_ttl_secs: i64,
) -> Result<(ChartData, SeriesReport), PipelineError> {
    let (series, report) = fetch_series(source, stale_ttl_secs).await?;
    let data = ChartData::build(&series, opts)?;
    Ok((data, report))
}
