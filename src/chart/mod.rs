//! Chart model: everything a renderer needs, computed from a price series.

pub mod axis;
pub mod svg;

use serde::Serialize;

use crate::bands::{classify, derive_bands, layout_bands, Band, BandLayout, BandPosition, BandSeries, BandSet};
use crate::logging::ProfileScope;
use crate::range::Range;
use crate::regression::{fit, Fit, RegressionError, RegressionModel};
use crate::series::PriceSeries;

pub use svg::render_svg;

/// Spacing of projected baseline samples past the last price.
const PROJECTION_STEP_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartOptions {
    pub range: Range,
    pub layout: BandLayout,
    pub bands: BandSet,
    pub model: RegressionModel,
    pub origin_ts: i64,
    pub projection_days: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            range: Range::All,
            layout: BandLayout::Stacked,
            bands: BandSet::Classic,
            model: RegressionModel::LogPower,
            origin_ts: crate::regression::GENESIS_TS,
            projection_days: 0,
            width: 1100,
            height: 560,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: &'static str,
    pub color: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Valuation {
    pub ts: i64,
    pub price: f64,
    pub baseline: f64,
    pub ratio: f64,
    #[serde(flatten)]
    pub position: BandPosition,
    pub label: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub range: Range,
    pub layout: BandLayout,
    pub band_set: BandSet,
    pub fit: Fit,
    /// Sample times, followed by projected times when a projection is on.
    pub timestamps: Vec<i64>,
    /// `None` on projected samples.
    pub price: Vec<Option<f64>>,
    pub baseline: Vec<f64>,
    pub band_series: BandSeries,
    pub legend: Vec<LegendEntry>,
    pub current: Option<Valuation>,
    #[serde(skip)]
    pub bands: Vec<Band>,
}

fn legend_text(label: &str, lo: f64, hi: f64) -> String {
    format!("{} ({}x to {}x)", label, lo, hi)
}

impl ChartData {
    /// Fits on the full history, then cuts the visible range.
    pub fn build(series: &PriceSeries, opts: &ChartOptions) -> Result<Self, RegressionError> {
        let _prof = ProfileScope::with_context(
            "chart_build",
            &[
                ("points", serde_json::json!(series.len())),
                ("range", serde_json::json!(opts.range.as_str())),
            ],
        );

        let fit = fit(series, opts.model, opts.origin_ts)?;
        let visible = opts.range.apply(series);

        let mut timestamps = visible.timestamps();
        let mut price: Vec<Option<f64>> = visible.prices().into_iter().map(Some).collect();
        if let (Some(last), true) = (visible.last(), opts.projection_days > 0) {
            let to = last
                .ts
                .saturating_add(i64::from(opts.projection_days) * crate::series::DAY_SECS);
            for (ts, _) in fit.project(last.ts, to, PROJECTION_STEP_DAYS) {
                timestamps.push(ts);
                price.push(None);
            }
        }

        let baseline: Vec<f64> = timestamps.iter().map(|ts| fit.baseline_at(*ts)).collect();
        let bands = derive_bands(&baseline, opts.bands);
        let band_series = layout_bands(&bands, opts.layout);

        let legend = bands
            .iter()
            .rev()
            .map(|b| LegendEntry {
                label: b.label,
                color: b.color,
                text: legend_text(b.label, b.lower_mult, b.upper_mult),
            })
            .collect();

        let current = series.last().map(|p| {
            let base = fit.baseline_at(p.ts);
            let position = classify(p.price, base, opts.bands);
            let label = match position {
                BandPosition::Inside(i) => opts.bands.specs().get(i).map(|s| s.label),
                _ => None,
            };
            Valuation {
                ts: p.ts,
                price: p.price,
                baseline: base,
                ratio: p.price / base,
                position,
                label,
            }
        });

        Ok(Self {
            range: opts.range,
            layout: opts.layout,
            band_set: opts.bands,
            fit,
            timestamps,
            price,
            baseline,
            band_series,
            legend,
            current,
            bands,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
