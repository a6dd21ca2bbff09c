//! Log regression baseline.
//!
//! Fits `ln(price) = intercept + slope * x` by ordinary least squares, where
//! `x` is either days since the model origin (log-linear) or
//! `ln(days + 1)` (log-power). The baseline is `exp` of the fitted line.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::log_fit;
use crate::series::{PriceSeries, DAY_SECS};

/// 2009-01-03T00:00:00Z, the genesis block date.
pub const GENESIS_TS: i64 = 1_230_940_800;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegressionError {
    #[error("need at least 2 usable samples, got {0}")]
    TooFewSamples(usize),
    #[error("x values have zero variance")]
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionModel {
    LogLinear,
    LogPower,
}

impl RegressionModel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log_linear" | "loglinear" | "linear" | "exp" => Some(Self::LogLinear),
            "log_power" | "logpower" | "power" | "log" => Some(Self::LogPower),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogLinear => "log_linear",
            Self::LogPower => "log_power",
        }
    }

    /// Regressor for a sample `days` after the origin. NaN when undefined.
    pub fn x(&self, days: f64) -> f64 {
        match self {
            Self::LogLinear => days,
            Self::LogPower => {
                if days + 1.0 > 0.0 {
                    (days + 1.0).ln()
                } else {
                    f64::NAN
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fit {
    pub model: RegressionModel,
    pub origin_ts: i64,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub n: usize,
}

pub fn days_since(origin_ts: i64, ts: i64) -> f64 {
    ts.saturating_sub(origin_ts) as f64 / DAY_SECS as f64
}

/// Closed-form least squares over `(x, ln price)` for every usable sample.
pub fn fit(
    series: &PriceSeries,
    model: RegressionModel,
    origin_ts: i64,
) -> Result<Fit, RegressionError> {
    let samples: Vec<(f64, f64)> = series
        .points()
        .iter()
        .map(|p| (model.x(days_since(origin_ts, p.ts)), p.price.ln()))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();

    let n = samples.len();
    if n < 2 {
        return Err(RegressionError::TooFewSamples(n));
    }

    let nf = n as f64;
    let (sum_x, sum_y, sum_xy, sum_x2) = samples.iter().fold(
        (0.0, 0.0, 0.0, 0.0),
        |(sx, sy, sxy, sx2), (x, y)| (sx + x, sy + y, sxy + x * y, sx2 + x * x),
    );

    let denominator = nf * sum_x2 - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON * nf * sum_x2.max(1.0) {
        return Err(RegressionError::Degenerate);
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / nf;

    let mean_y = sum_y / nf;
    let (ss_res, ss_tot) = samples.iter().fold((0.0, 0.0), |(res, tot), (x, y)| {
        let e = y - (intercept + slope * x);
        (res + e * e, tot + (y - mean_y).powi(2))
    });
    let r_squared = if ss_tot <= f64::EPSILON {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    log_fit(model.as_str(), slope, intercept, r_squared, n);

    Ok(Fit {
        model,
        origin_ts,
        slope,
        intercept,
        r_squared,
        n,
    })
}

impl Fit {
    pub fn x_at(&self, ts: i64) -> f64 {
        self.model.x(days_since(self.origin_ts, ts))
    }

    /// Baseline price at `ts`; NaN where the model is undefined.
    pub fn baseline_at(&self, ts: i64) -> f64 {
        (self.intercept + self.slope * self.x_at(ts)).exp()
    }

    pub fn baseline(&self, series: &PriceSeries) -> Vec<f64> {
        series.points().iter().map(|p| self.baseline_at(p.ts)).collect()
    }

    /// Baseline sampled every `step_days` after `from_ts` up to and
    /// including `to_ts`.
    pub fn project(&self, from_ts: i64, to_ts: i64, step_days: u32) -> Vec<(i64, f64)> {
        let step = i64::from(step_days.max(1)) * DAY_SECS;
        let mut out = Vec::new();
        let mut next = from_ts.checked_add(step);
        while let Some(ts) = next.filter(|ts| *ts <= to_ts) {
            out.push((ts, self.baseline_at(ts)));
            next = ts.checked_add(step);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::PricePoint;

    fn series_from(f: impl Fn(f64) -> f64, days: std::ops::Range<i64>) -> PriceSeries {
        PriceSeries::from_points(
            days.map(|d| PricePoint {
                ts: GENESIS_TS + d * DAY_SECS,
                price: f(d as f64),
            })
            .collect(),
        )
        .unwrap()
    }

    #[test]
    fn recovers_exact_power_law() {
        let s = series_from(|d| (-12.0 + 4.5 * (d + 1.0).ln()).exp(), 100..4000);
        let fit = fit(&s, RegressionModel::LogPower, GENESIS_TS).unwrap();
        assert!((fit.slope - 4.5).abs() < 1e-9, "slope {}", fit.slope);
        assert!((fit.intercept + 12.0).abs() < 1e-8, "intercept {}", fit.intercept);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert_eq!(fit.n, 3900);
    }

    #[test]
    fn recovers_exact_exponential() {
        let s = series_from(|d| (1.0 + 0.002 * d).exp(), 0..1000);
        let fit = fit(&s, RegressionModel::LogLinear, GENESIS_TS).unwrap();
        assert!((fit.slope - 0.002).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        let b = fit.baseline_at(GENESIS_TS + 500 * DAY_SECS);
        assert!((b - 2.0_f64.exp()).abs() < 1e-6);
    }

    #[test]
    fn skips_samples_before_origin_for_power_model() {
        let s = series_from(|_| 5.0, -10..3);
        // only the sample on the shifted origin itself has days + 1 > 0
        let err = fit(&s, RegressionModel::LogPower, GENESIS_TS + 2 * DAY_SECS).unwrap_err();
        assert_eq!(err, RegressionError::TooFewSamples(1));
        let ok = fit(&s, RegressionModel::LogPower, GENESIS_TS).unwrap();
        assert_eq!(ok.n, 3);
        assert!(ok.slope.abs() < 1e-12);
    }

    #[test]
    fn single_sample_is_too_few() {
        let s = series_from(|_| 1.0, 5..6);
        assert_eq!(
            fit(&s, RegressionModel::LogLinear, GENESIS_TS),
            Err(RegressionError::TooFewSamples(1))
        );
    }

    #[test]
    fn projection_steps_forward() {
        let s = series_from(|d| (0.01 * d).exp(), 0..10);
        let fit = fit(&s, RegressionModel::LogLinear, GENESIS_TS).unwrap();
        let last = GENESIS_TS + 9 * DAY_SECS;
        let proj = fit.project(last, last + 30 * DAY_SECS, 10);
        assert_eq!(proj.len(), 3);
        assert_eq!(proj[0].0, last + 10 * DAY_SECS);
        assert!(proj[2].1 > proj[0].1);
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        assert!(days_since(i64::MAX, i64::MIN) < 0.0);
        assert!(days_since(i64::MIN, i64::MAX) > 0.0);
        let s = PriceSeries::from_points(vec![
            PricePoint { ts: i64::MIN, price: 1.0 },
            PricePoint { ts: GENESIS_TS + DAY_SECS, price: 2.0 },
            PricePoint { ts: GENESIS_TS + 2 * DAY_SECS, price: 3.0 },
        ])
        .unwrap();
        // the far-past point has no log-power regressor and is skipped
        let fit = fit(&s, RegressionModel::LogPower, GENESIS_TS).unwrap();
        assert_eq!(fit.n, 2);
    }

    #[test]
    fn model_names_round_trip() {
        for m in [RegressionModel::LogLinear, RegressionModel::LogPower] {
            assert_eq!(RegressionModel::parse(m.as_str()), Some(m));
        }
        assert_eq!(RegressionModel::parse("POWER"), Some(RegressionModel::LogPower));
        assert_eq!(RegressionModel::parse("cubic"), None);
    }
}
