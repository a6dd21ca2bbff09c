//! Server-side SVG rendering of a `ChartData`.

use std::time::Instant;

use super::axis::{format_usd, price_ticks, time_ticks};
use super::ChartData;
use crate::logging::{log_render, ProfileScope};

const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 16.0;
const MARGIN_BOTTOM: f64 = 32.0;
const BAND_OPACITY: f64 = 0.85;

struct Frame {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    t_min: f64,
    t_max: f64,
    log_min: f64,
    log_max: f64,
}

impl Frame {
    fn x(&self, ts: i64) -> f64 {
        let span = (self.t_max - self.t_min).max(1.0);
        self.x0 + (ts as f64 - self.t_min) / span * (self.x1 - self.x0)
    }

    fn y(&self, v: f64) -> f64 {
        let span = (self.log_max - self.log_min).max(f64::EPSILON);
        self.y1 - (v.log10() - self.log_min) / span * (self.y1 - self.y0)
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Indices to draw: at most ~2 per horizontal pixel, always keeping the last.
fn sample_indices(n: usize, plot_width: f64) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let stride = (n as f64 / (plot_width * 2.0).max(1.0)).ceil().max(1.0) as usize;
    let mut idx: Vec<usize> = (0..n).step_by(stride).collect();
    if idx.last() != Some(&(n - 1)) {
        idx.push(n - 1);
    }
    idx
}

fn value_range(data: &ChartData) -> Option<(f64, f64)> {
    let candidates = data
        .price
        .iter()
        .flatten()
        .copied()
        .chain(data.bands.first().into_iter().flat_map(|b| b.lower.iter().copied()))
        .chain(data.bands.last().into_iter().flat_map(|b| b.upper.iter().copied()))
        .filter(|v| v.is_finite() && *v > 0.0);
    let (lo, hi) = candidates.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    (lo.is_finite() && hi.is_finite()).then_some((lo, hi))
}

pub fn render_svg(data: &ChartData, width: u32, height: u32) -> String {
    let _prof = ProfileScope::new("render_svg");
    let started = Instant::now();
    let svg = draw(data, width, height);
    log_render(
        "svg",
        data.len(),
        svg.len(),
        started.elapsed().as_secs_f64() * 1000.0,
    );
    svg
}

fn draw(data: &ChartData, width: u32, height: u32) -> String {
    let (w, h) = (f64::from(width), f64::from(height));
    let mut out = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" class="rainbow-chart" viewBox="0 0 {w} {h}" width="{w}" height="{h}" font-family="sans-serif" font-size="11">"#
    );
    out.push_str(&format!(r##"<rect width="{w}" height="{h}" fill="#ffffff"/>"##));

    let (Some(&t_first), Some(&t_last), Some((v_min, v_max))) =
        (data.timestamps.first(), data.timestamps.last(), value_range(data))
    else {
        out.push_str(&format!(
            r##"<text x="{}" y="{}" text-anchor="middle" fill="#666">No data</text></svg>"##,
            w / 2.0,
            h / 2.0
        ));
        return out;
    };

    let pad = 0.05 * (v_max.log10() - v_min.log10()).max(0.1);
    let frame = Frame {
        x0: MARGIN_LEFT,
        x1: w - MARGIN_RIGHT,
        y0: MARGIN_TOP,
        y1: h - MARGIN_BOTTOM,
        t_min: t_first as f64,
        t_max: t_last as f64,
        log_min: v_min.log10() - pad,
        log_max: v_max.log10() + pad,
    };
    let idx = sample_indices(data.timestamps.len(), frame.x1 - frame.x0);

    // gridlines and y labels
    for tick in price_ticks(10f64.powf(frame.log_min), 10f64.powf(frame.log_max)) {
        let y = frame.y(tick);
        out.push_str(&format!(
            r##"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#e5e5e5"/><text x="{:.1}" y="{:.1}" text-anchor="end" fill="#444">{}</text>"##,
            frame.x0,
            frame.x1,
            frame.x0 - 6.0,
            y + 4.0,
            format_usd(tick)
        ));
    }
    for (ts, label) in time_ticks(t_first, t_last) {
        let x = frame.x(ts);
        out.push_str(&format!(
            r##"<line x1="{x:.1}" y1="{:.1}" x2="{x:.1}" y2="{:.1}" stroke="#f0f0f0"/><text x="{x:.1}" y="{:.1}" text-anchor="middle" fill="#444">{}</text>"##,
            frame.y0,
            frame.y1,
            frame.y1 + 18.0,
            escape(&label)
        ));
    }

    // bands, bottom first; skipped where the model has no baseline
    let band_idx: Vec<usize> = idx
        .iter()
        .copied()
        .filter(|&i| data.baseline[i].is_finite() && data.baseline[i] > 0.0)
        .collect();
    for band in data.bands.iter().filter(|_| !band_idx.is_empty()) {
        let mut d = String::new();
        for (k, &i) in band_idx.iter().enumerate() {
            let cmd = if k == 0 { 'M' } else { 'L' };
            d.push_str(&format!(
                "{}{:.1},{:.1}",
                cmd,
                frame.x(data.timestamps[i]),
                frame.y(band.upper[i])
            ));
        }
        for &i in band_idx.iter().rev() {
            d.push_str(&format!(
                "L{:.1},{:.1}",
                frame.x(data.timestamps[i]),
                frame.y(band.lower[i])
            ));
        }
        out.push_str(&format!(
            r#"<path class="band" d="{d}Z" fill="{}" fill-opacity="{BAND_OPACITY}"><title>{}</title></path>"#,
            band.color,
            escape(band.label)
        ));
    }

    // baseline
    let points: Vec<String> = idx
        .iter()
        .filter(|&&i| data.baseline[i].is_finite())
        .map(|&i| format!("{:.1},{:.1}", frame.x(data.timestamps[i]), frame.y(data.baseline[i])))
        .collect();
    out.push_str(&format!(
        r##"<polyline class="baseline" points="{}" fill="none" stroke="#555" stroke-width="1" stroke-dasharray="4 3"/>"##,
        points.join(" ")
    ));

    // price, split wherever a sample is missing
    let mut runs: Vec<Vec<String>> = vec![Vec::new()];
    for &i in &idx {
        match data.price[i] {
            Some(p) => {
                if let Some(run) = runs.last_mut() {
                    run.push(format!("{:.1},{:.1}", frame.x(data.timestamps[i]), frame.y(p)));
                }
            }
            None => runs.push(Vec::new()),
        }
    }
    for run in runs.iter().filter(|r| r.len() > 1) {
        out.push_str(&format!(
            r##"<polyline class="price" points="{}" fill="none" stroke="#111" stroke-width="1.5"/>"##,
            run.join(" ")
        ));
    }

    // axes
    out.push_str(&format!(
        r##"<line x1="{x0:.1}" y1="{y1:.1}" x2="{x1:.1}" y2="{y1:.1}" stroke="#888"/><line x1="{x0:.1}" y1="{y0:.1}" x2="{x0:.1}" y2="{y1:.1}" stroke="#888"/>"##,
        x0 = frame.x0,
        x1 = frame.x1,
        y0 = frame.y0,
        y1 = frame.y1
    ));

    // legend, top band first
    for (k, entry) in data.legend.iter().enumerate() {
        let y = frame.y0 + 8.0 + 16.0 * k as f64;
        out.push_str(&format!(
            r##"<rect x="{:.1}" y="{:.1}" width="12" height="12" fill="{}" stroke="#999"/><text x="{:.1}" y="{:.1}" fill="#222">{}</text>"##,
            frame.x0 + 10.0,
            y - 10.0,
            entry.color,
            frame.x0 + 28.0,
            y,
            escape(&entry.text)
        ));
    }

    out.push_str("</svg>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartOptions;
    use crate::regression::GENESIS_TS;
    use crate::series::{PricePoint, PriceSeries, DAY_SECS};

    fn chart(days: i64) -> ChartData {
        let s = PriceSeries::from_points(
            (100..100 + days)
                .map(|d| PricePoint {
                    ts: GENESIS_TS + d * DAY_SECS,
                    price: (0.004 * d as f64).exp() * (1.0 + 0.3 * (d as f64 / 40.0).sin()),
                })
                .collect(),
        )
        .unwrap();
        ChartData::build(
            &s,
            &ChartOptions {
                projection_days: 60,
                ..ChartOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn renders_every_layer() {
        let svg = render_svg(&chart(1500), 800, 400);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches(r#"class="band""#).count(), 9);
        assert_eq!(svg.matches(r#"class="baseline""#).count(), 1);
        assert_eq!(svg.matches(r#"class="price""#).count(), 1);
        assert!(svg.contains("HODL!"));
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn bands_skip_samples_before_a_late_origin() {
        let s = PriceSeries::from_points(
            (0..400)
                .map(|d| PricePoint {
                    ts: GENESIS_TS + d * DAY_SECS,
                    price: 1.0 + d as f64,
                })
                .collect(),
        )
        .unwrap();
        let data = ChartData::build(
            &s,
            &ChartOptions {
                origin_ts: GENESIS_TS + 100 * DAY_SECS,
                ..ChartOptions::default()
            },
        )
        .unwrap();
        assert!(data.baseline[0].is_nan());
        let svg = render_svg(&data, 800, 400);
        assert!(!svg.contains("NaN"));
        assert_eq!(svg.matches(r#"class="band""#).count(), 9);
    }

    #[test]
    fn empty_chart_renders_placeholder() {
        let mut data = chart(10);
        data.timestamps.clear();
        let svg = render_svg(&data, 300, 200);
        assert!(svg.contains("No data"));
    }

    #[test]
    fn downsampling_keeps_last_index() {
        let idx = sample_indices(10_000, 500.0);
        assert!(idx.len() <= 1001);
        assert_eq!(idx.last(), Some(&9_999));
        assert_eq!(sample_indices(3, 500.0), vec![0, 1, 2]);
    }
}
