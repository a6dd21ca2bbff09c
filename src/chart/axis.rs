//! Axis ticks and label formatting.

use chrono::{DateTime, Datelike, NaiveDate};

use crate::series::DAY_SECS;

const MAX_TIME_TICKS: i64 = 12;

fn trim_zeros(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Compact USD label: `$0.05`, `$950`, `$1.2k`, `$45k`, `$1.5M`.
pub fn format_usd(v: f64) -> String {
    if !v.is_finite() {
        return "-".to_string();
    }
    let sign = if v < 0.0 { "-" } else { "" };
    let a = v.abs();
    // unit is picked on the rounded value so 999.6 reads $1k, not $1000
    let body = if (a / 1e3).round() >= 1e3 {
        format!("{}M", trim_zeros(format!("{:.1}", a / 1e6)))
    } else if a >= 1e4 {
        format!("{:.0}k", a / 1e3)
    } else if a.round() >= 1e3 {
        format!("{}k", trim_zeros(format!("{:.1}", a / 1e3)))
    } else if a >= 10.0 {
        format!("{:.0}", a)
    } else if a >= 0.01 || a == 0.0 {
        trim_zeros(format!("{:.2}", a))
    } else {
        trim_zeros(format!("{:.4}", a))
    };
    format!("{}${}", sign, body)
}

/// Full price for tooltips and summaries: `$43,512.07`.
pub fn format_usd_full(v: f64) -> String {
    if !v.is_finite() {
        return "-".to_string();
    }
    let cents = (v.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if v < 0.0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Log-scale ticks within `[min, max]`: powers of ten, plus 2x and 5x
/// subdivisions when the span covers two decades or less.
pub fn price_ticks(min: f64, max: f64) -> Vec<f64> {
    if !(min > 0.0 && max > min) {
        return Vec::new();
    }
    let lo = min.log10().floor() as i32;
    let hi = max.log10().ceil() as i32;
    let fine = hi - lo <= 2;
    let mut ticks = Vec::new();
    for exp in lo..=hi {
        let decade = 10f64.powi(exp);
        let steps: &[f64] = if fine { &[1.0, 2.0, 5.0] } else { &[1.0] };
        for m in steps {
            let t = decade * m;
            if t >= min && t <= max {
                ticks.push(t);
            }
        }
    }
    ticks
}

pub fn date_of(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

pub fn format_date(ts: i64) -> String {
    date_of(ts)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn ts_of(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp())
}

/// Date ticks in `[start, end]`: years for spans over two years, months
/// otherwise, thinned to at most a dozen labels.
pub fn time_ticks(start: i64, end: i64) -> Vec<(i64, String)> {
    let (Some(first), Some(last)) = (date_of(start), date_of(end)) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let span_days = (end - start) / DAY_SECS;
    if span_days > 730 {
        let years = i64::from(last.year() - first.year()) + 1;
        let step = ((years + MAX_TIME_TICKS - 1) / MAX_TIME_TICKS).max(1) as i32;
        (first.year()..=last.year() + 1)
            .step_by(step as usize)
            .filter_map(|y| NaiveDate::from_ymd_opt(y, 1, 1))
            .filter_map(|d| ts_of(d).map(|ts| (ts, d.year().to_string())))
            .filter(|(ts, _)| *ts >= start && *ts <= end)
            .collect()
    } else {
        let months = i64::from(last.year() - first.year()) * 12
            + i64::from(last.month()) - i64::from(first.month()) + 1;
        let step = ((months + MAX_TIME_TICKS - 1) / MAX_TIME_TICKS).max(1);
        let mut ticks = Vec::new();
        let (mut y, mut m) = (first.year(), first.month());
        let mut k = 0i64;
        while (y, m) <= (last.year(), last.month() + 1) {
            if k % step == 0 {
                if let Some(ts) = NaiveDate::from_ymd_opt(y, m, 1).and_then(ts_of) {
                    if ts >= start && ts <= end {
                        if let Some(d) = date_of(ts) {
                            ticks.push((ts, d.format("%b %Y").to_string()));
                        }
                    }
                }
            }
            k += 1;
            m += 1;
            if m > 12 {
                m = 1;
                y += 1;
            }
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_labels() {
        assert_eq!(format_usd(0.05), "$0.05");
        assert_eq!(format_usd(0.0012), "$0.0012");
        assert_eq!(format_usd(1.5), "$1.5");
        assert_eq!(format_usd(950.0), "$950");
        assert_eq!(format_usd(1_200.0), "$1.2k");
        assert_eq!(format_usd(1_000.0), "$1k");
        assert_eq!(format_usd(45_000.0), "$45k");
        assert_eq!(format_usd(1_500_000.0), "$1.5M");
        assert_eq!(format_usd(f64::NAN), "-");
    }

    #[test]
    fn usd_labels_roll_over_unit_boundaries() {
        assert_eq!(format_usd(999.4), "$999");
        assert_eq!(format_usd(999.6), "$1k");
        assert_eq!(format_usd(9_990.0), "$10k");
        assert_eq!(format_usd(999_400.0), "$999k");
        assert_eq!(format_usd(999_999.0), "$1M");
        assert_eq!(format_usd(-999.6), "-$1k");
    }

    #[test]
    fn full_usd_groups_thousands() {
        assert_eq!(format_usd_full(43_512.07), "$43,512.07");
        assert_eq!(format_usd_full(999.5), "$999.50");
        assert_eq!(format_usd_full(1_000_000.0), "$1,000,000.00");
    }

    #[test]
    fn log_ticks_coarse_and_fine() {
        assert_eq!(price_ticks(0.05, 150_000.0), vec![0.1, 1.0, 10.0, 100.0, 1e3, 1e4, 1e5]);
        assert_eq!(
            price_ticks(15_000.0, 70_000.0),
            vec![20_000.0, 50_000.0]
        );
        assert!(price_ticks(0.0, 10.0).is_empty());
    }

    #[test]
    fn yearly_ticks_for_long_spans() {
        // 2015-06-01 .. 2020-06-01
        let ticks = time_ticks(1_433_116_800, 1_590_969_600);
        let labels: Vec<_> = ticks.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(labels, vec!["2016", "2017", "2018", "2019", "2020"]);
    }

    #[test]
    fn monthly_ticks_for_short_spans() {
        // 2024-01-15 .. 2024-04-20
        let ticks = time_ticks(1_705_276_800, 1_713_571_200);
        let labels: Vec<_> = ticks.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(labels, vec!["Feb 2024", "Mar 2024", "Apr 2024"]);
    }

    #[test]
    fn dates_format_as_iso() {
        assert_eq!(format_date(1_609_459_200), "2021-01-01");
    }
}
