//! Page shell: navigation, range selector, chart and summary.

use crate::bands::BandPosition;
use crate::chart::axis::{format_date, format_usd_full};
use crate::chart::{render_svg, ChartData, ChartOptions};
use crate::range::ALL_RANGES;

const STYLE: &str = r#"
body { margin: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; background: #fafafa; color: #222; }
nav { display: flex; gap: 20px; align-items: center; padding: 12px 24px; background: #16181d; }
nav a { color: #ddd; text-decoration: none; }
nav .brand { font-weight: 600; color: #f7931a; }
main { max-width: 1140px; margin: 0 auto; padding: 16px 20px; }
.ranges { display: flex; gap: 6px; margin: 8px 0 12px; }
.ranges a { padding: 4px 10px; border: 1px solid #ccc; border-radius: 4px; color: #333; text-decoration: none; }
.ranges a.active { background: #16181d; color: #fff; border-color: #16181d; }
.summary { display: flex; gap: 24px; margin: 12px 0; }
.summary div span { display: block; font-size: 12px; color: #777; }
.error { padding: 16px; background: #fdecea; border: 1px solid #f5c2c0; border-radius: 4px; }
footer { color: #888; font-size: 12px; margin-top: 16px; }
"#;

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn nav() -> &'static str {
    r#"<nav><a class="brand" href="/">Bitcoin Rainbow Chart</a><a href="/">Chart</a><a href="/api/rainbow">Data</a><a href="/chart.svg">SVG</a></nav>"#
}

fn query_string(opts: &ChartOptions, range: &str) -> String {
    format!(
        "range={}&layout={}&bands={}&model={}",
        range,
        opts.layout.as_str(),
        opts.bands.as_str(),
        opts.model.as_str()
    )
}

fn range_selector(opts: &ChartOptions) -> String {
    let mut out = String::from(r#"<div class="ranges">"#);
    for r in ALL_RANGES {
        let class = if r == opts.range { r#" class="active""# } else { "" };
        out.push_str(&format!(
            r#"<a{} href="/?{}">{}</a>"#,
            class,
            escape(&query_string(opts, r.as_str())),
            r.label()
        ));
    }
    out.push_str(&format!(
        r#"<a href="/api/chart?timespan={}">raw data</a></div>"#,
        opts.range.timespan()
    ));
    out
}

fn summary(data: &ChartData) -> String {
    let Some(cur) = &data.current else {
        return String::new();
    };
    let band = match (cur.position, cur.label) {
        (BandPosition::Inside(_), Some(label)) => label.to_string(),
        (BandPosition::Above, _) => "Above all bands".to_string(),
        _ => "Below all bands".to_string(),
    };
    format!(
        r#"<div class="summary"><div><span>Price ({})</span>{}</div><div><span>Baseline</span>{}</div><div><span>Price / baseline</span>{:.2}x</div><div><span>Band</span>{}</div><div><span>Fit R²</span>{:.3}</div></div>"#,
        format_date(cur.ts),
        format_usd_full(cur.price),
        format_usd_full(cur.baseline),
        cur.ratio,
        escape(&band),
        data.fit.r_squared
    )
}

fn shell(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Bitcoin Rainbow Chart</title>
<style>{}</style>
</head>
<body>
{}
<main>
{}
<footer>Bands are fixed multiples of a log regression fitted to the full price history. Not investment advice.</footer>
</main>
</body>
</html>"#,
        STYLE,
        nav(),
        body
    )
}

pub fn chart_page(data: &ChartData, opts: &ChartOptions) -> String {
    let body = format!(
        "<h1>Bitcoin Rainbow Chart</h1>{}{}{}",
        range_selector(opts),
        summary(data),
        render_svg(data, opts.width, opts.height)
    );
    shell(&body)
}

pub fn error_page(opts: &ChartOptions, message: &str) -> String {
    let body = format!(
        r#"<h1>Bitcoin Rainbow Chart</h1>{}<div class="error">Price data is unavailable right now: {}</div>"#,
        range_selector(opts),
        escape(message)
    );
    shell(&body)
}
