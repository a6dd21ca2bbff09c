//! Offline renderer: fetch (or read) price history and write the chart.
//!
//! Usage:
//!   render [--input prices.json] [--out rainbow.svg] [--json chart.json]
//!          [--range 1y] [--layout stacked|interval] [--bands classic|compact]
//!          [--model log_power|log_linear]

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::env;
use std::fs;

use rainbowchart::chart::axis::{format_date, format_usd_full};
use rainbowchart::chart::render_svg;
use rainbowchart::config::Config;
use rainbowchart::pipeline::load_chart;
use rainbowchart::server::ChartQuery;
use rainbowchart::upstream::{self, FileSource, PriceSource};

struct Args {
    input: Option<String>,
    out: String,
    json: Option<String>,
    query: ChartQuery,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        input: None,
        out: "rainbow.svg".to_string(),
        json: None,
        query: ChartQuery::default(),
    };
    let mut it = env::args().skip(1);
    while let Some(flag) = it.next() {
        let mut value = || it.next().with_context(|| format!("{} needs a value", flag));
        match flag.as_str() {
            "--input" => args.input = Some(value()?),
            "--out" => args.out = value()?,
            "--json" => args.json = Some(value()?),
            "--range" => args.query.range = Some(value()?),
            "--layout" => args.query.layout = Some(value()?),
            "--bands" => args.query.bands = Some(value()?),
            "--model" => args.query.model = Some(value()?),
            other => bail!("unknown argument {}", other),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let cfg = Config::from_env();
    let source: Box<dyn PriceSource> = match &args.input {
        Some(path) => Box::new(FileSource::new(path)),
        None => upstream::from_config(&cfg)?,
    };

    let opts = args.query.resolve(&cfg);
    let (data, report) = load_chart(source.as_ref(), &opts, cfg.stale_ttl_secs).await?;

    fs::write(&args.out, render_svg(&data, opts.width, opts.height))
        .with_context(|| format!("writing {}", args.out))?;
    if let Some(path) = &args.json {
        let payload = json!({ "chart": data, "report": report });
        fs::write(path, serde_json::to_string_pretty(&payload)?)
            .with_context(|| format!("writing {}", path))?;
    }

    println!("source      {}", source.describe());
    println!("samples     {} kept, {} dropped", report.kept, report.dropped);
    println!(
        "fit         {} slope={:.4} intercept={:.4} r2={:.4}",
        data.fit.model.as_str(),
        data.fit.slope,
        data.fit.intercept,
        data.fit.r_squared
    );
    if let Some(cur) = &data.current {
        println!(
            "latest      {} {} ({:.2}x baseline, {})",
            format_date(cur.ts),
            format_usd_full(cur.price),
            cur.ratio,
            cur.label.unwrap_or("outside bands")
        );
    }
    println!("wrote       {}", args.out);
    Ok(())
}
