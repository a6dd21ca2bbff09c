//! HTTP surface: page shell, chart JSON/SVG and the upstream proxy.

pub mod page;

use anyhow::Result;
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

use crate::bands::{BandLayout, BandSet};
use crate::chart::{render_svg, ChartOptions};
use crate::config::Config;
use crate::logging::{error, info, log_request, obj, v_str, warn, Domain};
use crate::pipeline::{load_chart, PipelineError};
use crate::range::Range;
use crate::regression::RegressionModel;
use crate::upstream::PriceSource;

pub struct AppState {
    pub config: Config,
    pub source: Arc<dyn PriceSource>,
}

/// Chart selection from the query string; unknown values fall back to the
/// configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    pub range: Option<String>,
    pub layout: Option<String>,
    pub bands: Option<String>,
    pub model: Option<String>,
}

fn pick<T: Copy>(key: &str, raw: Option<&str>, parse: fn(&str) -> Option<T>, default: T) -> T {
    match raw {
        None => default,
        Some(v) => parse(v).unwrap_or_else(|| {
            warn(
                Domain::Http,
                "bad_query_value",
                obj(&[("param", v_str(key)), ("value", v_str(v))]),
            );
            default
        }),
    }
}

impl ChartQuery {
    pub fn resolve(&self, cfg: &Config) -> ChartOptions {
        let d = cfg.chart_options();
        ChartOptions {
            range: pick("range", self.range.as_deref(), Range::parse, d.range),
            layout: pick("layout", self.layout.as_deref(), BandLayout::parse, d.layout),
            bands: pick("bands", self.bands.as_deref(), BandSet::parse, d.bands),
            model: pick("model", self.model.as_deref(), RegressionModel::parse, d.model),
            ..d
        }
    }
}

fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Regression(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn log_pipeline_error(err: &PipelineError) {
    error(
        Domain::Upstream,
        "chart_unavailable",
        obj(&[("error", v_str(&err.to_string()))]),
    );
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        log_pipeline_error(&self);
        (pipeline_status(&self), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn etag_for(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

fn header_value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static("no-store"))
}

async fn index_page(State(state): State<Arc<AppState>>, Query(q): Query<ChartQuery>) -> Response {
    let opts = q.resolve(&state.config);
    match load_chart(state.source.as_ref(), &opts, state.config.stale_ttl_secs).await {
        Ok((data, _)) => Html(page::chart_page(&data, &opts)).into_response(),
        Err(err) => {
            log_pipeline_error(&err);
            (pipeline_status(&err), Html(page::error_page(&opts, &err.to_string()))).into_response()
        }
    }
}

async fn rainbow_json(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ChartQuery>,
    headers: HeaderMap,
) -> Result<Response, PipelineError> {
    let opts = q.resolve(&state.config);
    let (data, report) = load_chart(state.source.as_ref(), &opts, state.config.stale_ttl_secs).await?;
    let body = json!({ "chart": data, "report": report }).to_string();
    let etag = etag_for(body.as_bytes());

    let cache = header_value(&state.config.cache_control());
    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == etag)
        .unwrap_or(false);
    if not_modified {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, header_value(&etag)), (header::CACHE_CONTROL, cache)],
        )
            .into_response());
    }
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::ETAG, header_value(&etag)),
            (header::CACHE_CONTROL, cache),
        ],
        body,
    )
        .into_response())
}

async fn chart_svg(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ChartQuery>,
) -> Result<Response, PipelineError> {
    let opts = q.resolve(&state.config);
    let (data, _) = load_chart(state.source.as_ref(), &opts, state.config.stale_ttl_secs).await?;
    let svg = render_svg(&data, opts.width, opts.height);
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/svg+xml")),
            (header::CACHE_CONTROL, header_value(&state.config.cache_control())),
        ],
        svg,
    )
        .into_response())
}

/// Pass-through to the price source: query forwarded, status and JSON body
/// relayed, cache header added.
async fn proxy_chart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    match state.source.fetch(&query).await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (
                status,
                [(header::CACHE_CONTROL, header_value(&state.config.cache_control()))],
                Json(resp.body),
            )
                .into_response()
        }
        Err(err) => {
            error(
                Domain::Upstream,
                "proxy_failed",
                obj(&[("error", v_str(&format!("{:#}", err)))]),
            );
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("{:#}", err) })),
            )
                .into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn log_requests(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(req).await;
    log_request(&path, resp.status().as_u16(), started.elapsed().as_secs_f64() * 1000.0);
    resp
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/api/chart", get(proxy_chart))
        .route("/api/rainbow", get(rainbow_json))
        .route("/chart.svg", get(chart_svg))
        .route("/api/health", get(health))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: Config, source: Arc<dyn PriceSource>) -> Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info(
        Domain::System,
        "listening",
        obj(&[
            ("addr", v_str(&addr)),
            ("source", v_str(&source.describe())),
        ]),
    );
    let state = Arc::new(AppState { config, source });
    axum::serve(listener, router(state)).await?;
    Ok(())
}
