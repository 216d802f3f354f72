//! Axum JSON API over the skill-demand pipeline: series, forecast and
//! recommendation queries plus aggregation/forecast triggers.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use skillcast_adapters::raw_posting_from_json;
use skillcast_core::{Granularity, PipelineError, RegionCode, SeriesKey};
use skillcast_sync::{SyncConfig, SyncPipeline};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "skillcast-web";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SyncPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<SyncPipeline>) -> Self {
        Self { pipeline }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GranularityQuery {
    pub granularity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub skills: Vec<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// Raw postings in any of the field spellings sources use.
#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    #[serde(default = "default_source_id")]
    pub source_id: String,
    pub postings: Vec<JsonValue>,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

fn default_source_id() -> String {
    "api".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SeriesKeyRequest {
    pub tag: String,
    pub region: String,
    #[serde(default)]
    pub granularity: Option<String>,
}

/// `keys: null` (or omitted) forecasts every stale series.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastRequest {
    #[serde(default)]
    pub keys: Option<Vec<SeriesKeyRequest>>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/series/{tag}/{region}", get(series_handler))
        .route("/forecasts", get(forecasts_handler))
        .route("/forecasts/{tag}/{region}", get(forecast_handler))
        .route("/recommendations", post(recommendations_handler))
        .route("/runs/aggregate", post(aggregate_handler))
        .route("/runs/forecast", post(forecast_run_handler))
        .route("/runs/{run_id}", get(run_summary_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving skillcast api");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let pipeline = SyncPipeline::from_sync_config(&config).await?;
    serve(AppState::new(Arc::new(pipeline)), config.web_port).await
}

async fn health_handler() -> Response {
    Json(serde_json::json!({ "status": "ok", "service": CRATE_NAME })).into_response()
}

async fn series_handler(
    State(state): State<Arc<AppState>>,
    AxumPath((tag, region)): AxumPath<(String, String)>,
    Query(query): Query<GranularityQuery>,
) -> Response {
    let key = match series_key(&state, tag, &region, query.granularity.as_deref()) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    match state.pipeline.series_history(&key).await {
        Ok(Some(series)) => Json(series).into_response(),
        Ok(None) => not_found(format!("no demand series for {key}")),
        Err(err) => pipeline_error(err),
    }
}

async fn forecasts_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.forecasts().await {
        Ok(forecasts) => Json(forecasts).into_response(),
        Err(err) => pipeline_error(err),
    }
}

async fn forecast_handler(
    State(state): State<Arc<AppState>>,
    AxumPath((tag, region)): AxumPath<(String, String)>,
    Query(query): Query<GranularityQuery>,
) -> Response {
    let key = match series_key(&state, tag, &region, query.granularity.as_deref()) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    match state.pipeline.latest_forecast(&key).await {
        Ok(Some(forecast)) => Json(forecast).into_response(),
        Ok(None) => not_found(format!("no forecast yet for {key}")),
        Err(err) => pipeline_error(err),
    }
}

async fn recommendations_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecommendationRequest>,
) -> Response {
    let region = req.region.as_deref().map(RegionCode::new);
    match state.pipeline.recommend(&req.skills, region.as_ref()).await {
        Ok(rec) => Json(rec).into_response(),
        Err(err) => pipeline_error(err),
    }
}

/// Runs one batch. The caller owns retries; this handler reports a
/// retryable failure as 503 without retrying.
async fn aggregate_handler(State(state): State<Arc<AppState>>, Json(req): Json<AggregateRequest>) -> Response {
    let raws = req
        .postings
        .iter()
        .map(|value| raw_posting_from_json(&req.source_id, value))
        .collect::<Vec<_>>();
    let vocabulary = match state.pipeline.snapshot_vocabulary() {
        Ok(v) => v,
        Err(err) => return error_response(StatusCode::SERVICE_UNAVAILABLE, format!("{err:#}")),
    };
    let as_of = req.as_of.unwrap_or_else(Utc::now);
    match state.pipeline.run_batch(&raws, &vocabulary, as_of).await {
        Ok(batch) => {
            if let Err(err) = state.pipeline.write_batch_report(&batch).await {
                warn!(run_id = %batch.run_id, error = %err, "writing batch report failed");
            }
            Json(batch).into_response()
        }
        Err(err) => pipeline_error(err),
    }
}

async fn forecast_run_handler(State(state): State<Arc<AppState>>, Json(req): Json<ForecastRequest>) -> Response {
    let keys = match req.keys {
        Some(requested) => {
            let mut keys = Vec::with_capacity(requested.len());
            for k in requested {
                match series_key(&state, k.tag, &k.region, k.granularity.as_deref()) {
                    Ok(key) => keys.push(key),
                    Err(resp) => return resp,
                }
            }
            Some(keys)
        }
        None => None,
    };
    match state.pipeline.run_forecasts(keys, Utc::now()).await {
        Ok(run) => {
            if let Err(err) = state.pipeline.write_forecast_report(&run).await {
                warn!(run_id = %run.run_id, error = %err, "writing forecast report failed");
            }
            Json(run).into_response()
        }
        Err(err) => pipeline_error(err),
    }
}

async fn run_summary_handler(State(state): State<Arc<AppState>>, AxumPath(run_id): AxumPath<String>) -> Response {
    let Some(root) = state.pipeline.reports_dir() else {
        return not_found("reports are disabled".to_string());
    };
    if !is_run_id(&run_id) {
        return error_response(StatusCode::BAD_REQUEST, format!("invalid run id `{run_id}`"));
    }
    match load_run_summary(root, &run_id).await {
        Ok(Some(summary)) => Json(summary).into_response(),
        Ok(None) => not_found(format!("no run {run_id}")),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")),
    }
}

fn is_run_id(run_id: &str) -> bool {
    run_id.len() == 36 && run_id.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

async fn load_run_summary(root: &Path, run_id: &str) -> anyhow::Result<Option<JsonValue>> {
    let path = root.join(run_id).join(skillcast_sync::report::RUN_SUMMARY);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn series_key(state: &AppState, tag: String, region: &str, granularity: Option<&str>) -> Result<SeriesKey, Response> {
    let granularity = match granularity {
        Some(g) => g
            .parse::<Granularity>()
            .map_err(|err| error_response(StatusCode::BAD_REQUEST, err))?,
        None => state.pipeline.config().granularity,
    };
    Ok(SeriesKey::new(tag, RegionCode::new(region), granularity))
}

fn pipeline_error(err: PipelineError) -> Response {
    let status = match &err {
        PipelineError::MalformedInput { .. } | PipelineError::EmptyBatch => StatusCode::BAD_REQUEST,
        PipelineError::InsufficientHistory { .. } => StatusCode::NOT_FOUND,
        PipelineError::StoreWriteFailure(_) | PipelineError::WorkerInterrupted(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = serde_json::json!({
        "error": err.to_string(),
        "retryable": err.is_retryable(),
    });
    (status, Json(body)).into_response()
}

fn not_found(message: String) -> Response {
    error_response(StatusCode::NOT_FOUND, message)
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(serde_json::json!({ "error": message.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use skillcast_adapters::{StaticVocabularyProvider, TableRegionLookup};
    use skillcast_core::PipelineConfig;
    use skillcast_storage::{MemoryForecastStore, MemorySeriesStore};
    use tower::ServiceExt;

    fn test_app(reports: Option<&Path>) -> Router {
        let mut pipeline = SyncPipeline::new(
            PipelineConfig::default(),
            Arc::new(StaticVocabularyProvider::builtin()),
            Arc::new(TableRegionLookup::new()),
            Arc::new(MemorySeriesStore::new()),
            Arc::new(MemoryForecastStore::new()),
        );
        if let Some(dir) = reports {
            pipeline = pipeline.with_reports_dir(dir);
        }
        app(AppState::new(Arc::new(pipeline)))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn postings() -> JsonValue {
        serde_json::json!({
            "source_id": "board",
            "as_of": "2026-03-13T12:00:00Z",
            "postings": [
                {"job_id": "1", "job_title": "Data Engineer", "job_description": "Python and Kafka pipelines.", "job_location": "Seattle, WA", "date_posted": "2026-03-10"},
                {"id": "2", "title": "Data Engineer", "description": "Python and Kafka pipelines.", "location": "Seattle, WA", "posted_at": "2026-03-11"},
                {"id": "3", "title": "Data Engineer", "location": "Seattle, WA", "posted_at": "2026-03-11"}
            ]
        })
    }

    #[tokio::test]
    async fn handler_smoke_health() {
        let (status, body) = send(&test_app(None), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn aggregate_then_query_series() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Some(dir.path()));
        let (status, batch) = send(&app, "POST", "/runs/aggregate", Some(postings())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(batch["metrics"]["received"], 3);
        assert_eq!(batch["metrics"]["malformed"], 1);
        assert_eq!(batch["metrics"]["clusters"], 1);

        let (status, series) = send(&app, "GET", "/series/Python/US-WA", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(series["points"][0]["count"], 1);

        let run_id = batch["run_id"].as_str().unwrap();
        let (status, summary) = send(&app, "GET", &format!("/runs/{run_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["kind"], "aggregate");

        let (status, _) = send(&app, "GET", "/series/Python/US-WA?granularity=fortnight", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "GET", "/series/Cobol/US-WA", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let app = test_app(None);
        let (status, body) = send(&app, "POST", "/runs/aggregate", Some(serde_json::json!({"postings": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn forecast_trigger_reports_short_series() {
        let app = test_app(None);
        send(&app, "POST", "/runs/aggregate", Some(postings())).await;
        let (status, _) = send(&app, "GET", "/forecasts/Python/US-WA", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, run) = send(&app, "POST", "/runs/forecast", Some(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["forecasted"].as_array().unwrap().len(), 0);
        assert!(!run["insufficient_history"].as_array().unwrap().is_empty());

        let (status, run) = send(
            &app,
            "POST",
            "/runs/forecast",
            Some(serde_json::json!({"keys": [{"tag": "Rust", "region": "US-WA"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["missing_series"][0]["tag"], "Rust");
    }

    #[tokio::test]
    async fn recommendations_are_json() {
        let app = test_app(None);
        let (status, rec) = send(
            &app,
            "POST",
            "/recommendations",
            Some(serde_json::json!({"skills": ["Python"], "region": "us-wa"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rec["region"], "US-WA");
        assert!(rec["items"].as_array().unwrap().is_empty());
    }
}
