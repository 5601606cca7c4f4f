use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::query::{EngineFactory, EngineResponse, SourceNode};
use crate::variant::{ChunkStrategy, EmbedModel, Variant};

const SOURCE_PREVIEW_CHARS: usize = 500;

const MOCK_ANSWER: &str = "[mock] The maximum contaminant level for bromate is 0.010 mg/L.";
const MOCK_SOURCE: &str = "[mock] 40 CFR 141.64 — MCLs for disinfection byproducts.";

pub struct AppState {
    pub config: Arc<Config>,
    /// Absent in mock mode.
    pub engines: Option<Arc<dyn EngineFactory>>,
    pub metrics: Arc<Metrics>,
    pub started_at: chrono::DateTime<Utc>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/strategies", get(strategies))
        .route("/models", get(models))
        .route("/metrics", get(metrics))
        .route("/query", post(query))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: i64,
    mock_mode: bool,
    llm_model: String,
    default_top_k: usize,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
        mock_mode: state.config.mock_mode,
        llm_model: state.config.llm_model.clone(),
        default_top_k: state.config.default_top_k,
    })
}

async fn strategies() -> Json<Vec<&'static str>> {
    Json(ChunkStrategy::ALL.iter().map(|s| s.as_str()).collect())
}

async fn models() -> Json<Vec<&'static str>> {
    Json(EmbedModel::ALL.iter().map(|m| m.as_str()).collect())
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let body = state.metrics.render_prometheus();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

#[derive(Deserialize)]
struct QueryPayload {
    question: String,
    #[serde(default = "default_strategy")]
    strategy: String,
    #[serde(default = "default_model")]
    model: String,
    /// Falls back to the configured default.
    top_k: Option<usize>,
}

fn default_strategy() -> String {
    ChunkStrategy::Fixed.as_str().to_string()
}

fn default_model() -> String {
    EmbedModel::Voyage3Large.as_str().to_string()
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<EngineResponse>, (StatusCode, String)> {
    if state.config.mock_mode {
        state.metrics.record_mock();
        return Ok(Json(mock_response()));
    }

    let strategy: ChunkStrategy = payload
        .strategy
        .parse()
        .map_err(|e: crate::error::Error| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let model: EmbedModel = payload
        .model
        .parse()
        .map_err(|e: crate::error::Error| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let top_k = payload.top_k.unwrap_or(state.config.default_top_k);
    if top_k == 0 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "top_k must be at least 1".to_string(),
        ));
    }

    let engines = state.engines.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "query engines are not configured".to_string(),
        )
    })?;

    let variant = Variant::new(strategy, model);
    state.metrics.start_query();
    let start = Instant::now();

    let result = async {
        let engine = engines.engine(variant, top_k).await?;
        engine.query(&payload.question).await
    }
    .await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    state.metrics.finish_query(variant, result.is_ok(), elapsed_ms);

    match result {
        Ok(mut response) => {
            for source in &mut response.sources {
                if source.text.chars().count() > SOURCE_PREVIEW_CHARS {
                    source.text = source.text.chars().take(SOURCE_PREVIEW_CHARS).collect();
                }
            }
            info!(
                variant = %variant,
                top_k,
                sources = response.sources.len(),
                elapsed_ms,
                "Query answered"
            );
            Ok(Json(response))
        }
        Err(e) => {
            error!(variant = %variant, error = %e, "Query failed");
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

fn mock_response() -> EngineResponse {
    EngineResponse {
        answer: MOCK_ANSWER.to_string(),
        sources: vec![SourceNode {
            text: MOCK_SOURCE.to_string(),
            score: Some(0.95),
        }],
    }
}
