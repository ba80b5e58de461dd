//! HTTP surface over [`ToxicityService`].
//!
//! Failures are returned as `{"kind": ..., "reason": ...}` with a status
//! derived from the error kind, never a bare 500. Dropping a request (client
//! gone) drops the handler future, which cancels its classifier calls.

use std::sync::Arc;

use serde::Deserialize;
use shuttle_axum::axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::chart::render_site_chart;
use crate::error::PipelineError;
use crate::service::{HealthStatus, Prediction, StatsQuery, ToxicityService};
use crate::stats::{PeriodBucket, PeriodStat, SiteStat};

pub type AppState = Arc<ToxicityService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/stats", get(stats))
        .route("/stats/most-toxic", get(most_toxic))
        .route("/stats/periods", get(periods))
        .route("/stats/plot", get(plot))
        .layer(CorsLayer::very_permissive())
        .with_state(service)
}

/// Error body shown to clients.
#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    kind: &'static str,
    reason: String,
}

pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

pub fn status_for(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::Configuration(_) => StatusCode::BAD_REQUEST,
        PipelineError::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        PipelineError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// Malformed bodies and query strings are parameter errors like any other.
impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self(PipelineError::config(r.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        Self(PipelineError::config(r.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            kind: self.0.kind(),
            reason: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct PredictReq {
    text: String,
}

async fn health(State(svc): State<AppState>) -> Json<HealthStatus> {
    Json(svc.health().await)
}

async fn predict(
    State(svc): State<AppState>,
    body: Result<Json<PredictReq>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(body) = body?;
    Ok(Json(svc.predict(&body.text).await?))
}

async fn stats(
    State(svc): State<AppState>,
    q: Result<Query<StatsQuery>, QueryRejection>,
) -> Result<Json<Vec<SiteStat>>, ApiError> {
    let Query(q) = q?;
    Ok(Json(svc.get_stats(&q).await?))
}

async fn most_toxic(
    State(svc): State<AppState>,
    q: Result<Query<StatsQuery>, QueryRejection>,
) -> Result<Json<Option<SiteStat>>, ApiError> {
    let Query(q) = q?;
    Ok(Json(svc.most_toxic_site(&q).await?))
}

#[derive(Deserialize)]
struct PeriodsQuery {
    #[serde(default)]
    bucket: PeriodBucket,
    site: Option<String>,
}

async fn periods(
    State(svc): State<AppState>,
    q: Result<Query<PeriodsQuery>, QueryRejection>,
) -> Result<Json<Vec<PeriodStat>>, ApiError> {
    let Query(q) = q?;
    Ok(Json(svc.period_stats(q.bucket, q.site.as_deref()).await?))
}

/// Stacked toxic-share bars per site as SVG. Takes the same filters as `/stats`.
async fn plot(
    State(svc): State<AppState>,
    q: Result<Query<StatsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = q?;
    let stats = svc.get_stats(&q).await?;
    if stats.is_empty() {
        return Err(PipelineError::InsufficientData("no statistics available".into()).into());
    }
    let svg = render_site_chart(&stats)?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}
