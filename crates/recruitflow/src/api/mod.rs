//! Worker admin surface: liveness and outbox depth.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::outbox::{OutboxRepo, OutboxStats};

#[derive(Clone)]
pub struct ApiState {
    pub worker_id: String,
    pub outbox: OutboxRepo,
    pub stats_cache: TtlCache<&'static str, OutboxStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics/prom", get(metrics_prom))
        .route("/emails/:key", get(get_email))
        .with_state(state)
}

fn internal_err(e: anyhow::Error) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("internal error: {e}"),
    )
}

async fn cached_stats(state: &ApiState) -> anyhow::Result<OutboxStats> {
    let outbox = state.outbox.clone();
    state
        .stats_cache
        .get_or_refresh("outbox", || async move { outbox.stats().await })
        .await
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub worker_id: String,
    pub now_utc: DateTime<Utc>,
    #[serde(flatten)]
    pub outbox: OutboxStats,
}

pub async fn metrics(
    State(state): State<ApiState>,
) -> Result<Json<MetricsResponse>, (StatusCode, String)> {
    let outbox = cached_stats(&state).await.map_err(internal_err)?;
    Ok(Json(MetricsResponse {
        worker_id: state.worker_id.clone(),
        now_utc: Utc::now(),
        outbox,
    }))
}

pub async fn metrics_prom(State(state): State<ApiState>) -> Response {
    match cached_stats(&state).await {
        Ok(s) => {
            let body = format!(
                concat!(
                    "# HELP recruitflow_outbox_pending Pending outbox emails\n",
                    "# TYPE recruitflow_outbox_pending gauge\n",
                    "recruitflow_outbox_pending{{class=\"TRANSACTIONAL\"}} {}\n",
                    "recruitflow_outbox_pending{{class=\"ONBOARDING\"}} {}\n",
                    "# HELP recruitflow_outbox_processed_last_hour Emails processed in the last hour\n",
                    "# TYPE recruitflow_outbox_processed_last_hour gauge\n",
                    "recruitflow_outbox_processed_last_hour {}\n",
                    "# HELP recruitflow_outbox_oldest_pending_seconds Age of the oldest pending email\n",
                    "# TYPE recruitflow_outbox_oldest_pending_seconds gauge\n",
                    "recruitflow_outbox_oldest_pending_seconds {}\n"
                ),
                s.pending_transactional,
                s.pending_onboarding,
                s.processed_last_hour,
                s.oldest_pending_age_secs.unwrap_or(0),
            );
            (StatusCode::OK, body).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics error: {e}"),
        )
            .into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct EmailView {
    pub email_key: Uuid,
    pub email_class: String,
    pub email_state: String,
    pub email_to: Vec<String>,
    pub email_subject: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Delivery status of one outbox row. Bodies are not exposed.
pub async fn get_email(State(state): State<ApiState>, Path(key): Path<Uuid>) -> Response {
    match state.outbox.get(key).await {
        Ok(Some(e)) => (
            StatusCode::OK,
            Json(EmailView {
                email_key: e.email_key,
                email_class: e.email_class,
                email_state: e.email_state,
                email_to: e.email_to,
                email_subject: e.email_subject,
                created_at: e.created_at,
                processed_at: e.processed_at,
            }),
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("email {key} not found")).into_response(),
        Err(e) => internal_err(e).into_response(),
    }
}
