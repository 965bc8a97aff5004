//! Administration and trigger HTTP surface.
//!
//! Every endpoint degrades gracefully when the job store is not configured:
//! reads come back empty or zero with a 200, health reports `disabled`, and
//! only a genuinely unknown queue name or job id earns a 404.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use estafette::core::job::{JobDetails, JobState, QueueCounts, QueueHealth, QueueName};
use estafette::core::queue::{Queue, QueueError};
use estafette::core::{Duration, Xid};
use estafette::dispatch::{Appointment, Dispatcher, Payment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct AppState<Q> {
    pub queue: Arc<Q>,
    pub dispatcher: Arc<Dispatcher<Q>>,
}

impl<Q> Clone for AppState<Q> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<Q> AppState<Q>
where
    Q: Queue,
{
    pub fn new(queue: Arc<Q>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(queue.clone()));
        Self { queue, dispatcher }
    }
}

/// Build the router with all routes.
pub fn router<Q>(state: AppState<Q>) -> Router
where
    Q: Queue + 'static,
{
    Router::new()
        .route("/api/queue/health", get(queue_health::<Q>))
        .route("/api/queue/stats", get(queue_stats::<Q>))
        .route("/api/queue/{queue_name}/jobs", get(list_jobs::<Q>))
        .route("/api/queue/{queue_name}/retry/{job_id}", post(retry_job::<Q>))
        .route("/api/queue/{queue_name}/clean", post(clean_queue::<Q>))
        .route(
            "/api/automation/appointment/created",
            post(appointment_created::<Q>),
        )
        .route(
            "/api/automation/appointment/cancelled",
            post(appointment_cancelled::<Q>),
        )
        .route(
            "/api/automation/payment/confirmed",
            post(payment_confirmed::<Q>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Operator-facing error envelope. Handler failures become a 500 with the
/// message; lookups that miss become 404s.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::JobNotFound(_) => ApiError::NotFound("Job not found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn parse_queue(name: &str) -> Result<QueueName, ApiError> {
    QueueName::from_str(name).map_err(|_| ApiError::NotFound("Queue not found".to_string()))
}

fn parse_job_id(id: &str) -> Result<Xid, ApiError> {
    Xid::from_str(id).map_err(|_| ApiError::NotFound("Job not found".to_string()))
}

async fn queue_health<Q>(State(state): State<AppState<Q>>) -> Json<serde_json::Value>
where
    Q: Queue,
{
    let health = state.queue.health().await;
    let body = match health {
        QueueHealth::Healthy => serde_json::json!({
            "status": "healthy",
            "store": "connected",
            "queues": QueueName::ALL.iter().map(|q| q.as_str()).collect::<Vec<_>>(),
        }),
        QueueHealth::Disabled => serde_json::json!({
            "status": "disabled",
            "store": "not configured",
            "message": "Job store is not configured",
        }),
        QueueHealth::Unhealthy(error) => serde_json::json!({
            "status": "unhealthy",
            "store": "disconnected",
            "error": error,
        }),
    };
    Json(body)
}

#[derive(Serialize)]
struct StatsEntry {
    waiting: u64,
    active: u64,
    completed: u64,
    failed: u64,
    delayed: u64,
    total: u64,
}

impl From<QueueCounts> for StatsEntry {
    fn from(counts: QueueCounts) -> Self {
        Self {
            waiting: counts.waiting,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
            delayed: counts.delayed,
            total: counts.total(),
        }
    }
}

async fn queue_stats<Q>(
    State(state): State<AppState<Q>>,
) -> Result<Json<BTreeMap<&'static str, StatsEntry>>, ApiError>
where
    Q: Queue,
{
    let mut stats = BTreeMap::new();
    for queue in QueueName::ALL {
        let counts = state.queue.counts(queue).await?;
        stats.insert(queue.as_str(), StatsEntry::from(counts));
    }
    Ok(Json(stats))
}

#[derive(Deserialize)]
struct ListParams {
    status: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobListResponse {
    queue: QueueName,
    status: JobState,
    count: usize,
    jobs: Vec<JobDetails>,
}

async fn list_jobs<Q>(
    State(state): State<AppState<Q>>,
    Path(queue_name): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<JobListResponse>, ApiError>
where
    Q: Queue,
{
    let queue = parse_queue(&queue_name)?;
    let status = match params.status.as_deref() {
        None => JobState::Waiting,
        Some(raw) => JobState::from_str(raw)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };
    let limit = params.limit.unwrap_or(50);

    let jobs = state.queue.list_jobs(queue, status, limit).await?;
    Ok(Json(JobListResponse {
        queue,
        status,
        count: jobs.len(),
        jobs,
    }))
}

async fn retry_job<Q>(
    State(state): State<AppState<Q>>,
    Path((queue_name, job_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    Q: Queue,
{
    let queue = parse_queue(&queue_name)?;
    let jid = parse_job_id(&job_id)?;
    state.queue.retry_job(queue, jid).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Job retried successfully",
        "jobId": job_id,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CleanRequest {
    status: JobState,
    grace_secs: i64,
}

impl Default for CleanRequest {
    fn default() -> Self {
        Self {
            status: JobState::Completed,
            grace_secs: 0,
        }
    }
}

async fn clean_queue<Q>(
    State(state): State<AppState<Q>>,
    Path(queue_name): Path<String>,
    body: Option<Json<CleanRequest>>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    Q: Queue,
{
    let queue = parse_queue(&queue_name)?;
    let Json(request) = body.unwrap_or_default();
    let removed = state
        .queue
        .purge(queue, request.status, Duration::seconds(request.grace_secs))
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "queue": queue.as_str(),
        "removed": removed,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentCreatedRequest {
    id: i64,
    patient_id: i64,
    company_id: i64,
    start_time: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentCreatedResponse {
    success: bool,
    confirmation_job_id: Option<String>,
    reminder_24h_job_id: Option<String>,
    reminder_1h_job_id: Option<String>,
}

async fn appointment_created<Q>(
    State(state): State<AppState<Q>>,
    Json(request): Json<AppointmentCreatedRequest>,
) -> Result<Json<AppointmentCreatedResponse>, ApiError>
where
    Q: Queue,
{
    let automations = state
        .dispatcher
        .appointment_created(&Appointment {
            id: request.id,
            patient_id: request.patient_id,
            company_id: request.company_id,
            start_time: request.start_time,
        })
        .await?;
    Ok(Json(AppointmentCreatedResponse {
        success: true,
        confirmation_job_id: automations.confirmation.map(|jid| jid.to_string()),
        reminder_24h_job_id: automations.reminder_day_before.map(|jid| jid.to_string()),
        reminder_1h_job_id: automations.reminder_hour_before.map(|jid| jid.to_string()),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentCancelledRequest {
    id: i64,
}

async fn appointment_cancelled<Q>(
    State(state): State<AppState<Q>>,
    Json(request): Json<AppointmentCancelledRequest>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    Q: Queue,
{
    state.dispatcher.appointment_cancelled(request.id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentConfirmedRequest {
    id: i64,
    patient_id: i64,
    company_id: i64,
    #[serde(default)]
    amount_cents: i64,
}

async fn payment_confirmed<Q>(
    State(state): State<AppState<Q>>,
    Json(request): Json<PaymentConfirmedRequest>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    Q: Queue,
{
    let jid = state
        .dispatcher
        .payment_confirmed(&Payment {
            id: request.id,
            patient_id: request.patient_id,
            company_id: request.company_id,
            amount_cents: request.amount_cents,
        })
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "jobId": jid.map(|jid| jid.to_string()),
    })))
}
