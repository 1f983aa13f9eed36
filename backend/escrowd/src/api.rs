//! Axum REST API handlers.
//!
//! Mutations go through the [`Sequencer`]; journal reads go straight to the
//! pool. The caller's identity is taken from the `x-principal` header, which
//! an authenticating proxy in front of this service is expected to set.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use blockfund_escrow::{Amount, PhaseId, Principal, ProjectId, ProjectStatus};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db;
use crate::errors::{Result, ServiceError};
use crate::events::EventRecord;
use crate::sequencer::Sequencer;

pub const PRINCIPAL_HEADER: &str = "x-principal";

#[derive(Clone)]
pub struct ApiState {
    pub sequencer: Arc<Sequencer>,
    pub pool: SqlitePool,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", get(get_all_events))
        .route("/projects", post(launch_project))
        .route("/projects/count", get(project_count))
        .route("/projects/:id", get(get_project).delete(remove_project))
        .route("/projects/:id/back", post(back_project))
        .route("/projects/:id/refund", post(withdraw_refund))
        .route("/projects/:id/withdraw", post(withdraw_project))
        .route("/projects/:id/settle", post(settle_project))
        .route("/projects/:id/archive", post(archive_project))
        .route("/projects/:id/escrow", get(get_escrow))
        .route("/projects/:id/events", get(get_project_events))
        .route("/projects/:id/contributions/:backer", get(get_contribution))
        .route("/projects/:id/phases", post(propose_phase))
        .route("/projects/:id/phases/:phase", get(get_phase))
        .route("/projects/:id/phases/:phase/votes", post(cast_vote))
        .route("/projects/:id/phases/:phase/release", post(release_payment))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn caller(headers: &HeaderMap) -> Result<Principal> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Principal::from)
        .ok_or(ServiceError::MissingPrincipal)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LaunchRequest {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    pub goal: Amount,
    pub duration_secs: u64,
}

#[derive(Deserialize)]
pub struct BackRequest {
    pub amount: Amount,
}

#[derive(Deserialize)]
pub struct ProposeRequest {
    pub note: String,
    pub goal: Amount,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub support: bool,
}

#[derive(Serialize)]
pub struct LaunchResponse {
    pub id: ProjectId,
}

#[derive(Serialize)]
pub struct BackResponse {
    pub project_id: ProjectId,
    /// The backer's running total in this project.
    pub total: Amount,
}

#[derive(Serialize)]
pub struct ProposeResponse {
    pub project_id: ProjectId,
    pub phase_id: PhaseId,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub project_id: ProjectId,
    pub amount: Amount,
}

#[derive(Serialize)]
pub struct SettleResponse {
    pub project_id: ProjectId,
    pub status: ProjectStatus,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub project_id: ProjectId,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Serialize)]
pub struct AllEventsResponse {
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /projects`
pub async fn launch_project(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<LaunchRequest>,
) -> Result<impl IntoResponse> {
    let initiator = caller(&headers)?;
    let id = state
        .sequencer
        .apply(|e| e.launch_project(&initiator, &req.name, &req.summary, req.goal, req.duration_secs))
        .await?;
    Ok((StatusCode::CREATED, Json(LaunchResponse { id })))
}

/// `GET /projects/count`
pub async fn project_count(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let count = state.sequencer.read(|e| e.get_project_count()).await;
    Json(CountResponse { count })
}

/// `GET /projects/:id`
pub async fn get_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
) -> Result<impl IntoResponse> {
    let project = state.sequencer.read(|e| e.fetch_project(id)).await?;
    Ok(Json(project))
}

/// `POST /projects/:id/back`
pub async fn back_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
    Json(req): Json<BackRequest>,
) -> Result<impl IntoResponse> {
    let backer = caller(&headers)?;
    let total = state
        .sequencer
        .apply(|e| e.back_project(id, &backer, req.amount))
        .await?;
    Ok(Json(BackResponse {
        project_id: id,
        total,
    }))
}

/// `POST /projects/:id/refund`
pub async fn withdraw_refund(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let backer = caller(&headers)?;
    let amount = state
        .sequencer
        .apply(|e| e.withdraw_refund(id, &backer))
        .await?;
    Ok(Json(PaymentResponse {
        project_id: id,
        amount,
    }))
}

/// `POST /projects/:id/withdraw`
///
/// Initiator cancels the project; backers can then claim refunds.
pub async fn withdraw_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let initiator = caller(&headers)?;
    let project = state
        .sequencer
        .apply(|e| {
            e.withdraw_project(id, &initiator)?;
            e.fetch_project(id)
        })
        .await?;
    Ok(Json(project))
}

/// `POST /projects/:id/settle`
pub async fn settle_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
) -> Result<impl IntoResponse> {
    let status = state.sequencer.apply(|e| e.settle(id)).await?;
    Ok(Json(SettleResponse {
        project_id: id,
        status,
    }))
}

/// `POST /projects/:id/archive`
pub async fn archive_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let initiator = caller(&headers)?;
    let project = state
        .sequencer
        .apply(|e| {
            e.archive(id, &initiator)?;
            e.fetch_project(id)
        })
        .await?;
    Ok(Json(project))
}

/// `DELETE /projects/:id`
pub async fn remove_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let initiator = caller(&headers)?;
    let project = state
        .sequencer
        .apply(|e| {
            e.remove(id, &initiator)?;
            e.fetch_project(id)
        })
        .await?;
    Ok(Json(project))
}

/// `GET /projects/:id/escrow`
pub async fn get_escrow(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
) -> Result<impl IntoResponse> {
    let summary = state.sequencer.read(|e| e.escrow_summary(id)).await?;
    Ok(Json(summary))
}

/// `GET /projects/:id/contributions/:backer`
pub async fn get_contribution(
    State(state): State<Arc<ApiState>>,
    Path((id, backer)): Path<(ProjectId, String)>,
) -> Result<impl IntoResponse> {
    let backer = Principal::new(backer);
    let contribution = state
        .sequencer
        .read(|e| e.fetch_contribution(id, &backer))
        .await?;
    Ok(Json(contribution))
}

/// `POST /projects/:id/phases`
pub async fn propose_phase(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
    Json(req): Json<ProposeRequest>,
) -> Result<impl IntoResponse> {
    let initiator = caller(&headers)?;
    let phase_id = state
        .sequencer
        .apply(|e| e.propose_phase(id, &initiator, &req.note, req.goal))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProposeResponse {
            project_id: id,
            phase_id,
        }),
    ))
}

/// `GET /projects/:id/phases/:phase`
pub async fn get_phase(
    State(state): State<Arc<ApiState>>,
    Path((id, phase)): Path<(ProjectId, PhaseId)>,
) -> Result<impl IntoResponse> {
    let phase = state.sequencer.read(|e| e.fetch_phase(id, phase)).await?;
    Ok(Json(phase))
}

/// `POST /projects/:id/phases/:phase/votes`
///
/// Returns the phase as it stands after the vote.
pub async fn cast_vote(
    State(state): State<Arc<ApiState>>,
    Path((id, phase)): Path<(ProjectId, PhaseId)>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse> {
    let voter = caller(&headers)?;
    let phase = state
        .sequencer
        .apply(|e| e.cast_vote(id, phase, &voter, req.support))
        .await?;
    Ok(Json(phase))
}

/// `POST /projects/:id/phases/:phase/release`
pub async fn release_payment(
    State(state): State<Arc<ApiState>>,
    Path((id, phase)): Path<(ProjectId, PhaseId)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let initiator = caller(&headers)?;
    let amount = state
        .sequencer
        .apply(|e| e.release_payment(id, phase, &initiator))
        .await?;
    Ok(Json(PaymentResponse {
        project_id: id,
        amount,
    }))
}

/// `GET /projects/:id/events`
///
/// Journaled events for the project, including those from earlier runs.
pub async fn get_project_events(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<ProjectId>,
) -> Result<impl IntoResponse> {
    let key = i64::try_from(project_id).unwrap_or(i64::MAX);
    let events = db::get_events_for_project(&state.pool, key).await?;
    Ok(Json(EventsResponse {
        project_id,
        count: events.len(),
        events,
    }))
}

/// `GET /events`
pub async fn get_all_events(State(state): State<Arc<ApiState>>) -> Result<impl IntoResponse> {
    let events = db::get_all_events(&state.pool).await?;
    Ok(Json(AllEventsResponse {
        count: events.len(),
        events,
    }))
}
