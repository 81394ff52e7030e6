//! API route definitions.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::state::AppState;
use super::ApiError;
use crate::pipeline::{ApprovalDecision, StepOutcome};
use crate::plan::PlanItem;
use crate::session::DEFAULT_SESSION_NAME;

const DEFAULT_LIMIT: usize = 50;

type ApiResult = Result<Json<Value>, ApiError>;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/incidents", get(list_incidents))
        .route("/incidents/{trace_id}", get(get_incident))
        .route("/events", get(list_events))
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/finish", post(finish_session))
        .route("/cycle", post(run_cycle))
        .route("/step", post(start_step))
        .route("/approvals", get(list_pending))
        .route("/approvals/{trace_id}/approve", post(approve))
        .route("/approvals/{trace_id}/reject", post(reject))
        .route("/schedule/dry-run", get(schedule_dry_run))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

/// Empty bodies decode to `T::default()`.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn list_incidents(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> ApiResult {
    let incidents = state
        .supervisor
        .orchestrator()
        .incidents()
        .list_recent(q.limit.unwrap_or(DEFAULT_LIMIT))?;
    let total = incidents.len();
    Ok(Json(json!({ "data": incidents, "meta": { "total": total } })))
}

async fn get_incident(State(state): State<AppState>, Path(trace_id): Path<String>) -> ApiResult {
    let incident = state
        .supervisor
        .orchestrator()
        .incidents()
        .find(&trace_id)?
        .ok_or_else(|| ApiError::NotFound(format!("incident not found: {}", trace_id)))?;
    Ok(Json(json!({ "data": incident, "meta": meta() })))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    limit: Option<usize>,
}

async fn list_events(State(state): State<AppState>, Query(q): Query<EventsQuery>) -> ApiResult {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT);
    let events = match q.kind.as_deref() {
        Some(kind) => {
            let mut all = state.events.find_by_type(kind)?;
            let skip = all.len().saturating_sub(limit);
            all.split_off(skip)
        }
        None => state.events.query_recent(limit)?,
    };
    let total = events.len();
    Ok(Json(json!({ "data": events, "meta": { "total": total } })))
}

async fn list_sessions(State(state): State<AppState>) -> ApiResult {
    let sessions = state.supervisor.sessions().list()?;
    let total = sessions.len();
    Ok(Json(json!({ "data": sessions, "meta": { "total": total } })))
}

#[derive(Debug, Default, Deserialize)]
struct CreateSession {
    name: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

async fn create_session(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: CreateSession = parse_body(&body)?;
    let name = req.name.as_deref().unwrap_or(DEFAULT_SESSION_NAME);
    let session = state.supervisor.sessions().create(name, req.metadata)?;
    Ok(Json(json!({ "data": session, "meta": meta() })))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let session = state.supervisor.sessions().get(&id)?;
    Ok(Json(json!({ "data": session, "meta": meta() })))
}

async fn pause_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let session = state.supervisor.sessions().pause(&id)?;
    Ok(Json(json!({ "data": session, "meta": meta() })))
}

async fn resume_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let session = state.supervisor.sessions().resume(&id)?;
    Ok(Json(json!({ "data": session, "meta": meta() })))
}

async fn finish_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let session = state.supervisor.sessions().finish(&id)?;
    Ok(Json(json!({ "data": session, "meta": meta() })))
}

#[derive(Debug, Default, Deserialize)]
struct CycleRequest {
    session_id: Option<String>,
}

async fn run_cycle(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: CycleRequest = parse_body(&body)?;
    let outcome = state.supervisor.run_cycle(req.session_id.as_deref()).await?;
    Ok(Json(json!({ "data": outcome, "meta": meta() })))
}

async fn start_step(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: CycleRequest = parse_body(&body)?;
    let outcome = state.supervisor.start_step(req.session_id.as_deref()).await?;
    if let StepOutcome::Suspended { checkpoint, .. } = &outcome {
        state
            .pending
            .lock()
            .await
            .insert(checkpoint.trace_id.clone(), (**checkpoint).clone());
    }
    Ok(Json(json!({ "data": outcome, "meta": meta() })))
}

async fn list_pending(State(state): State<AppState>) -> ApiResult {
    let pending = state.pending.lock().await;
    let items: Vec<Value> = pending
        .values()
        .map(|cp| {
            json!({
                "trace_id": cp.trace_id,
                "session_id": cp.session_id,
                "awaiting_since": cp.awaiting_since,
                "reasons": cp.reasons,
                "plan": cp.plan,
            })
        })
        .collect();
    let total = items.len();
    Ok(Json(json!({ "data": items, "meta": { "total": total } })))
}

#[derive(Debug, Default, Deserialize)]
struct ApproveRequest {
    plan: Option<Vec<PlanItem>>,
}

#[derive(Debug, Default, Deserialize)]
struct RejectRequest {
    reason: Option<String>,
}

async fn approve(State(state): State<AppState>, Path(trace_id): Path<String>, body: Bytes) -> ApiResult {
    let req: ApproveRequest = parse_body(&body)?;
    decide(&state, &trace_id, ApprovalDecision::Approve { plan: req.plan }).await
}

async fn reject(State(state): State<AppState>, Path(trace_id): Path<String>, body: Bytes) -> ApiResult {
    let req: RejectRequest = parse_body(&body)?;
    let reason = req.reason.unwrap_or_else(|| "rejected by reviewer".to_string());
    decide(&state, &trace_id, ApprovalDecision::Reject { reason }).await
}

async fn decide(state: &AppState, trace_id: &str, decision: ApprovalDecision) -> ApiResult {
    let checkpoint = state
        .pending
        .lock()
        .await
        .remove(trace_id)
        .ok_or_else(|| ApiError::NotFound(format!("no pending approval for {}", trace_id)))?;

    match state.supervisor.resume(checkpoint.clone(), decision).await {
        Ok(incident) => Ok(Json(json!({ "data": incident, "meta": meta() }))),
        Err(e) => {
            // keep it decidable after a storage failure
            state.pending.lock().await.insert(trace_id.to_string(), checkpoint);
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct DryRunQuery {
    hours: Option<u64>,
}

async fn schedule_dry_run(State(state): State<AppState>, Query(q): Query<DryRunQuery>) -> Json<Value> {
    let hours = q.hours.unwrap_or(24);
    let data = match &state.schedule {
        Some(schedule) => json!({
            "enabled": true,
            "cron": schedule.expr(),
            "upcoming": schedule.preview(chrono::Utc::now(), hours),
        }),
        None => json!({ "enabled": false, "upcoming": [] }),
    };
    Json(json!({ "data": data, "meta": meta() }))
}
