//! Axum server and routes.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use track_audit::{AuditError, AuditStore};
use track_move::{CachedList, CachedRecord, MoveError, StageMoveCoordinator};
use track_timeline::StageTimeline;
use track_types::{
    ActorProvider, AuditFilter, BaseResponse, CleanupRequest, CleanupResponse, CleanupResult,
    EntityType, ExportFormat, HistoryResponse, LogRequest, LogResponse, MoveRequest,
    MoveResponse, MoveResult, PersistenceFailure, SummaryResponse, TimelineResponse,
};

pub struct AppState {
    pub audit: Arc<AuditStore>,
    pub timeline: StageTimeline,
    pub coordinator: StageMoveCoordinator,
    pub actors: Arc<dyn ActorProvider>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/audit/log", post(handle_log))
        .route(
            "/audit/history/:entity_type/:entity_id",
            get(handle_history),
        )
        .route("/audit/search", get(handle_search))
        .route("/audit/summary", get(handle_summary))
        .route("/audit/export", get(handle_export))
        .route("/audit/cleanup", post(handle_cleanup))
        .route("/timeline/:entity_id", get(handle_timeline))
        .route("/pipeline/move", post(handle_move))
        .route("/cache/lists/:key", get(handle_get_list).put(handle_put_list))
        .route(
            "/cache/details/:entity_id",
            get(handle_get_detail).put(handle_put_detail),
        )
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_log(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogRequest>,
) -> Json<LogResponse> {
    let actor = req.actor.or_else(|| state.actors.current_actor());
    match state.audit.log(req.entry, actor.as_ref()) {
        Ok(entry) => {
            tracing::info!(
                entry_id = %entry.id,
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                action = %entry.action,
                "audit entry recorded"
            );
            Json(BaseResponse::ok(entry))
        }
        Err(e @ AuditError::Diff(_)) => Json(BaseResponse::error(400, e.to_string())),
        Err(e) => Json(BaseResponse::error(500, e.to_string())),
    }
}

async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Json<HistoryResponse> {
    let entries = state
        .audit
        .get_entity_history(&EntityType::new(entity_type), &entity_id);
    Json(BaseResponse::ok(entries))
}

async fn handle_search(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AuditFilter>,
) -> Json<HistoryResponse> {
    Json(BaseResponse::ok(state.audit.search(&filter)))
}

async fn handle_summary(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AuditFilter>,
) -> Json<SummaryResponse> {
    Json(BaseResponse::ok(state.audit.get_summary(&filter)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

async fn handle_export(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AuditFilter>,
    Query(q): Query<ExportQuery>,
) -> Response {
    match state.audit.export(&filter, q.format) {
        Ok(body) => {
            let (content_type, file) = match q.format {
                ExportFormat::Json => ("application/json", "audit-log.json"),
                ExportFormat::Csv => ("text/csv; charset=utf-8", "audit-log.csv"),
            };
            (
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => Json(BaseResponse::<()>::error(500, e.to_string())).into_response(),
    }
}

async fn handle_cleanup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CleanupRequest>,
) -> Json<CleanupResponse> {
    let removed = state.audit.cleanup(req.older_than);
    tracing::info!(removed, older_than = %req.older_than, "audit log cleanup");
    Json(BaseResponse::ok(CleanupResult { removed }))
}

async fn handle_timeline(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Json<TimelineResponse> {
    Json(BaseResponse::ok(state.timeline.reconstruct(&entity_id)))
}

async fn handle_move(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MoveRequest>,
) -> Json<MoveResponse> {
    if req.entity_id.trim().is_empty() || req.target_stage_id.trim().is_empty() {
        return Json(BaseResponse::error(
            400,
            "entity_id and target_stage_id are required",
        ));
    }
    match state
        .coordinator
        .move_to_stage(&req.entity_id, &req.target_stage_id)
        .await
    {
        Ok(outcome) => Json(BaseResponse::ok(MoveResult {
            entity_id: outcome.entity_id,
            from_stage_id: outcome.from_stage,
            to_stage_id: outcome.to_stage,
            phase: outcome.phase.as_str().to_string(),
            audit_entry_id: outcome.audit_entry.map(|e| e.id),
        })),
        Err(MoveError::Persistence(PersistenceFailure::Rejected { status, message })) => {
            Json(BaseResponse::error(i32::from(status), message))
        }
        Err(e @ MoveError::Persistence(_)) => Json(BaseResponse::error(502, e.to_string())),
        Err(e) => Json(BaseResponse::error(500, e.to_string())),
    }
}

async fn handle_put_list(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(rows): Json<Vec<Value>>,
) -> Json<BaseResponse<CachedList>> {
    let cache = state.coordinator.cache();
    cache.put_list(key.clone(), rows);
    match cache.list(&key) {
        Some(list) => Json(BaseResponse::ok(list)),
        None => Json(BaseResponse::error(500, "list not stored")),
    }
}

async fn handle_get_list(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<BaseResponse<CachedList>> {
    match state.coordinator.cache().list(&key) {
        Some(list) => Json(BaseResponse::ok(list)),
        None => Json(BaseResponse::error(404, format!("list not cached: {}", key))),
    }
}

async fn handle_put_detail(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(record): Json<Value>,
) -> Json<BaseResponse<CachedRecord>> {
    let cache = state.coordinator.cache();
    cache.put_detail(entity_id.clone(), record);
    match cache.detail(&entity_id) {
        Some(detail) => Json(BaseResponse::ok(detail)),
        None => Json(BaseResponse::error(500, "record not stored")),
    }
}

async fn handle_get_detail(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Json<BaseResponse<CachedRecord>> {
    match state.coordinator.cache().detail(&entity_id) {
        Some(detail) => Json(BaseResponse::ok(detail)),
        None => Json(BaseResponse::error(
            404,
            format!("record not cached: {}", entity_id),
        )),
    }
}

async fn handle_health() -> &'static str {
    "ok"
}
