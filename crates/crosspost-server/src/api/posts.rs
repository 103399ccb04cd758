use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use crosspost_scheduler::WatchReport;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_scheduler_error, ApiError, ApiResponse, AppState};

const COLLISION_WARNING: &str = "time clash";

#[derive(Debug, Serialize)]
pub(super) struct ScheduleData {
    post_id: i64,
    run_at: DateTime<Utc>,
    /// Advisory only; the job is registered either way.
    warning: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub(super) struct UnscheduleData {
    post_id: i64,
    removed: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct CollisionData {
    post_id: i64,
    collision: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshData {
    post_id: i64,
    #[serde(flatten)]
    report: WatchReport,
}

pub(super) async fn schedule_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<ScheduleData>>, ApiError> {
    let run_at = state
        .scheduler
        .schedule(post_id)
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;

    let collision = match state.scheduler.has_collision(post_id).await {
        Ok(collision) => collision,
        Err(e) => {
            tracing::warn!(post_id, error = %e, "collision check failed; omitting warning");
            false
        }
    };

    Ok(Json(ApiResponse::new(
        ScheduleData {
            post_id,
            run_at,
            warning: collision.then_some(COLLISION_WARNING),
        },
        req_id.0,
    )))
}

pub(super) async fn unschedule_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<UnscheduleData>>, ApiError> {
    let removed = state
        .scheduler
        .unschedule(post_id)
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        UnscheduleData { post_id, removed },
        req_id.0,
    )))
}

pub(super) async fn post_collision(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<CollisionData>>, ApiError> {
    let collision = state
        .scheduler
        .has_collision(post_id)
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        CollisionData { post_id, collision },
        req_id.0,
    )))
}

pub(super) async fn refresh_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<RefreshData>>, ApiError> {
    let report = state
        .scheduler
        .refresh(post_id)
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(RefreshData { post_id, report }, req_id.0)))
}
