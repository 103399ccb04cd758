use axum::{extract::State, Extension, Json};
use crosspost_scheduler::PendingDelivery;

use crate::middleware::RequestId;

use super::{ApiResponse, AppState};

pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<PendingDelivery>>> {
    let jobs = state.scheduler.pending_jobs().await;
    Json(ApiResponse::new(jobs, req_id.0))
}
