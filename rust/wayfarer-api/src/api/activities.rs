//! Recent-activity listing and access-time updates.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::activity::{ActivityIndex, ActivityKey, StoreError};
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/get-recent-activities/{user_id}", get(recent_activities))
        .route("/activities/touch", post(touch_activities))
}

fn index(state: &AppState) -> Result<&Arc<ActivityIndex>, ApiError> {
    state
        .activities
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Recent activity store is not configured"))
}

fn store_error(context: &str, err: StoreError) -> ApiError {
    ApiError::upstream(context, err)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn recent_activities(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let index = index(&state)?;
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(state.config.activity.default_limit);

    let activities = index
        .list_recent(&user_id, limit)
        .await
        .map_err(|e| store_error("Failed to retrieve recent activities", e))?;
    tracing::debug!(user_id, count = activities.len(), "Listed recent activities");

    Ok(Json(json!({
        "status": "success",
        "user_id": user_id,
        "count": activities.len(),
        "activities": activities,
    })))
}

#[derive(Debug, Deserialize)]
struct TouchRequest {
    #[serde(default)]
    updates: Vec<ActivityKey>,
}

async fn touch_activities(
    State(state): State<AppState>,
    body: Result<Json<TouchRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let index = index(&state)?;
    if request.updates.is_empty() {
        return Err(ApiError::bad_request("No updates provided"));
    }

    let report = index
        .touch_many(&request.updates)
        .await
        .map_err(|e| store_error("Failed to update activity access times", e))?;

    Ok(Json(json!({
        "status": "success",
        "updated_count": report.updated_count,
        "errors": report.errors,
    })))
}
