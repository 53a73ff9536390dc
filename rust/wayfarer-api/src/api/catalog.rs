//! Read-only agent catalog and the tool webhook used by the hosted runtime.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(invoke_tool))
}

async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    let root = state.agents.root().map(|a| a.name.clone());
    Json(json!({
        "root": root,
        "agents": state.agents.agents(),
    }))
}

async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tools": state.tools.get_definitions() }))
}

/// Tool failures come back inside the result, so the model can read them.
/// An empty body means no arguments.
async fn invoke_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let arguments: Value = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON arguments: {e}")))?
    };
    if !arguments.is_object() {
        return Err(ApiError::bad_request("Tool arguments must be a JSON object"));
    }

    let result = state
        .tools
        .invoke(&name, &arguments)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Unknown tool: {name}")))?;
    Ok(Json(result))
}
