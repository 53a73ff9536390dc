//! Agent sessions: create, query, history and delete.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::AppState;
use crate::conversation::{first_user_question, mobile_response};
use crate::engine::EngineError;
use crate::error::{ApiError, TaggedError, require_fields};
use crate::reducer::{QueryMode, reduce_stream};
use crate::session::{SessionError, SessionScope, default_initial_state};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-session", post(create_session))
        .route("/query-agent", post(query_agent))
        .route("/get-session/{session_id}", get(get_session))
        .route("/sessions/{session_id}", delete(delete_session))
}

fn session_error(context: &str, err: SessionError) -> ApiError {
    match err {
        SessionError::MissingCredentials | SessionError::Auth(_) => {
            ApiError::unavailable(err.to_string())
        }
        other => ApiError::upstream(context, other),
    }
}

fn engine_error(err: EngineError) -> ApiError {
    match err {
        EngineError::MissingCredentials | EngineError::Auth(_) => {
            ApiError::unavailable(err.to_string())
        }
        other => ApiError::upstream("Failed to query agent", other),
    }
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match body {
        Ok(Json(value)) if value.is_object() => Ok(value),
        Ok(_) => Err(ApiError::bad_request("Invalid JSON payload")),
        Err(e) => Err(ApiError::bad_request(e.body_text())),
    }
}

/// Scope of the configured agent application, used by history lookups.
fn configured_scope(state: &AppState) -> Result<SessionScope, ApiError> {
    let google = &state.config.google;
    match (
        google.project_id.as_deref(),
        google.location.as_deref(),
        google.reasoning_engine_app_name.as_deref(),
    ) {
        (Some(project), Some(location), Some(app)) => Ok(SessionScope::new(project, location, app)),
        _ => Err(ApiError::unavailable(
            "GOOGLE_CLOUD_PROJECT_ID, GOOGLE_CLOUD_LOCATION and REASONING_ENGINE_APP_NAME must be configured",
        )),
    }
}

async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TaggedError> {
    let failed = |e: ApiError| e.tagged("false");
    let body = json_body(body).map_err(failed)?;

    let user_id = body["user_id"].as_str();
    let project = body["google_project_id"].as_str();
    let location = body["google_project_location"].as_str();
    let app_name = body["reasoning_engine_app_name"].as_str();
    require_fields(&[
        ("user_id", user_id),
        ("google_project_id", project),
        ("google_project_location", location),
        ("reasoning_engine_app_name", app_name),
    ])
    .map_err(failed)?;

    let initial_state: Map<String, Value> = match &body["state"] {
        Value::Null => default_initial_state(),
        Value::Object(map) => map.clone(),
        _ => return Err(failed(ApiError::bad_request("'state' must be a JSON object"))),
    };

    let scope = SessionScope::new(
        project.unwrap_or_default(),
        location.unwrap_or_default(),
        app_name.unwrap_or_default(),
    );
    let user_id = user_id.unwrap_or_default();
    tracing::info!(
        user_id,
        app_name = %scope.app_name,
        project = %scope.project_id,
        location = %scope.location,
        "Creating session"
    );

    let session = state
        .sessions
        .create_session(&scope, user_id, initial_state)
        .await
        .map_err(|e| failed(session_error("Failed to create session", e)))?;

    if session.id.is_empty() {
        return Err(failed(ApiError::upstream(
            "Failed to create session",
            "no session ID returned",
        )));
    }
    Ok(Json(json!({ "status": "true", "session_id": session.id })))
}

async fn query_agent(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TaggedError> {
    let failed = |e: ApiError| e.tagged("false");
    let body = json_body(body).map_err(failed)?;

    let user_id = body["user_id"].as_str();
    let session_id = body["session_id"].as_str();
    let query = body["query"].as_str();
    let engine_url = body["reasoning_engine_app_url"].as_str();
    require_fields(&[
        ("user_id", user_id),
        ("session_id", session_id),
        ("query", query),
        ("reasoning_engine_app_url", engine_url),
    ])
    .map_err(failed)?;
    let (user_id, session_id, query) = (
        user_id.unwrap_or_default(),
        session_id.unwrap_or_default(),
        query.unwrap_or_default(),
    );

    let mode = QueryMode::parse(body["type_of_api_call"].as_str());
    tracing::info!(user_id, session_id, ?mode, "Querying agent");

    let events = state
        .engine
        .stream_query(engine_url.unwrap_or_default(), user_id, session_id, query)
        .await
        .map_err(|e| failed(engine_error(e)))?;
    let outcome = reduce_stream(events, mode)
        .await
        .map_err(|e| failed(engine_error(e)))?;

    Ok(Json(json!({
        "status": "true",
        "user_id": user_id,
        "session_id": session_id,
        "query": query,
        "raw_parts": outcome.raw_parts,
        "is_places_response": outcome.is_places_response,
        "places_array": outcome.places_array,
        "is_itinery_reponse": outcome.is_itinerary_response,
        "ititernary_array": outcome.itinerary_array,
    })))
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

fn required_user(query: UserQuery) -> Result<String, ApiError> {
    query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required query parameter: 'user_id'"))
}

/// Conversation history for the mobile client. Opening a session records
/// it in the recent-activity index; index failures only log.
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = required_user(query)?;
    let scope = configured_scope(&state)?;

    let session = state
        .sessions
        .get_session(&scope, &user_id, &session_id)
        .await
        .map_err(|e| session_error("Failed to retrieve session", e))?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    match (&state.activities, first_user_question(&session.events)) {
        (Some(activities), Some(question)) => {
            match activities
                .record_first_question(&user_id, &session_id, &question)
                .await
            {
                Ok(outcome) => tracing::debug!(?outcome, session_id, "Recent activity updated"),
                Err(e) => tracing::warn!(error = %e, session_id, "Recent activity not stored"),
            }
        }
        _ => tracing::debug!(session_id, "Skipping recent activity"),
    }

    Ok(Json(mobile_response(&session)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = required_user(query)?;
    let scope = configured_scope(&state)?;

    let deleted = state
        .sessions
        .delete_session(&scope, &user_id, &session_id)
        .await
        .map_err(|e| session_error("Failed to delete session", e))?;
    if !deleted {
        return Err(ApiError::not_found("Session not found"));
    }
    Ok(Json(json!({
        "status": "success",
        "session_id": session_id,
        "deleted": true,
    })))
}
