//! Health check and service index.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use serde_json::{Value, json};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(index))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    sessions: &'static str,
    activities: Option<&'static str>,
    users: Option<&'static str>,
}

/// Liveness plus the backends this instance was wired with.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "Wayfarer API",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.sessions.backend_name(),
        activities: state.activities.as_ref().map(|a| a.backend_name()),
        users: state.users.as_ref().map(|u| u.backend_name()),
    })
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Wayfarer API",
        "description": "Trip planning agents, conversation history, geo, weather, traffic and crop analysis",
        "endpoints": {
            "POST /create-session": "Create an agent session",
            "POST /query-agent": "Send a message to the trip planning agent",
            "GET /get-session/{session_id}?user_id=": "Conversation history",
            "GET /get-recent-activities/{user_id}": "Recently opened sessions",
            "POST /create-update-user": "Create or update a user profile",
            "POST /analyze": "Crop disease analysis of an image or video",
            "GET /coordinates/places?place_name=": "Coordinates of a place",
            "GET /travel-plan": "Arrival time and weather at the destination",
            "POST /predict-traffic": "Best departure time for a route",
            "GET /health": "Health check"
        },
        "example_request": {
            "source_lat": 11.0176,
            "source_lng": 76.9674,
            "dest_lat": 11.4102,
            "dest_lng": 76.6950
        }
    }))
}
