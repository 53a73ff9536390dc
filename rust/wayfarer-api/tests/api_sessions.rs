//! Session, agent query and recent-activity flows through the router.

mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};

use common::{APP_NAME, ENGINE_URL, Fixtures, LOCATION, PROJECT, scope, spawn};
use wayfarer_api::session::Event;

fn places_answer() -> Event {
    Event::text(
        "place_analyst",
        "```json\n{\"places\": [{\"name\": \"Ooty Lake\"}, {\"name\": \"Botanical Garden\"}]}\n```",
        3.0,
    )
}

async fn create_session(server: &axum_test::TestServer, user_id: &str) -> String {
    let response = server
        .post("/create-session")
        .json(&json!({
            "user_id": user_id,
            "google_project_id": PROJECT,
            "google_project_location": LOCATION,
            "reasoning_engine_app_name": APP_NAME,
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "true");
    body["session_id"].as_str().expect("session id").to_string()
}

#[tokio::test]
async fn test_create_session_then_query_places() {
    let app = spawn(Fixtures {
        agent_events: vec![places_answer()],
        ..Fixtures::default()
    });
    let session_id = create_session(&app.server, "traveller-1").await;

    let response = app
        .server
        .post("/query-agent")
        .json(&json!({
            "user_id": "traveller-1",
            "session_id": session_id,
            "query": "Places to visit in Ooty",
            "reasoning_engine_app_url": ENGINE_URL,
            "type_of_api_call": "places",
        }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "true");
    assert_eq!(body["query"], "Places to visit in Ooty");
    assert_eq!(body["is_places_response"], true);
    assert_eq!(body["places_array"][0]["name"], "Ooty Lake");
    assert_eq!(body["is_itinery_reponse"], false);

    let queries = app.engine.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].resource, ENGINE_URL);
    assert_eq!(queries[0].session_id, session_id);
}

#[tokio::test]
async fn test_create_session_missing_fields() {
    let app = spawn(Fixtures::default());

    let response = app
        .server
        .post("/create-session")
        .json(&json!({ "user_id": "traveller-1" }))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["status"], "false");
    assert_eq!(
        body["error"],
        "Missing required fields: google_project_id, google_project_location, reasoning_engine_app_name"
    );
}

#[tokio::test]
async fn test_query_agent_missing_engine_url() {
    let app = spawn(Fixtures::default());

    let response = app
        .server
        .post("/query-agent")
        .json(&json!({
            "user_id": "traveller-1",
            "session_id": "s-1",
            "query": "Hello",
        }))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["status"], "false");
    assert_eq!(body["error"], "Missing required fields: reasoning_engine_app_url");
    assert!(app.engine.queries().is_empty());
}

#[tokio::test]
async fn test_query_agent_stream_failure() {
    let app = spawn(Fixtures {
        agent_failure: Some("engine went away".to_string()),
        ..Fixtures::default()
    });
    let session_id = create_session(&app.server, "traveller-1").await;

    let response = app
        .server
        .post("/query-agent")
        .json(&json!({
            "user_id": "traveller-1",
            "session_id": session_id,
            "query": "Hello",
            "reasoning_engine_app_url": ENGINE_URL,
        }))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["status"], "false");
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|e| e.starts_with("Failed to query agent"))
    );
}

#[tokio::test]
async fn test_history_records_recent_activity() {
    let app = spawn(Fixtures::default());
    let session_id = create_session(&app.server, "traveller-2").await;

    let scope = scope();
    assert!(app.sessions.append_event(
        &scope,
        "traveller-2",
        &session_id,
        Event::text("user", "  Plan a weekend in Ooty  ", 1_758_434_400.0),
    ));
    assert!(app.sessions.append_event(
        &scope,
        "traveller-2",
        &session_id,
        Event::text("manager", "Here is a two day plan.", 1_758_434_460.0),
    ));

    let response = app
        .server
        .get(&format!("/get-session/{session_id}"))
        .add_query_param("user_id", "traveller-2")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    let history = body["data"]["conversation_history"]
        .as_array()
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["sender"], "user");
    assert_eq!(history[1]["sender"], "assistant");
    assert_eq!(body["data"]["session_info"]["message_count"], 2);

    let response = app.server.get("/get-recent-activities/traveller-2").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["activities"][0]["session_id"], session_id.as_str());
    assert_eq!(
        body["activities"][0]["first_question"],
        "Plan a weekend in Ooty"
    );

    // Opening the session again keeps a single entry.
    app.server
        .get(&format!("/get-session/{session_id}"))
        .add_query_param("user_id", "traveller-2")
        .await
        .assert_status_ok();
    let body: Value = app
        .server
        .get("/get-recent-activities/traveller-2")
        .await
        .json();
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_get_session_errors() {
    let app = spawn(Fixtures::default());

    let response = app
        .server
        .get("/get-session/unknown")
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "Missing required query parameter: 'user_id'");

    let response = app
        .server
        .get("/get-session/unknown")
        .add_query_param("user_id", "traveller-3")
        .expect_failure()
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "Session not found");
}

#[tokio::test]
async fn test_delete_session() {
    let app = spawn(Fixtures::default());
    let session_id = create_session(&app.server, "traveller-4").await;

    let response = app
        .server
        .delete(&format!("/sessions/{session_id}"))
        .add_query_param("user_id", "traveller-4")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["deleted"], true);

    app.server
        .delete(&format!("/sessions/{session_id}"))
        .add_query_param("user_id", "traveller-4")
        .expect_failure()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_touch_activities() {
    let app = spawn(Fixtures::default());
    let session_id = create_session(&app.server, "traveller-5").await;
    app.sessions.append_event(
        &scope(),
        "traveller-5",
        &session_id,
        Event::text("user", "Trains to Mysore", 1.0),
    );
    app.server
        .get(&format!("/get-session/{session_id}"))
        .add_query_param("user_id", "traveller-5")
        .await
        .assert_status_ok();

    let response = app
        .server
        .post("/activities/touch")
        .json(&json!({
            "updates": [
                {"user_id": "traveller-5", "session_id": session_id},
                {"user_id": "traveller-5", "session_id": "missing"},
                {"user_id": "", "session_id": "x"},
            ]
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["updated_count"], 1);
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(2));

    let response = app
        .server
        .post("/activities/touch")
        .json(&json!({ "updates": [] }))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "No updates provided");
}

#[tokio::test]
async fn test_activities_disabled() {
    let app = spawn(Fixtures {
        activities: false,
        ..Fixtures::default()
    });

    let response = app
        .server
        .get("/get-recent-activities/anyone")
        .expect_failure()
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"], "Recent activity store is not configured");
}
