//! Media analysis, traffic, geo lookups, catalog and health.

mod common;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use mockito::Matcher;
use serde_json::{Value, json};

use common::{Fixtures, spawn};
use wayfarer_api::traffic::TrafficPrediction;

const TOMATO_ANSWER: &str = "```json\n{\"crop_name\": \"Tomato\", \"disease\": \"Early blight\", \"symptoms\": \"Brown concentric rings\"}\n```";

fn prediction(departure_time: &str, seconds: i64, minutes: f64) -> TrafficPrediction {
    TrafficPrediction {
        departure_time: departure_time.to_string(),
        source_lat: 11.0176,
        source_lng: 76.9674,
        dest_lat: 11.4102,
        dest_lng: 76.695,
        duration_seconds: seconds,
        duration_minutes: minutes,
    }
}

fn route_body() -> Value {
    json!({
        "source_lat": 11.0176,
        "source_lng": 76.9674,
        "dest_lat": 11.4102,
        "dest_lng": 76.695,
    })
}

#[tokio::test]
async fn test_analyze_url() {
    let app = spawn(Fixtures {
        model_answers: vec![TOMATO_ANSWER.to_string()],
        ..Fixtures::default()
    });

    let response = app
        .server
        .post("/analyze")
        .json(&json!({ "url": "https://example.com/leaf.jpg" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["source"], "url");
    assert_eq!(body["source_value"], "https://example.com/leaf.jpg");
    assert_eq!(body["verdict"]["disease"], "Early blight");
    assert!(app.model.uploads().is_empty());
}

#[tokio::test]
async fn test_analyze_upload_deletes_file() {
    let app = spawn(Fixtures {
        model_answers: vec![TOMATO_ANSWER.to_string()],
        ..Fixtures::default()
    });

    let image = Part::bytes(vec![0x89, b'P', b'N', b'G', 1, 2, 3])
        .file_name("my leaf.png")
        .mime_type("image/png");
    let response = app
        .server
        .post("/analyze")
        .multipart(MultipartForm::new().add_part("file", image))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["source"], "file_upload");
    assert_eq!(body["source_value"], "my_leaf.png");
    assert_eq!(body["verdict"]["crop_name"], "Tomato");

    assert_eq!(app.model.uploads(), vec![("my_leaf.png".to_string(), 7)]);
    assert_eq!(app.model.deleted().len(), 1);
}

#[tokio::test]
async fn test_analyze_rejects_bad_input() {
    let app = spawn(Fixtures::default());

    let response = app
        .server
        .post("/analyze")
        .json(&json!({}))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "No file or URL provided");

    let notes = Part::text("not an image")
        .file_name("notes.txt")
        .mime_type("text/plain");
    let response = app
        .server
        .post("/analyze")
        .multipart(MultipartForm::new().add_part("file", notes))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "File type not allowed");
    assert!(app.model.uploads().is_empty());
}

#[tokio::test]
async fn test_predict_traffic() {
    let app = spawn(Fixtures {
        predictions: vec![
            prediction("2025-09-21T06:00:00+00:00", 3120, 52.0),
            prediction("2025-09-21T07:00:00+00:00", 2850, 47.5),
            prediction("2025-09-21T08:00:00+00:00", 3675, 61.25),
        ],
        ..Fixtures::default()
    });

    let response = app.server.post("/predict-traffic").json(&route_body()).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["best_time"]["departure_time"], "2025-09-21T07:00:00+00:00");
    assert_eq!(body["worst_time"]["departure_time"], "2025-09-21T08:00:00+00:00");
    assert_eq!(body["time_saved_minutes"], 13.75);
    assert_eq!(body["total_predictions_analyzed"], 3);

    let requests = app.traffic.requests();
    assert_eq!(requests.len(), 1);
    assert!((requests[0].dest_lat - 11.4102).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_predict_traffic_without_rows() {
    let app = spawn(Fixtures::default());

    let response = app
        .server
        .post("/predict-traffic")
        .json(&route_body())
        .expect_failure()
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "No traffic predictions found");

    app.server
        .post("/predict-traffic")
        .json(&json!({ "source_lat": 11.0 }))
        .expect_failure()
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_coordinates_from_places_api() {
    let mut maps = mockito::Server::new_async().await;
    let lookup = maps
        .mock("GET", "/maps/api/place/textsearch/json")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("query".into(), "Ooty".into()),
            Matcher::UrlEncoded("key".into(), "maps-key".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "OK",
                "results": [{
                    "name": "Ooty",
                    "formatted_address": "Ooty, Tamil Nadu, India",
                    "geometry": {"location": {"lat": 11.4102, "lng": 76.695}},
                    "place_id": "ChIJ-ooty"
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let app = spawn(Fixtures {
        maps_url: maps.url(),
        maps_key: Some("maps-key".to_string()),
        ..Fixtures::default()
    });

    let response = app
        .server
        .get("/coordinates/places")
        .add_query_param("place_name", "Ooty")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["place_name"], "Ooty");
    assert_eq!(body["latitude"], 11.4102);
    assert_eq!(body["place_id"], "ChIJ-ooty");
    assert_eq!(body["api_used"], "Places API");
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_coordinates_zero_results_is_404() {
    let mut maps = mockito::Server::new_async().await;
    maps.mock("GET", "/maps/api/geocode/json")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "ZERO_RESULTS", "results": []}"#)
        .create_async()
        .await;

    let app = spawn(Fixtures {
        maps_url: maps.url(),
        maps_key: Some("maps-key".to_string()),
        ..Fixtures::default()
    });

    let response = app
        .server
        .get("/coordinates/geocoding")
        .add_query_param("place_name", "Nowhere")
        .expect_failure()
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(
        body["error"],
        "Location not found. API Status: ZERO_RESULTS"
    );
}

#[tokio::test]
async fn test_coordinates_need_key_and_place() {
    let app = spawn(Fixtures::default());

    app.server
        .get("/coordinates/geocoding")
        .add_query_param("place_name", "Ooty")
        .expect_failure()
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .server
        .get("/coordinates/places")
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Missing required fields: place_name");
}

/// Routes API answering with a 1h 45m drive, and reverse geocoding to Ooty.
async fn mock_route_and_place(maps: &mut mockito::ServerGuard, routes: Value) -> mockito::Mock {
    maps.mock("GET", "/maps/api/geocode/json")
        .match_query(Matcher::UrlEncoded("latlng".into(), "11.4102,76.695".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "OK",
                "results": [{
                    "formatted_address": "Ooty, Tamil Nadu 643001, India",
                    "geometry": {"location": {"lat": 11.4102, "lng": 76.695}},
                    "address_components": [
                        {"long_name": "Ooty", "types": ["locality", "political"]}
                    ]
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;
    maps.mock("POST", "/directions/v2:computeRoutes")
        .match_header("x-goog-api-key", "maps-key")
        .match_body(Matcher::PartialJson(json!({
            "travelMode": "DRIVE",
            "destination": {"location": {"latLng": {"latitude": 11.4102, "longitude": 76.695}}},
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(routes.to_string())
        .create_async()
        .await
}

fn is_timestamp(raw: &str) -> bool {
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").is_ok()
}

fn prompt_text(app: &common::TestApp) -> String {
    app.model
        .prompts()
        .concat()
        .into_iter()
        .filter_map(|part| match part {
            wayfarer_api::llm::Part::Text { text } => Some(text),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_travel_plan_get_reports_ist_arrival() {
    let mut maps = mockito::Server::new_async().await;
    let routes = mock_route_and_place(
        &mut maps,
        json!({"routes": [{"duration": "6300s", "distanceMeters": 51234}]}),
    )
    .await;

    let app = spawn(Fixtures {
        model_answers: vec!["Cool and misty in Ooty when you arrive.".to_string()],
        maps_url: maps.url(),
        maps_key: Some("maps-key".to_string()),
        ..Fixtures::default()
    });

    let response = app
        .server
        .get("/travel-plan")
        .add_query_param("source_lat", 11.0176)
        .add_query_param("source_lng", 76.9674)
        .add_query_param("dest_lat", 11.4102)
        .add_query_param("dest_lng", 76.695)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["weather_summary"], "Cool and misty in Ooty when you arrive.");

    let estimated = body["estimated_time"].as_str().expect("estimated time");
    let local = estimated.strip_suffix(" IST").expect("IST suffix");
    assert!(is_timestamp(local), "unexpected arrival format: {estimated}");

    let prompt = prompt_text(&app);
    assert!(prompt.contains("Location: Ooty"));
    assert!(prompt.contains(&format!("Estimated Arrival Time: {estimated}")));
    routes.assert_async().await;
}

#[tokio::test]
async fn test_travel_plan_post_falls_back_to_distance_matrix() {
    let mut maps = mockito::Server::new_async().await;
    mock_route_and_place(&mut maps, json!({})).await;
    let matrix = maps
        .mock("GET", "/maps/api/distancematrix/json")
        .match_query(Matcher::UrlEncoded("mode".into(), "walking".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "OK",
                "rows": [{"elements": [{
                    "status": "OK",
                    "duration": {"text": "12 hours", "value": 43200},
                    "distance": {"text": "51.2 km", "value": 51234}
                }]}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let app = spawn(Fixtures {
        model_answers: vec!["Sunny on arrival.".to_string()],
        maps_url: maps.url(),
        maps_key: Some("maps-key".to_string()),
        ..Fixtures::default()
    });

    let mut body = route_body();
    body["travel_mode"] = json!("walk");
    let response = app.server.post("/travel-plan").json(&body).await;
    response.assert_status_ok();
    let body: Value = response.json();
    let estimated = body["estimated_time"].as_str().expect("estimated time");
    assert!(is_timestamp(estimated), "unexpected arrival format: {estimated}");
    assert_eq!(body["weather_summary"], "Sunny on arrival.");
    matrix.assert_async().await;
}

#[tokio::test]
async fn test_travel_plan_errors() {
    let app = spawn(Fixtures::default());

    app.server
        .post("/travel-plan")
        .json(&route_body())
        .expect_failure()
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .server
        .get("/travel-plan")
        .add_query_param("source_lat", 11.0176)
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_agent_and_tool_catalog() {
    let app = spawn(Fixtures::default());

    let body: Value = app.server.get("/agents").await.json();
    assert_eq!(body["root"], "trip_manager");
    assert_eq!(body["agents"].as_array().map(Vec::len), Some(4));

    let body: Value = app.server.get("/tools").await.json();
    let names: Vec<&str> = body["tools"]
        .as_array()
        .expect("tool list")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"get_coordinates"));
    assert!(names.contains(&"get_place_details"));

    let response = app
        .server
        .post("/tools/book_flight")
        .expect_failure()
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "Unknown tool: book_flight");

    let response = app
        .server
        .post("/tools/get_coordinates")
        .json(&json!(["Ooty"]))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let app = spawn(Fixtures::default());

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "Wayfarer API");
    assert_eq!(body["activities"], "in-memory");

    let body: Value = app.server.get("/").await.json();
    assert!(body["endpoints"]["POST /query-agent"].is_string());
}
