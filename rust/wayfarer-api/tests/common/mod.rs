//! Shared fixtures: the full router wired to in-memory collaborators.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;

use axum_test::TestServer;
use reqwest::Client;

use wayfarer_api::AppState;
use wayfarer_api::activity::{ActivityIndex, InMemoryBackend};
use wayfarer_api::agents::AgentCatalog;
use wayfarer_api::config::AppConfig;
use wayfarer_api::engine::{AgentEngine, ScriptedEngine};
use wayfarer_api::geo::{MapsClient, WeatherService};
use wayfarer_api::llm::{GenerativeModel, ScriptedModel};
use wayfarer_api::server::build_router;
use wayfarer_api::session::{Event, InMemorySessionService, SessionScope, SessionService};
use wayfarer_api::tools::{SearchClient, ToolRegistry};
use wayfarer_api::traffic::{ScriptedWarehouse, TrafficPrediction, TrafficWarehouse};
use wayfarer_api::users::{InMemoryUserRepository, UserRepository};

pub const PROJECT: &str = "wayfarer-test";
pub const LOCATION: &str = "us-central1";
pub const APP_NAME: &str = "trip-planner";
pub const ENGINE_URL: &str = "projects/wayfarer-test/locations/us-central1/reasoningEngines/42";

/// Collaborator setup for one test.
#[derive(Debug)]
pub struct Fixtures {
    pub agent_events: Vec<Event>,
    /// Fail the agent stream after the scripted events.
    pub agent_failure: Option<String>,
    pub model_answers: Vec<String>,
    pub predictions: Vec<TrafficPrediction>,
    /// Base URL for Maps lookups; points nowhere by default.
    pub maps_url: String,
    pub maps_key: Option<String>,
    pub activities: bool,
    pub users: bool,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self {
            agent_events: Vec::new(),
            agent_failure: None,
            model_answers: vec!["Healthy leaf. No disease detected.".to_string()],
            predictions: Vec::new(),
            maps_url: "http://127.0.0.1:9".to_string(),
            maps_key: None,
            activities: true,
            users: true,
        }
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub sessions: Arc<InMemorySessionService>,
    pub engine: Arc<ScriptedEngine>,
    pub model: Arc<ScriptedModel>,
    pub traffic: Arc<ScriptedWarehouse>,
}

pub fn scope() -> SessionScope {
    SessionScope::new(PROJECT, LOCATION, APP_NAME)
}

pub fn spawn(fixtures: Fixtures) -> TestApp {
    let mut config = AppConfig::default();
    config.google.project_id = Some(PROJECT.to_string());
    config.google.location = Some(LOCATION.to_string());
    config.google.reasoning_engine_app_name = Some(APP_NAME.to_string());
    config.gemini.poll_interval_ms = 1;

    let client = Client::new();
    let sessions = Arc::new(InMemorySessionService::new());
    let mut engine = ScriptedEngine::new(fixtures.agent_events);
    if let Some(message) = fixtures.agent_failure {
        engine = engine.then_fail(message);
    }
    let engine = Arc::new(engine);
    let model = Arc::new(ScriptedModel::new(fixtures.model_answers));
    let traffic = Arc::new(ScriptedWarehouse::new(fixtures.predictions));

    let maps = Arc::new(MapsClient::new(
        client.clone(),
        fixtures.maps_key,
        None,
        fixtures.maps_url.as_str(),
        fixtures.maps_url.as_str(),
    ));
    let weather = Arc::new(WeatherService::new(
        client.clone(),
        Arc::clone(&maps),
        "http://127.0.0.1:9",
        "http://127.0.0.1:9",
    ));
    let search = Arc::new(SearchClient::new(client, None, None, "http://127.0.0.1:9"));
    let tools = Arc::new(ToolRegistry::with_travel_tools(Arc::clone(&maps), search));
    let agents = AgentCatalog::builtin().expect("builtin agent catalog");

    let activities = fixtures
        .activities
        .then(|| Arc::new(ActivityIndex::new(Arc::new(InMemoryBackend::new()))));

    let state = AppState {
        config: Arc::new(config),
        sessions: Arc::clone(&sessions) as Arc<dyn SessionService>,
        engine: Arc::clone(&engine) as Arc<dyn AgentEngine>,
        activities,
        users: fixtures
            .users
            .then(|| Arc::new(InMemoryUserRepository::new()) as Arc<dyn UserRepository>),
        model: Arc::clone(&model) as Arc<dyn GenerativeModel>,
        maps,
        weather,
        traffic: Arc::clone(&traffic) as Arc<dyn TrafficWarehouse>,
        tools,
        agents: Arc::new(agents),
    };

    TestApp {
        server: TestServer::new(build_router(state)).expect("test server"),
        sessions,
        engine,
        model,
        traffic,
    }
}
