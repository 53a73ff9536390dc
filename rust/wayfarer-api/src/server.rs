//! HTTP server setup and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use reqwest::Client;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::activity::{
    ActivityBackend, ActivityIndex, FirestoreBackend, InMemoryBackend, RedisBackend,
};
use crate::agents::AgentCatalog;
use crate::api;
use crate::auth::GoogleAuth;
use crate::config::{AppConfig, ConfigurationError};
use crate::engine::ReasoningEngineClient;
use crate::geo::{MapsClient, WeatherService};
use crate::llm::GeminiClient;
use crate::logging::OpTimer;
use crate::session::{InMemorySessionService, SessionService, VertexSessionService};
use crate::tools::{SearchClient, ToolRegistry};
use crate::traffic::BigQueryWarehouse;
use crate::users::{InMemoryUserRepository, UserRepository};
use crate::{AppState, log_banner, log_init_step, log_init_warning, log_success};

/// Wayfarer API version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

const TOTAL_STEPS: u32 = 7;

/// Create the application with all routes and middleware.
pub async fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let overall_timer = OpTimer::new("server", "create_app");

    log_banner!(
        format!("🧭 Wayfarer API v{VERSION}"),
        format!(
            "Project: {} | Activity store: {}",
            config.google.project_id.as_deref().unwrap_or("unset"),
            config.activity.store
        )
    );

    // [1/7] Shared HTTP client
    let step_timer = OpTimer::new("server", "http_client");
    let client = Client::builder()
        .timeout(Duration::from_secs(config.server.upstream_timeout_secs))
        .build()?;
    log_init_step!(
        1,
        TOTAL_STEPS,
        "HTTP Client",
        format!("🌍 {}s upstream timeout", config.server.upstream_timeout_secs)
    );
    step_timer.finish();

    // [2/7] Google credentials, sessions and reasoning engines
    let step_timer = OpTimer::new("server", "sessions");
    let google = &config.google;
    let auth = GoogleAuth::from_config(client.clone(), google)?;
    if !auth.is_configured() {
        log_init_warning!(
            "No Google credentials (GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_OAUTH_ACCESS_TOKEN). Sessions, agent queries and traffic will answer 503."
        );
    }
    let sessions: Arc<dyn SessionService> = if google.session_store == "memory" {
        log_init_warning!("SESSION_STORE=memory. Sessions are process-local and unknown to hosted agents.");
        Arc::new(InMemorySessionService::new())
    } else {
        Arc::new(VertexSessionService::new(
            client.clone(),
            auth.clone(),
            google.aiplatform_base_url.clone(),
        ))
    };
    let engine = Arc::new(ReasoningEngineClient::new(
        client.clone(),
        auth.clone(),
        google.aiplatform_base_url.clone(),
    ));
    log_init_step!(
        2,
        TOTAL_STEPS,
        "Sessions",
        format!("💬 {} (credentials: {})", sessions.backend_name(), auth.kind())
    );
    step_timer.finish();

    // [3/7] Recent-activity index
    let step_timer = OpTimer::new("server", "activity_index");
    let activities = init_activity_index(&config, &client, &auth).await;
    log_init_step!(
        3,
        TOTAL_STEPS,
        "Recent Activity",
        format!(
            "🗂️  {}",
            activities.as_ref().map_or("disabled", |a| a.backend_name())
        )
    );
    step_timer.finish();

    // [4/7] User profiles
    let step_timer = OpTimer::new("server", "users");
    let users = init_users(&config).await;
    log_init_step!(
        4,
        TOTAL_STEPS,
        "Users",
        format!(
            "👤 {}",
            users.as_ref().map_or("unavailable", |u| u.backend_name())
        )
    );
    step_timer.finish();

    // [5/7] Google Maps, weather, search and Gemini
    let step_timer = OpTimer::new("server", "google_clients");
    let maps = Arc::new(MapsClient::from_config(client.clone(), &config.maps));
    let search = Arc::new(SearchClient::from_config(client.clone(), &config.search));
    let weather = Arc::new(WeatherService::from_config(
        client.clone(),
        Arc::clone(&maps),
        &config.weather,
    ));
    let model = Arc::new(GeminiClient::from_config(client.clone(), &config.gemini));
    let traffic = Arc::new(BigQueryWarehouse::from_config(
        client.clone(),
        auth,
        &config.traffic,
        &config.google,
    ));
    if config.gemini.api_key.is_none() {
        log_init_warning!("GEMINI_API_KEY not set. Media analysis will fail.");
    }
    if config.maps.api_key.is_none() {
        log_init_warning!("GOOGLE_API_KEY not set. Geo endpoints will answer 503.");
    }
    log_init_step!(
        5,
        TOTAL_STEPS,
        "Google Clients",
        format!("🤖 Gemini {}", config.gemini.model)
    );
    step_timer.finish();

    // [6/7] Tools and agent catalog
    let step_timer = OpTimer::new("server", "agent_catalog");
    let tools = Arc::new(ToolRegistry::with_travel_tools(Arc::clone(&maps), search));
    let agents = AgentCatalog::builtin()?;
    agents.validate(&tools)?;
    log_init_step!(
        6,
        TOTAL_STEPS,
        "Agents",
        format!(
            "🔧 {} tools, {} agents (root: {})",
            tools.list_tools().len(),
            agents.agents().len(),
            agents.root().map_or("none", |a| a.name.as_str())
        )
    );
    step_timer.finish();

    let state = AppState {
        config: Arc::new(config),
        sessions,
        engine,
        activities,
        users,
        model,
        maps,
        weather,
        traffic,
        tools,
        agents: Arc::new(agents),
    };

    // [7/7] Router
    let step_timer = OpTimer::new("server", "router");
    let app = build_router(state);
    log_init_step!(7, TOTAL_STEPS, "Router", "🌐 Routes + middleware configured");
    step_timer.finish();

    overall_timer.finish();
    log_success!("Wayfarer API server created successfully");

    Ok(app)
}

/// Attach middleware and state to the API routes.
pub fn build_router(state: AppState) -> Router {
    let server = &state.config.server;
    let timeout = Duration::from_secs(server.timeout_secs);
    let body_limit = server.body_limit_bytes;

    // Outermost first.
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(DefaultBodyLimit::max(body_limit));

    api::create_router().layer(middleware).with_state(state)
}

/// The configured activity backend, or `None` when it is disabled or cannot
/// be reached.
async fn init_activity_index(
    config: &AppConfig,
    client: &Client,
    auth: &GoogleAuth,
) -> Option<Arc<ActivityIndex>> {
    let activity = &config.activity;
    let index = |backend: Arc<dyn ActivityBackend>| Some(Arc::new(ActivityIndex::new(backend)));

    match activity.store.as_str() {
        "memory" => index(Arc::new(InMemoryBackend::new())),
        "redis" => {
            let url = config.redis.url.as_deref()?;
            match RedisBackend::connect(url).await {
                Ok(backend) => index(Arc::new(backend)),
                Err(e) => {
                    let err = ConfigurationError::connection_failed(
                        "Redis",
                        e.to_string(),
                        "recent-activity endpoints answering 503",
                    );
                    log_init_warning!("{}", err);
                    None
                }
            }
        }
        "firestore" => {
            let Some(project) = config.google.project_id.as_deref() else {
                log_init_warning!(
                    "Firestore needs GOOGLE_CLOUD_PROJECT_ID. Recent activity disabled."
                );
                return None;
            };
            if !auth.is_configured() {
                log_init_warning!("Firestore needs Google credentials. Recent activity disabled.");
                return None;
            }
            index(Arc::new(FirestoreBackend::new(
                client.clone(),
                &activity.firestore_base_url,
                project,
                &activity.firestore_database,
                &activity.collection,
                auth.clone(),
            )))
        }
        _ => None,
    }
}

/// PostgreSQL when configured, memory only when `USER_STORE=memory`.
/// Otherwise `None`, and the user endpoints answer 503.
#[cfg(feature = "database")]
async fn init_users(config: &AppConfig) -> Option<Arc<dyn UserRepository>> {
    if config.database.user_store == "memory" {
        log_init_warning!("USER_STORE=memory. User profiles are process-local.");
        return Some(Arc::new(InMemoryUserRepository::new()));
    }
    let Some(url) = config.database.url.as_deref() else {
        log_init_warning!("DATABASE_URL not set. User endpoints will answer 503.");
        return None;
    };
    match crate::users::PgUserRepository::connect(url, &config.database).await {
        Ok(repo) => Some(Arc::new(repo)),
        Err(e) => {
            let err = ConfigurationError::connection_failed(
                "PostgreSQL",
                e.to_string(),
                "user endpoints answering 503",
            );
            log_init_warning!("{}", err);
            None
        }
    }
}

#[cfg(not(feature = "database"))]
async fn init_users(config: &AppConfig) -> Option<Arc<dyn UserRepository>> {
    if config.database.user_store == "memory" {
        log_init_warning!("USER_STORE=memory. User profiles are process-local.");
        return Some(Arc::new(InMemoryUserRepository::new()));
    }
    log_init_warning!("Built without the database feature. User endpoints will answer 503.");
    None
}
