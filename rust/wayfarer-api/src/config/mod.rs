//! Configuration management for Wayfarer API.
//!
//! Configuration is layered: built-in defaults, then `config/wayfarer.*`
//! files, then `WAYFARER__*` environment variables, and finally the
//! well-known variables the deployment scripts already export
//! (`GEMINI_API_KEY`, `GOOGLE_CLOUD_PROJECT_ID`, `DB_HOST`, ...).
//!
//! Missing credentials never abort startup. The endpoint that needs a
//! credential answers with an explicit error instead. Process-local stores
//! for sessions and users are only used when `SESSION_STORE=memory` or
//! `USER_STORE=memory` asks for them.
//!
//! ```rust,ignore
//! use wayfarer_api::config::{AppConfig, ConfigValidator};
//!
//! let config = AppConfig::load()?;
//! ConfigValidator::validate(&config)?;
//! ```

pub mod error;
pub mod validator;

pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Google Cloud project scope and credentials.
    #[serde(default)]
    pub google: GoogleConfig,
    /// Gemini generative model settings.
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// Google Maps Platform settings.
    #[serde(default)]
    pub maps: MapsConfig,
    /// Programmable Search settings used by the agent tools.
    #[serde(default)]
    pub search: SearchConfig,
    /// Weather provider endpoints.
    #[serde(default)]
    pub weather: WeatherConfig,
    /// Recent-activity index settings.
    #[serde(default)]
    pub activity: ActivityConfig,
    /// PostgreSQL configuration (user profiles).
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Traffic warehouse settings.
    #[serde(default)]
    pub traffic: TrafficConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load and validate configuration.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;

        ConfigValidator::validate(&config)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;

        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        // A missing .env file is normal outside local development.
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("gemini.model", "gemini-1.5-flash")?
            .add_source(config::File::with_name("config/wayfarer-api").required(false))
            .add_source(config::File::with_name("config/wayfarer").required(false))
            .add_source(
                config::Environment::with_prefix("WAYFARER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize()?;
        app_config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(app_config)
    }

    /// Apply the well-known environment variables on top of the layered
    /// configuration. `lookup` is injected so tests do not touch the process
    /// environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(key) = get("GOOGLE_API_KEY") {
            self.maps.api_key = Some(key);
        }
        if let Some(key) = get("GOOGLE_PLACES_API_KEY") {
            self.maps.places_api_key = Some(key);
        }
        if let Some(key) = get("CUSTOM_SEARCH_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(id) = get("CUSTOM_SEARCH_ENGINE_ID") {
            self.search.engine_id = Some(id);
        }
        if let Some(project) = get("GOOGLE_CLOUD_PROJECT_ID") {
            self.google.project_id = Some(project);
        }
        if let Some(location) = get("GOOGLE_CLOUD_LOCATION") {
            self.google.location = Some(location);
        }
        if let Some(app) = get("REASONING_ENGINE_APP_NAME") {
            self.google.reasoning_engine_app_name = Some(app);
        }
        if let Some(token) = get("GOOGLE_OAUTH_ACCESS_TOKEN") {
            self.google.access_token = Some(token);
        }
        if let Some(path) = get("GOOGLE_APPLICATION_CREDENTIALS") {
            self.google.credentials_path = Some(path);
        }
        if let Some(store) = get("SESSION_STORE") {
            self.google.session_store = store;
        }
        if let Some(store) = get("USER_STORE") {
            self.database.user_store = store;
        }
        if let Some(database) = get("FIRESTORE_DATABASE") {
            self.activity.firestore_database = database;
        }
        if let Some(store) = get("ACTIVITY_STORE") {
            self.activity.store = store;
        }
        if let Some(function) = get("TRAFFIC_FUNCTION") {
            self.traffic.function = function;
        }
        if let Some(url) = get("REDIS_URL") {
            self.redis.url = Some(url);
        }

        if let Some(url) = get("DATABASE_URL") {
            self.database.url = Some(url);
        } else if let (Some(user), Some(name), Some(host)) =
            (get("DB_USER"), get("DB_NAME"), get("DB_HOST"))
        {
            let port = get("DB_PORT").unwrap_or_else(|| "5432".to_string());
            let password = get("DB_PASSWORD").unwrap_or_default();
            self.database.url = DatabaseConfig::compose_url(&user, &password, &host, &port, &name);
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Timeout for outgoing calls to Google services, in seconds.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    /// Maximum request body size (media uploads).
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    300
}

fn default_upstream_timeout() -> u64 {
    300
}

fn default_body_limit() -> usize {
    100 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
            upstream_timeout_secs: default_upstream_timeout(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Google Cloud scope shared by sessions, reasoning engines, Firestore and BigQuery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Cloud project id.
    pub project_id: Option<String>,
    /// Cloud region, e.g. `us-central1`.
    pub location: Option<String>,
    /// Reasoning-engine id used by the server-side session lookups.
    pub reasoning_engine_app_name: Option<String>,
    /// Pre-minted OAuth bearer token. Overrides the service-account key.
    pub access_token: Option<String>,
    /// Path of a service-account JSON key used to mint access tokens.
    pub credentials_path: Option<String>,
    /// Session backend: `vertex`, or `memory` for local development.
    #[serde(default = "default_session_store")]
    pub session_store: String,
    /// Override for the Vertex AI endpoint (tests, private service connect).
    pub aiplatform_base_url: Option<String>,
}

fn default_session_store() -> String {
    "vertex".to_string()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: None,
            reasoning_engine_app_name: None,
            access_token: None,
            credentials_path: None,
            session_store: default_session_store(),
            aiplatform_base_url: None,
        }
    }
}

impl GoogleConfig {
    /// True when Google access tokens can be obtained.
    pub fn has_credentials(&self) -> bool {
        self.access_token.is_some() || self.credentials_path.is_some()
    }
}

/// Recognised session backends.
pub const SESSION_STORES: [&str; 2] = ["vertex", "memory"];

/// Gemini settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key.
    pub api_key: Option<String>,
    /// Model used for media analysis and weather summaries.
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// API base URL.
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Interval between Files API state polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of state polls before giving up.
    #[serde(default = "default_poll_attempts")]
    pub max_poll_attempts: u32,
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_attempts() -> u32 {
    120
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_poll_attempts(),
        }
    }
}

/// Google Maps Platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapsConfig {
    /// Key for Geocoding, Places, Distance Matrix and Routes.
    pub api_key: Option<String>,
    /// Separate Places key used by the agent tools; falls back to `api_key`.
    pub places_api_key: Option<String>,
    /// Base URL for the classic Maps web services.
    #[serde(default = "default_maps_base_url")]
    pub maps_base_url: String,
    /// Base URL for the Routes API.
    #[serde(default = "default_routes_base_url")]
    pub routes_base_url: String,
}

fn default_maps_base_url() -> String {
    "https://maps.googleapis.com".to_string()
}

fn default_routes_base_url() -> String {
    "https://routes.googleapis.com".to_string()
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            places_api_key: None,
            maps_base_url: default_maps_base_url(),
            routes_base_url: default_routes_base_url(),
        }
    }
}

/// Programmable Search (Custom Search JSON API) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// API key.
    pub api_key: Option<String>,
    /// Search engine id (`cx`).
    pub engine_id: Option<String>,
    /// Endpoint.
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
}

fn default_search_base_url() -> String {
    "https://www.googleapis.com/customsearch/v1".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            base_url: default_search_base_url(),
        }
    }
}

/// Weather provider endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// wttr.in base URL.
    #[serde(default = "default_wttr_base_url")]
    pub wttr_base_url: String,
    /// Open-Meteo forecast endpoint.
    #[serde(default = "default_open_meteo_base_url")]
    pub open_meteo_base_url: String,
}

fn default_wttr_base_url() -> String {
    "https://wttr.in".to_string()
}

fn default_open_meteo_base_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            wttr_base_url: default_wttr_base_url(),
            open_meteo_base_url: default_open_meteo_base_url(),
        }
    }
}

/// Recent-activity index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Backend: `firestore`, `redis`, `memory` or `disabled`.
    #[serde(default = "default_activity_store")]
    pub store: String,
    /// Firestore collection name.
    #[serde(default = "default_activity_collection")]
    pub collection: String,
    /// Firestore database id.
    #[serde(default = "default_firestore_database")]
    pub firestore_database: String,
    /// Firestore REST base URL.
    #[serde(default = "default_firestore_base_url")]
    pub firestore_base_url: String,
    /// Listing size when the request does not give one.
    #[serde(default = "default_activity_limit")]
    pub default_limit: usize,
}

fn default_activity_store() -> String {
    "firestore".to_string()
}

fn default_activity_collection() -> String {
    "user_recent_activities".to_string()
}

fn default_firestore_database() -> String {
    "(default)".to_string()
}

fn default_firestore_base_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_activity_limit() -> usize {
    50
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            store: default_activity_store(),
            collection: default_activity_collection(),
            firestore_database: default_firestore_database(),
            firestore_base_url: default_firestore_base_url(),
            default_limit: default_activity_limit(),
        }
    }
}

/// Recognised activity backends.
pub const ACTIVITY_STORES: [&str; 4] = ["firestore", "redis", "memory", "disabled"];

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: Option<String>,
    /// User profile backend: `postgres`, or `memory` for local development.
    #[serde(default = "default_user_store")]
    pub user_store: String,
    /// Maximum connection pool size.
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
    /// Connection acquire timeout in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_user_store() -> String {
    "postgres".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            user_store: default_user_store(),
            max_connections: default_pool_size(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

/// Recognised user profile backends.
pub const USER_STORES: [&str; 2] = ["postgres", "memory"];

impl DatabaseConfig {
    /// Build a `postgres://` URL from discrete connection settings,
    /// percent-encoding the credentials.
    pub fn compose_url(
        user: &str,
        password: &str,
        host: &str,
        port: &str,
        name: &str,
    ) -> Option<String> {
        let mut url = url::Url::parse(&format!("postgres://{host}:{port}/{name}")).ok()?;
        url.set_username(user).ok()?;
        if !password.is_empty() {
            url.set_password(Some(password)).ok()?;
        }
        Some(url.to_string())
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: Option<String>,
}

/// Traffic warehouse configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Project billed for BigQuery jobs; defaults to `google.project_id`.
    pub project_id: Option<String>,
    /// Fully-qualified table function returning predictions.
    #[serde(default = "default_traffic_function")]
    pub function: String,
    /// BigQuery REST base URL.
    #[serde(default = "default_bigquery_base_url")]
    pub base_url: String,
}

fn default_traffic_function() -> String {
    "kovai-shines-472309.traffic_transaction_data.get_traffic_data".to_string()
}

fn default_bigquery_base_url() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            function: default_traffic_function(),
            base_url: default_bigquery_base_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to use JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.body_limit_bytes, 100 * 1024 * 1024);
        assert_eq!(config.gemini.model, "gemini-1.5-flash");
        assert_eq!(config.activity.collection, "user_recent_activities");
        assert_eq!(config.activity.store, "firestore");
        assert_eq!(config.google.session_store, "vertex");
        assert_eq!(config.database.user_store, "postgres");
        assert!(!config.google.has_credentials());
    }

    #[test]
    fn test_env_overrides_select_credentials_and_stores() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup(&[
            ("GOOGLE_APPLICATION_CREDENTIALS", "/secrets/gateway.json"),
            ("SESSION_STORE", "memory"),
            ("USER_STORE", "memory"),
        ]));

        assert_eq!(
            config.google.credentials_path.as_deref(),
            Some("/secrets/gateway.json")
        );
        assert!(config.google.has_credentials());
        assert_eq!(config.google.session_store, "memory");
        assert_eq!(config.database.user_store, "memory");
    }

    #[test]
    fn test_env_overrides_populate_google_scope() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup(&[
            ("GOOGLE_CLOUD_PROJECT_ID", "demo-project"),
            ("GOOGLE_CLOUD_LOCATION", "us-central1"),
            ("REASONING_ENGINE_APP_NAME", "1234567890"),
            ("GEMINI_API_KEY", "gem-key"),
            ("ACTIVITY_STORE", "memory"),
        ]));

        assert_eq!(config.google.project_id.as_deref(), Some("demo-project"));
        assert_eq!(config.google.location.as_deref(), Some("us-central1"));
        assert_eq!(config.google.reasoning_engine_app_name.as_deref(), Some("1234567890"));
        assert_eq!(config.gemini.api_key.as_deref(), Some("gem-key"));
        assert_eq!(config.activity.store, "memory");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup(&[("GEMINI_API_KEY", "  ")]));
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    fn test_database_url_from_parts() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup(&[
            ("DB_USER", "wayfarer"),
            ("DB_PASSWORD", "p@ss word"),
            ("DB_NAME", "travel"),
            ("DB_HOST", "10.0.0.5"),
        ]));

        let url = config.database.url.expect("url composed");
        assert!(url.starts_with("postgres://wayfarer:"));
        assert!(url.contains("@10.0.0.5:5432/travel"));
        assert!(!url.contains("p@ss word"));
    }

    #[test]
    fn test_database_url_takes_precedence() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup(&[
            ("DATABASE_URL", "postgres://direct/db"),
            ("DB_USER", "ignored"),
            ("DB_NAME", "ignored"),
            ("DB_HOST", "ignored"),
        ]));
        assert_eq!(config.database.url.as_deref(), Some("postgres://direct/db"));
    }
}
