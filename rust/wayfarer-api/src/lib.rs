//! Wayfarer API - trip planning agent gateway
//!
//! One HTTP service in front of the hosted trip-planning agents and the
//! Google services around them:
//!
//! - **Sessions**: create agent sessions, send queries, and read the
//!   conversation history back in the shape the mobile client renders
//! - **Recent activity**: a per-user index of opened sessions, stored in
//!   Firestore, Redis or memory
//! - **Agents and tools**: the versioned agent catalog and the tool functions
//!   the agents call
//! - **Geo**: coordinates, routes and destination weather
//! - **Traffic**: best departure time from BigQuery predictions
//! - **Media**: crop-disease analysis of images and videos with Gemini
//! - **Users**: profiles with a stub OTP check
//!
//! # Architecture
//!
//! - [`config`]: layered configuration and validation
//! - [`auth`]: Google access tokens from a service-account key
//! - [`session`], [`engine`], [`reducer`], [`conversation`]: the agent pipeline
//! - [`activity`]: recent-activity index
//! - [`agents`], [`tools`]: agent catalog and tool registry
//! - [`llm`]: Gemini client
//! - [`geo`], [`traffic`], [`media`], [`users`]: independent request handlers
//! - [`api`]: routing
//!
//! # Example
//!
//! ```rust,ignore
//! use wayfarer_api::{config::AppConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let app = create_app(config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod activity;
pub mod agents;
pub mod api;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod geo;
pub mod llm;
pub mod logging;
pub mod media;
pub mod reducer;
pub mod server;
pub mod session;
pub mod tools;
pub mod traffic;
pub mod users;

use std::sync::Arc;

use activity::ActivityIndex;
use agents::AgentCatalog;
use config::AppConfig;
use engine::AgentEngine;
use geo::{MapsClient, WeatherService};
use llm::GenerativeModel;
use session::SessionService;
use tools::ToolRegistry;
use traffic::TrafficWarehouse;
use users::UserRepository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Agent sessions (Vertex AI, or memory when explicitly selected).
    pub sessions: Arc<dyn SessionService>,
    /// Hosted agent applications.
    pub engine: Arc<dyn AgentEngine>,
    /// Recent-activity index; `None` when no store is configured.
    pub activities: Option<Arc<ActivityIndex>>,
    /// User profiles; `None` when no store is configured or reachable.
    pub users: Option<Arc<dyn UserRepository>>,
    /// Gemini, for media analysis and weather summaries.
    pub model: Arc<dyn GenerativeModel>,
    pub maps: Arc<MapsClient>,
    pub weather: Arc<WeatherService>,
    pub traffic: Arc<dyn TrafficWarehouse>,
    pub tools: Arc<ToolRegistry>,
    pub agents: Arc<AgentCatalog>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("sessions", &self.sessions.backend_name())
            .field(
                "activities",
                &self.activities.as_ref().map(|a| a.backend_name()),
            )
            .field("users", &self.users.as_ref().map(|u| u.backend_name()))
            .field("tools", &self.tools.list_tools().len())
            .field("agents", &self.agents.agents().len())
            .finish_non_exhaustive()
    }
}
