//! Session lifecycle: create, fetch and delete agent sessions.
//!
//! Sessions live in a remote session service. [`SessionService`] is the seam
//! handlers talk to; [`VertexSessionService`] calls the Vertex AI sessions
//! API and [`InMemorySessionService`] backs local development and tests.

pub mod memory;
pub mod model;
pub mod vertex;

pub use memory::InMemorySessionService;
pub use model::{Content, Event, EventActions, Part, Session};
pub use vertex::VertexSessionService;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::auth::AuthError;

/// Which hosted agent application a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionScope {
    pub project_id: String,
    pub location: String,
    /// Reasoning-engine id or full resource name.
    pub app_name: String,
}

impl SessionScope {
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            location: location.into(),
            app_name: app_name.into(),
        }
    }

    /// Full reasoning-engine resource name.
    pub fn resource_name(&self) -> String {
        if self.app_name.starts_with("projects/") {
            self.app_name.clone()
        } else {
            format!(
                "projects/{}/locations/{}/reasoningEngines/{}",
                self.project_id, self.location, self.app_name
            )
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected session service response: {0}")]
    Decode(String),
    #[error(
        "Google Cloud credentials are not configured (set GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_OAUTH_ACCESS_TOKEN)"
    )]
    MissingCredentials,
    #[error("could not obtain a Google access token: {0}")]
    Auth(AuthError),
}

impl From<AuthError> for SessionError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotConfigured => Self::MissingCredentials,
            other => Self::Auth(other),
        }
    }
}

/// Initial state stored when a create request carries none.
pub fn default_initial_state() -> Map<String, Value> {
    let mut state = Map::new();
    state.insert("initial_key".to_string(), Value::from("initial_value"));
    state
}

#[async_trait]
pub trait SessionService: Send + Sync + std::fmt::Debug {
    async fn create_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        initial_state: Map<String, Value>,
    ) -> Result<Session, SessionError>;

    /// `Ok(None)` when the session does not exist for this user.
    async fn get_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError>;

    /// Returns false when there was nothing to delete.
    async fn delete_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        session_id: &str,
    ) -> Result<bool, SessionError>;

    fn backend_name(&self) -> &'static str;
}
