//! Reasoning-engine access: send a user message to a hosted agent and
//! receive its events as a stream.

pub mod remote;
pub mod scripted;

pub use remote::ReasoningEngineClient;
pub use scripted::ScriptedEngine;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::auth::AuthError;
use crate::session::Event;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("reasoning engine request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("reasoning engine returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed reasoning engine event: {0}")]
    Decode(String),
    #[error(
        "Google Cloud credentials are not configured (set GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_OAUTH_ACCESS_TOKEN)"
    )]
    MissingCredentials,
    #[error("could not obtain a Google access token: {0}")]
    Auth(AuthError),
}

impl From<AuthError> for EngineError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotConfigured => Self::MissingCredentials,
            other => Self::Auth(other),
        }
    }
}

/// Events in the order the agent produced them.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, EngineError>> + Send>>;

/// A hosted agent application that answers queries within a session.
#[async_trait]
pub trait AgentEngine: Send + Sync + std::fmt::Debug {
    /// `resource` is the reasoning-engine resource name
    /// (`projects/{p}/locations/{l}/reasoningEngines/{id}`).
    async fn stream_query(
        &self,
        resource: &str,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<EventStream, EngineError>;
}
