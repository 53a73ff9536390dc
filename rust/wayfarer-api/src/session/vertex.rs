//! Vertex AI Agent Engine sessions API client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::model::{Event, Session, rfc3339_to_secs};
use super::{SessionError, SessionScope, SessionService};
use crate::auth::GoogleAuth;
use crate::logging::OpTimer;

/// Sessions served by Vertex AI (`v1beta1 .../reasoningEngines/*/sessions`).
#[derive(Debug, Clone)]
pub struct VertexSessionService {
    client: Client,
    auth: GoogleAuth,
    base_url_override: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSession {
    name: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    session_state: Map<String, Value>,
    #[serde(default)]
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPage {
    #[serde(default)]
    session_events: Vec<Event>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl VertexSessionService {
    pub fn new(client: Client, auth: GoogleAuth, base_url: Option<String>) -> Self {
        Self {
            client,
            auth,
            base_url_override: base_url,
        }
    }

    fn sessions_url(&self, scope: &SessionScope) -> String {
        let base = self.base_url_override.clone().unwrap_or_else(|| {
            format!("https://{}-aiplatform.googleapis.com", scope.location)
        });
        format!(
            "{}/v1beta1/{}/sessions",
            base.trim_end_matches('/'),
            scope.resource_name()
        )
    }

    async fn token(&self) -> Result<String, SessionError> {
        Ok(self.auth.token().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SessionError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(SessionError::Status { status, body })
    }

    async fn list_events(&self, session_url: &str) -> Result<Vec<Event>, SessionError> {
        let token = self.token().await?;
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{session_url}/events"))
                .bearer_auth(&token);
            if let Some(ref page) = page_token {
                request = request.query(&[("pageToken", page)]);
            }

            let page: EventPage = Self::check(request.send().await?).await?.json().await?;
            events.extend(page.session_events.into_iter().map(with_event_id));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(events)
    }
}

/// REST events carry their id only as the last segment of `name`.
fn with_event_id(mut event: Event) -> Event {
    if event.id.is_empty() {
        if let Some(id) = event
            .extra
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| name.rsplit('/').next())
        {
            event.id = id.to_string();
        }
    }
    event
}

/// Extract the session id from a resource name such as
/// `.../sessions/123/operations/456` or `.../sessions/123`.
pub fn session_id_from_name(name: &str) -> Option<&str> {
    let mut segments = name.split('/');
    segments.by_ref().find(|s| *s == "sessions")?;
    segments.next().filter(|id| !id.is_empty())
}

#[async_trait]
impl SessionService for VertexSessionService {
    async fn create_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        initial_state: Map<String, Value>,
    ) -> Result<Session, SessionError> {
        let token = self.token().await?;
        let timer = OpTimer::new("vertex_sessions", "create_session");

        let result: Result<Session, SessionError> = async {
            let response = self
                .client
                .post(self.sessions_url(scope))
                .bearer_auth(&token)
                .json(&json!({ "userId": user_id, "sessionState": initial_state }))
                .send()
                .await?;
            let operation: Value = Self::check(response).await?.json().await?;

            let name = operation["name"]
                .as_str()
                .ok_or_else(|| SessionError::Decode(format!("missing name in {operation}")))?;
            let id = session_id_from_name(name)
                .ok_or_else(|| SessionError::Decode(format!("no session id in {name}")))?;

            Ok(Session {
                id: id.to_string(),
                app_name: scope.app_name.clone(),
                user_id: user_id.to_string(),
                state: initial_state.clone(),
                events: Vec::new(),
                last_update_time: super::model::now_secs(),
            })
        }
        .await;

        timer.finish_with_result(&result);
        result
    }

    async fn get_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError> {
        let token = self.token().await?;
        let timer = OpTimer::new("vertex_sessions", "get_session");
        let session_url = format!("{}/{session_id}", self.sessions_url(scope));

        let result: Result<Option<Session>, SessionError> = async {
            let response = self.client.get(&session_url).bearer_auth(&token).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let remote: RemoteSession = Self::check(response).await?.json().await?;
            if !remote.user_id.is_empty() && remote.user_id != user_id {
                return Ok(None);
            }

            let events = self.list_events(&session_url).await?;
            Ok(Some(Session {
                id: session_id_from_name(&remote.name)
                    .unwrap_or(session_id)
                    .to_string(),
                app_name: scope.app_name.clone(),
                user_id: user_id.to_string(),
                state: remote.session_state,
                events,
                last_update_time: remote
                    .update_time
                    .as_deref()
                    .and_then(rfc3339_to_secs)
                    .unwrap_or_default(),
            }))
        }
        .await;

        timer.finish_with_result(&result);
        result
    }

    async fn delete_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        session_id: &str,
    ) -> Result<bool, SessionError> {
        if self.get_session(scope, user_id, session_id).await?.is_none() {
            return Ok(false);
        }

        let token = self.token().await?;
        let response = self
            .client
            .delete(format!("{}/{session_id}", self.sessions_url(scope)))
            .bearer_auth(&token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "vertex-ai"
    }
}
