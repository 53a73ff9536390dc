use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::model::{Event, Session, now_secs};
use super::{SessionError, SessionScope, SessionService};

type SessionKey = (String, String, String);

/// Process-local session store, selected with `SESSION_STORE=memory`.
#[derive(Debug, Default)]
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(scope: &SessionScope, user_id: &str, session_id: &str) -> SessionKey {
        (scope.resource_name(), user_id.to_string(), session_id.to_string())
    }

    /// Append an event, as the reasoning engine does while answering.
    /// Returns false when the session is unknown.
    pub fn append_event(
        &self,
        scope: &SessionScope,
        user_id: &str,
        session_id: &str,
        event: Event,
    ) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(&Self::key(scope, user_id, session_id)) {
            Some(session) => {
                session.last_update_time = session.last_update_time.max(event.timestamp);
                session.events.push(event);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        initial_state: Map<String, Value>,
    ) -> Result<Session, SessionError> {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            app_name: scope.app_name.clone(),
            user_id: user_id.to_string(),
            state: initial_state,
            events: Vec::new(),
            last_update_time: now_secs(),
        };
        self.sessions
            .write()
            .insert(Self::key(scope, user_id, &session.id), session.clone());
        Ok(session)
    }

    async fn get_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError> {
        Ok(self
            .sessions
            .read()
            .get(&Self::key(scope, user_id, session_id))
            .cloned())
    }

    async fn delete_session(
        &self,
        scope: &SessionScope,
        user_id: &str,
        session_id: &str,
    ) -> Result<bool, SessionError> {
        Ok(self
            .sessions
            .write()
            .remove(&Self::key(scope, user_id, session_id))
            .is_some())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
