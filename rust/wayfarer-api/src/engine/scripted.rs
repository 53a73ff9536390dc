//! Engine that replays recorded events. Used for local development without
//! a deployed agent and throughout the test suite.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AgentEngine, EngineError, EventStream};
use crate::session::Event;

#[derive(Debug, Clone)]
enum Step {
    Event(Event),
    Fail(String),
}

/// A query the engine received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub resource: String,
    pub user_id: String,
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    script: Vec<Step>,
    queries: Mutex<Vec<RecordedQuery>>,
    yielded: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            script: events.into_iter().map(Step::Event).collect(),
            ..Self::default()
        }
    }

    /// Fail the stream after the scripted events.
    #[must_use]
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.script.push(Step::Fail(message.into()));
        self
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().clone()
    }

    /// How many stream items consumers have pulled so far.
    pub fn yielded(&self) -> usize {
        self.yielded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentEngine for ScriptedEngine {
    async fn stream_query(
        &self,
        resource: &str,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<EventStream, EngineError> {
        self.queries.lock().push(RecordedQuery {
            resource: resource.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            message: message.to_string(),
        });

        let script = self.script.clone();
        let yielded = Arc::clone(&self.yielded);

        Ok(Box::pin(async_stream::stream! {
            for step in script {
                yielded.fetch_add(1, Ordering::SeqCst);
                match step {
                    Step::Event(event) => yield Ok(event),
                    Step::Fail(message) => {
                        yield Err(EngineError::Decode(message));
                        return;
                    }
                }
            }
        }))
    }
}
