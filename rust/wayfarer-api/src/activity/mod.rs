//! Recent-activity index: one entry per (user, session) holding the first
//! question the user asked and when the session was created and last opened.
//!
//! [`ActivityIndex`] holds the backend-independent rules (insert-if-absent,
//! the ordered-query fallback, batch reporting). [`ActivityBackend`] is the
//! storage seam, implemented for Firestore, Redis and memory.

pub mod firestore;
pub mod memory;
pub mod redis;

pub use firestore::FirestoreBackend;
pub use memory::InMemoryBackend;
pub use self::redis::RedisBackend;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// One index entry. Timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub doc_id: String,
    pub user_id: String,
    pub session_id: String,
    pub first_question: Option<String>,
    pub created_at: Option<f64>,
    pub accessed_at: Option<f64>,
}

/// Identifies an entry for access-time updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityKey {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
}

impl ActivityKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Deterministic document id, safe for Firestore and Redis keys.
    pub fn doc_id(&self) -> String {
        let raw = format!("{}\u{1f}{}", self.user_id, self.session_id);
        format!("act-{}", URL_SAFE_NO_PAD.encode(raw.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    /// Newest access first. May need a composite index.
    AccessedDesc,
    /// Backend order.
    Unordered,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("the query requires a composite index: {0}")]
    IndexRequired(String),
    #[error("activity store request failed: {0}")]
    Backend(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<crate::auth::AuthError> for StoreError {
    fn from(err: crate::auth::AuthError) -> Self {
        Self::Backend(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", content = "doc_id", rename_all = "snake_case")]
pub enum RecordOutcome {
    Created(String),
    Touched(String),
}

/// Result of a batch access-time update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTouchReport {
    pub updated_count: usize,
    pub errors: Vec<String>,
}

/// Storage operations an index backend provides.
#[async_trait]
pub trait ActivityBackend: Send + Sync + std::fmt::Debug {
    /// Atomically create the entry unless one exists for the key.
    /// Returns false when it already existed.
    async fn create_if_absent(
        &self,
        key: &ActivityKey,
        first_question: &str,
    ) -> Result<bool, StoreError>;

    /// Set the access time to now. Returns false when no entry exists.
    async fn touch(&self, key: &ActivityKey) -> Result<bool, StoreError>;

    /// Touch every existing entry in one atomic write. Returns, per key,
    /// whether an entry existed.
    async fn touch_batch(&self, keys: &[ActivityKey]) -> Result<Vec<bool>, StoreError>;

    async fn query(
        &self,
        user_id: &str,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<RecentActivity>, StoreError>;

    fn name(&self) -> &'static str;
}

/// Newest access first; missing timestamps sort as oldest. Stable.
pub fn sort_by_access_desc(activities: &mut [RecentActivity]) {
    activities.sort_by(|a, b| {
        let a = a.accessed_at.unwrap_or(f64::NEG_INFINITY);
        let b = b.accessed_at.unwrap_or(f64::NEG_INFINITY);
        b.partial_cmp(&a).unwrap_or(Ordering::Equal)
    });
}

#[derive(Debug, Clone)]
pub struct ActivityIndex {
    backend: Arc<dyn ActivityBackend>,
}

impl ActivityIndex {
    pub fn new(backend: Arc<dyn ActivityBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Create the entry on first sight of a session, otherwise refresh its
    /// access time.
    pub async fn record_first_question(
        &self,
        user_id: &str,
        session_id: &str,
        question: &str,
    ) -> Result<RecordOutcome, StoreError> {
        let key = ActivityKey::new(user_id, session_id);
        if self.backend.create_if_absent(&key, question).await? {
            tracing::debug!(user_id, session_id, "Recorded recent activity");
            return Ok(RecordOutcome::Created(key.doc_id()));
        }
        if self.backend.touch(&key).await? {
            Ok(RecordOutcome::Touched(key.doc_id()))
        } else {
            Err(StoreError::Backend(format!(
                "activity for session {session_id} vanished between create and touch"
            )))
        }
    }

    pub async fn touch(&self, user_id: &str, session_id: &str) -> Result<bool, StoreError> {
        self.backend.touch(&ActivityKey::new(user_id, session_id)).await
    }

    /// Refresh access times for many sessions at once. Malformed or unknown
    /// pairs are reported in `errors`; the rest are committed together.
    pub async fn touch_many(&self, keys: &[ActivityKey]) -> Result<BatchTouchReport, StoreError> {
        let mut report = BatchTouchReport::default();
        let mut valid = Vec::with_capacity(keys.len());

        for (i, key) in keys.iter().enumerate() {
            if key.user_id.trim().is_empty() || key.session_id.trim().is_empty() {
                report
                    .errors
                    .push(format!("Update {i}: user_id and session_id are required"));
            } else {
                valid.push(key.clone());
            }
        }

        if !valid.is_empty() {
            let found = self.backend.touch_batch(&valid).await?;
            for (key, existed) in valid.iter().zip(found) {
                if existed {
                    report.updated_count += 1;
                } else {
                    report.errors.push(format!(
                        "No activity found for user {} session {}",
                        key.user_id, key.session_id
                    ));
                }
            }
        }

        Ok(report)
    }

    /// Most recently accessed entries first.
    ///
    /// Falls back to an unordered fetch sorted here when the backend cannot
    /// order the query.
    pub async fn list_recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RecentActivity>, StoreError> {
        match self
            .backend
            .query(user_id, QueryOrder::AccessedDesc, Some(limit))
            .await
        {
            Ok(activities) => Ok(activities),
            Err(StoreError::IndexRequired(message)) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    %message,
                    "Ordered activity query needs an index, sorting client-side"
                );
                let mut activities = self
                    .backend
                    .query(user_id, QueryOrder::Unordered, None)
                    .await?;
                sort_by_access_desc(&mut activities);
                activities.truncate(limit);
                Ok(activities)
            }
            Err(e) => Err(e),
        }
    }
}
