use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ActivityBackend, ActivityKey, QueryOrder, RecentActivity, StoreError, sort_by_access_desc};
use crate::session::model::now_secs;

/// Mutex-guarded map keyed by (user, session).
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: Mutex<BTreeMap<(String, String), RecentActivity>>,
    /// Reject ordered queries the way Firestore does without a composite index.
    require_index: bool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose ordered queries fail with [`StoreError::IndexRequired`].
    pub fn without_composite_index() -> Self {
        Self {
            require_index: true,
            ..Self::default()
        }
    }

    /// Insert or replace an entry as-is.
    pub fn insert(&self, activity: RecentActivity) {
        self.entries.lock().insert(
            (activity.user_id.clone(), activity.session_id.clone()),
            activity,
        );
    }

    fn map_key(key: &ActivityKey) -> (String, String) {
        (key.user_id.clone(), key.session_id.clone())
    }
}

#[async_trait]
impl ActivityBackend for InMemoryBackend {
    async fn create_if_absent(
        &self,
        key: &ActivityKey,
        first_question: &str,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&Self::map_key(key)) {
            return Ok(false);
        }
        let now = now_secs();
        entries.insert(
            Self::map_key(key),
            RecentActivity {
                doc_id: key.doc_id(),
                user_id: key.user_id.clone(),
                session_id: key.session_id.clone(),
                first_question: Some(first_question.to_string()),
                created_at: Some(now),
                accessed_at: Some(now),
            },
        );
        Ok(true)
    }

    async fn touch(&self, key: &ActivityKey) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .lock()
            .get_mut(&Self::map_key(key))
            .map(|entry| entry.accessed_at = Some(now_secs()))
            .is_some())
    }

    async fn touch_batch(&self, keys: &[ActivityKey]) -> Result<Vec<bool>, StoreError> {
        let mut entries = self.entries.lock();
        let now = now_secs();
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get_mut(&Self::map_key(key))
                    .map(|entry| entry.accessed_at = Some(now))
                    .is_some()
            })
            .collect())
    }

    async fn query(
        &self,
        user_id: &str,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<RecentActivity>, StoreError> {
        if order == QueryOrder::AccessedDesc && self.require_index {
            return Err(StoreError::IndexRequired(
                "ordering by accessed_at requires an index on (user_id, accessed_at)".to_string(),
            ));
        }

        let mut matches: Vec<RecentActivity> = self
            .entries
            .lock()
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();

        if order == QueryOrder::AccessedDesc {
            sort_by_access_desc(&mut matches);
        }
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
