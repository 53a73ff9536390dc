use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{UpsertOutcome, User, UserRepository, UserStoreError};

/// Process-local profiles, selected with `USER_STORE=memory`.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<BTreeMap<i64, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, id: i64, apply: impl FnOnce(&mut User)) -> Option<User> {
        let mut users = self.users.write();
        let user = users.get_mut(&id)?;
        apply(user);
        Some(user.clone())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn upsert_by_phone(
        &self,
        name: &str,
        phone_no: &str,
    ) -> Result<(User, UpsertOutcome), UserStoreError> {
        let mut users = self.users.write();
        if let Some(user) = users.values_mut().find(|u| u.phone_no == phone_no) {
            user.name = name.to_string();
            return Ok((user.clone(), UpsertOutcome::Updated));
        }

        let id = users.keys().next_back().map_or(1, |last| last + 1);
        let user = User {
            id,
            name: name.to_string(),
            phone_no: phone_no.to_string(),
            interests: None,
            favorites: None,
        };
        users.insert(id, user.clone());
        Ok((user, UpsertOutcome::Created))
    }

    async fn find(&self, id: i64) -> Result<Option<User>, UserStoreError> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn set_interests(
        &self,
        id: i64,
        interests: Value,
    ) -> Result<Option<User>, UserStoreError> {
        Ok(self.update(id, |user| user.interests = Some(interests)))
    }

    async fn set_favorites(
        &self,
        id: i64,
        favorites: Value,
    ) -> Result<Option<User>, UserStoreError> {
        Ok(self.update(id, |user| user.favorites = Some(favorites)))
    }
}
