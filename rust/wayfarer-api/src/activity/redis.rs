//! Redis backend for the recent-activity index.
//!
//! Layout per user:
//! - `wayfarer:activity:{doc_id}`: hash with the entry fields
//! - `wayfarer:activities:{user_id}`: sorted set of session ids scored by access time
//!
//! A Lua script runs `HSETNX` on `created_at` and, when it wins, writes the
//! remaining fields and the index entry in the same call.

use std::collections::HashMap;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Script};
use async_trait::async_trait;

use super::{ActivityBackend, ActivityKey, QueryOrder, RecentActivity, StoreError};
use crate::session::model::now_secs;

/// KEYS: entry hash, user index. ARGV: now, user id, session id, question.
/// Returns 1 when this call created the entry.
const CREATE_ENTRY_LUA: &str = r#"
if redis.call('HSETNX', KEYS[1], 'created_at', ARGV[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1],
  'user_id', ARGV[2],
  'session_id', ARGV[3],
  'first_question', ARGV[4],
  'accessed_at', ARGV[1])
redis.call('ZADD', KEYS[2], ARGV[1], ARGV[3])
return 1
"#;

#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    create_entry: Script,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

fn entry_key(key: &ActivityKey) -> String {
    format!("wayfarer:activity:{}", key.doc_id())
}

fn user_index_key(user_id: &str) -> String {
    format!("wayfarer:activities:{user_id}")
}

/// Build an entry from a `HGETALL` reply. `None` when the hash is gone.
pub fn decode_hash(doc_id: String, fields: &HashMap<String, String>) -> Option<RecentActivity> {
    if fields.is_empty() {
        return None;
    }
    let secs = |name: &str| fields.get(name).and_then(|v| v.parse::<f64>().ok());
    Some(RecentActivity {
        doc_id,
        user_id: fields.get("user_id").cloned().unwrap_or_default(),
        session_id: fields.get("session_id").cloned().unwrap_or_default(),
        first_question: fields.get("first_question").cloned(),
        created_at: secs("created_at"),
        accessed_at: secs("accessed_at"),
    })
}

impl RedisBackend {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            create_entry: Script::new(CREATE_ENTRY_LUA),
        })
    }
}

#[async_trait]
impl ActivityBackend for RedisBackend {
    async fn create_if_absent(
        &self,
        key: &ActivityKey,
        first_question: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let created: i64 = self
            .create_entry
            .key(entry_key(key))
            .key(user_index_key(&key.user_id))
            .arg(now_secs())
            .arg(&key.user_id)
            .arg(&key.session_id)
            .arg(first_question)
            .invoke_async(&mut conn)
            .await?;
        Ok(created == 1)
    }

    async fn touch(&self, key: &ActivityKey) -> Result<bool, StoreError> {
        Ok(self.touch_batch(std::slice::from_ref(key)).await?[0])
    }

    async fn touch_batch(&self, keys: &[ActivityKey]) -> Result<Vec<bool>, StoreError> {
        let mut conn = self.conn.clone();

        let mut exists_pipe = ::redis::pipe();
        for key in keys {
            exists_pipe.exists(entry_key(key));
        }
        let exists: Vec<bool> = exists_pipe.query_async(&mut conn).await?;

        let now = now_secs();
        let mut write = ::redis::pipe();
        write.atomic();
        for (key, _) in keys.iter().zip(&exists).filter(|(_, e)| **e) {
            write
                .hset(entry_key(key), "accessed_at", now)
                .ignore()
                .zadd(user_index_key(&key.user_id), &key.session_id, now)
                .ignore();
        }
        if exists.iter().any(|e| *e) {
            let () = write.query_async(&mut conn).await?;
        }

        Ok(exists)
    }

    async fn query(
        &self,
        user_id: &str,
        _order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<RecentActivity>, StoreError> {
        let mut conn = self.conn.clone();
        let stop = limit.map_or(-1, |l| isize::try_from(l).unwrap_or(isize::MAX) - 1);
        if stop < -1 || limit == Some(0) {
            return Ok(Vec::new());
        }

        // The sorted set is always ordered, so both query orders are served alike.
        let sessions: Vec<String> = conn.zrevrange(user_index_key(user_id), 0, stop).await?;

        let mut pipe = ::redis::pipe();
        for session in &sessions {
            pipe.hgetall(entry_key(&ActivityKey::new(user_id, session.as_str())));
        }
        let hashes: Vec<HashMap<String, String>> = if sessions.is_empty() {
            Vec::new()
        } else {
            pipe.query_async(&mut conn).await?
        };

        Ok(sessions
            .iter()
            .zip(&hashes)
            .filter_map(|(session, fields)| {
                decode_hash(ActivityKey::new(user_id, session.as_str()).doc_id(), fields)
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
