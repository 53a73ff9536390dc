//! Firestore REST backend for the recent-activity index.
//!
//! Each entry is a document in the configured collection whose id is
//! [`ActivityKey::doc_id`]. Creation carries a `currentDocument.exists=false`
//! precondition, so two concurrent first visits create a single document.
//! Timestamps are set by Firestore (`REQUEST_TIME`).

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use super::{ActivityBackend, ActivityKey, QueryOrder, RecentActivity, StoreError};
use crate::auth::GoogleAuth;
use crate::logging::OpTimer;
use crate::session::model::rfc3339_to_secs;

#[derive(Debug, Clone)]
pub struct FirestoreBackend {
    client: Client,
    base_url: String,
    project_id: String,
    database: String,
    collection: String,
    auth: GoogleAuth,
}

impl FirestoreBackend {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        auth: GoogleAuth,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            database: database.into(),
            collection: collection.into(),
            auth,
        }
    }

    /// `projects/{p}/databases/{d}/documents`
    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database
        )
    }

    fn document_name(&self, key: &ActivityKey) -> String {
        format!("{}/{}/{}", self.documents_root(), self.collection, key.doc_id())
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}:{method}", self.base_url, self.documents_root())
    }

    async fn post(&self, method: &str, body: &Value) -> Result<(StatusCode, Value), StoreError> {
        let timer = OpTimer::new("firestore", method);
        let result = async {
            let token = self.auth.token().await?;
            let response = self
                .client
                .post(self.endpoint(method))
                .bearer_auth(&token)
                .json(body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
            Ok::<_, StoreError>((status, value))
        }
        .await;
        timer.finish_with_result(&result);
        result
    }

    fn access_transform(name: &str) -> Value {
        json!({
            "transform": {
                "document": name,
                "fieldTransforms": [
                    {"fieldPath": "accessed_at", "setToServerValue": "REQUEST_TIME"}
                ]
            },
            "currentDocument": {"exists": true}
        })
    }

    async fn commit(&self, writes: Vec<Value>) -> Result<(StatusCode, Value), StoreError> {
        self.post("commit", &json!({ "writes": writes })).await
    }
}

/// Upper-case gRPC status carried in a REST error body, e.g. `ALREADY_EXISTS`.
fn error_status(body: &Value) -> Option<&str> {
    let error = match body {
        Value::Array(items) => items.iter().find_map(|i| i.get("error"))?,
        other => other.get("error")?,
    };
    error.get("status").and_then(Value::as_str)
}

fn error_message(body: &Value) -> String {
    let error = match body {
        Value::Array(items) => items.iter().find_map(|i| i.get("error")),
        other => other.get("error"),
    };
    error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map_or_else(|| body.to_string(), str::to_string)
}

fn backend_error(status: StatusCode, body: &Value) -> StoreError {
    StoreError::Backend(format!("Firestore returned {status}: {}", error_message(body)))
}

/// Seconds from a Firestore value of any numeric or timestamp kind.
pub fn value_as_secs(value: &Value) -> Option<f64> {
    if let Some(ts) = value.get("timestampValue").and_then(Value::as_str) {
        return rfc3339_to_secs(ts);
    }
    if let Some(d) = value.get("doubleValue").and_then(Value::as_f64) {
        return Some(d);
    }
    value
        .get("integerValue")
        .and_then(|v| v.as_str().map_or_else(|| v.as_f64(), |s| s.parse().ok()))
}

fn string_field(fields: &Value, name: &str) -> Option<String> {
    fields
        .get(name)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

/// Decode a Firestore document resource into an index entry.
pub fn decode_document(document: &Value) -> Option<RecentActivity> {
    let name = document.get("name")?.as_str()?;
    let fields = document.get("fields")?;
    Some(RecentActivity {
        doc_id: name.rsplit('/').next()?.to_string(),
        user_id: string_field(fields, "user_id").unwrap_or_default(),
        session_id: string_field(fields, "session_id").unwrap_or_default(),
        first_question: string_field(fields, "first_question"),
        created_at: fields.get("created_at").and_then(value_as_secs),
        accessed_at: fields.get("accessed_at").and_then(value_as_secs),
    })
}

#[async_trait]
impl ActivityBackend for FirestoreBackend {
    async fn create_if_absent(
        &self,
        key: &ActivityKey,
        first_question: &str,
    ) -> Result<bool, StoreError> {
        let write = json!({
            "update": {
                "name": self.document_name(key),
                "fields": {
                    "user_id": {"stringValue": key.user_id},
                    "session_id": {"stringValue": key.session_id},
                    "first_question": {"stringValue": first_question},
                }
            },
            "updateTransforms": [
                {"fieldPath": "created_at", "setToServerValue": "REQUEST_TIME"},
                {"fieldPath": "accessed_at", "setToServerValue": "REQUEST_TIME"}
            ],
            "currentDocument": {"exists": false}
        });

        let (status, body) = self.commit(vec![write]).await?;
        if status.is_success() {
            return Ok(true);
        }
        match (status, error_status(&body)) {
            (StatusCode::CONFLICT, _) | (_, Some("ALREADY_EXISTS" | "FAILED_PRECONDITION")) => {
                Ok(false)
            }
            _ => Err(backend_error(status, &body)),
        }
    }

    async fn touch(&self, key: &ActivityKey) -> Result<bool, StoreError> {
        let (status, body) = self
            .commit(vec![Self::access_transform(&self.document_name(key))])
            .await?;
        if status.is_success() {
            return Ok(true);
        }
        match (status, error_status(&body)) {
            (StatusCode::NOT_FOUND, _) | (_, Some("NOT_FOUND" | "FAILED_PRECONDITION")) => {
                Ok(false)
            }
            _ => Err(backend_error(status, &body)),
        }
    }

    async fn touch_batch(&self, keys: &[ActivityKey]) -> Result<Vec<bool>, StoreError> {
        let names: Vec<String> = keys.iter().map(|k| self.document_name(k)).collect();
        let (status, body) = self
            .post(
                "batchGet",
                &json!({ "documents": names, "mask": {"fieldPaths": ["user_id"]} }),
            )
            .await?;
        if !status.is_success() {
            return Err(backend_error(status, &body));
        }

        let found: HashSet<&str> = body
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| item.get("found")?.get("name")?.as_str())
            .collect();
        let exists: Vec<bool> = names.iter().map(|n| found.contains(n.as_str())).collect();

        let writes: Vec<Value> = names
            .iter()
            .zip(&exists)
            .filter(|(_, e)| **e)
            .map(|(name, _)| Self::access_transform(name))
            .collect();
        if !writes.is_empty() {
            let (status, body) = self.commit(writes).await?;
            if !status.is_success() {
                return Err(backend_error(status, &body));
            }
        }

        Ok(exists)
    }

    async fn query(
        &self,
        user_id: &str,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<RecentActivity>, StoreError> {
        let mut query = json!({
            "from": [{"collectionId": self.collection}],
            "where": {
                "fieldFilter": {
                    "field": {"fieldPath": "user_id"},
                    "op": "EQUAL",
                    "value": {"stringValue": user_id}
                }
            }
        });
        if order == QueryOrder::AccessedDesc {
            query["orderBy"] = json!([
                {"field": {"fieldPath": "accessed_at"}, "direction": "DESCENDING"}
            ]);
        }
        if let Some(limit) = limit {
            query["limit"] = json!(limit);
        }

        let (status, body) = self
            .post("runQuery", &json!({ "structuredQuery": query }))
            .await?;

        if !status.is_success() || error_status(&body).is_some() {
            let message = error_message(&body);
            if message.to_lowercase().contains("index") {
                return Err(StoreError::IndexRequired(message));
            }
            return Err(backend_error(status, &body));
        }

        Ok(body
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| item.get("document"))
            .filter_map(decode_document)
            .collect())
    }

    fn name(&self) -> &'static str {
        "firestore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const ROOT: &str = "/projects/demo/databases/(default)/documents";

    fn backend(url: &str) -> FirestoreBackend {
        FirestoreBackend::new(
            Client::new(),
            url,
            "demo",
            "(default)",
            "user_recent_activities",
            GoogleAuth::fixed("token"),
        )
    }

    fn document(session: &str, accessed: &str) -> Value {
        json!({
            "document": {
                "name": format!("projects/demo/databases/(default)/documents/user_recent_activities/act-{session}"),
                "fields": {
                    "user_id": {"stringValue": "u1"},
                    "session_id": {"stringValue": session},
                    "first_question": {"stringValue": "Plan Ooty"},
                    "created_at": {"timestampValue": "2025-07-26T20:00:00Z"},
                    "accessed_at": {"timestampValue": accessed}
                }
            },
            "readTime": "2025-07-26T21:00:00Z"
        })
    }

    #[test]
    fn test_value_as_secs_kinds() {
        assert_eq!(
            value_as_secs(&json!({"timestampValue": "2025-07-26T20:19:30Z"})),
            Some(1_753_561_170.0)
        );
        assert_eq!(value_as_secs(&json!({"doubleValue": 12.5})), Some(12.5));
        assert_eq!(value_as_secs(&json!({"integerValue": "42"})), Some(42.0));
        assert_eq!(value_as_secs(&json!({"stringValue": "x"})), None);
    }

    #[tokio::test]
    async fn test_create_conflict_means_existing() {
        let mut server = mockito::Server::new_async().await;
        let commit = server
            .mock("POST", format!("{ROOT}:commit").as_str())
            .match_body(Matcher::PartialJson(json!({
                "writes": [{"currentDocument": {"exists": false}}]
            })))
            .with_status(409)
            .with_body(r#"{"error":{"code":409,"message":"Document already exists","status":"ALREADY_EXISTS"}}"#)
            .create_async()
            .await;

        let created = backend(&server.url())
            .create_if_absent(&ActivityKey::new("u1", "s1"), "Plan Ooty")
            .await
            .unwrap();

        commit.assert_async().await;
        assert!(!created);
    }

    #[tokio::test]
    async fn test_ordered_query_index_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", format!("{ROOT}:runQuery").as_str())
            .with_status(400)
            .with_body(r#"[{"error":{"code":400,"message":"The query requires an index. You can create it here: https://console.firebase.google.com/...","status":"FAILED_PRECONDITION"}}]"#)
            .create_async()
            .await;

        let err = backend(&server.url())
            .query("u1", QueryOrder::AccessedDesc, Some(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexRequired(_)));
    }

    #[tokio::test]
    async fn test_query_decodes_documents() {
        let mut server = mockito::Server::new_async().await;
        let body = json!([
            document("s2", "2025-07-26T20:30:00Z"),
            document("s1", "2025-07-26T20:10:00Z")
        ]);
        server
            .mock("POST", format!("{ROOT}:runQuery").as_str())
            .match_body(Matcher::PartialJson(json!({
                "structuredQuery": {"orderBy": [{"direction": "DESCENDING"}]}
            })))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let activities = backend(&server.url())
            .query("u1", QueryOrder::AccessedDesc, Some(10))
            .await
            .unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].session_id, "s2");
        assert_eq!(activities[0].doc_id, "act-s2");
        assert!(activities[0].accessed_at > activities[1].accessed_at);
    }

    #[tokio::test]
    async fn test_touch_batch_skips_missing_documents() {
        let mut server = mockito::Server::new_async().await;
        let store = backend(&server.url());
        let present = ActivityKey::new("u1", "s1");
        let absent = ActivityKey::new("u1", "s2");

        server
            .mock("POST", format!("{ROOT}:batchGet").as_str())
            .with_status(200)
            .with_body(
                json!([
                    {"found": {"name": store.document_name(&present), "fields": {}}},
                    {"missing": store.document_name(&absent)}
                ])
                .to_string(),
            )
            .create_async()
            .await;
        let commit = server
            .mock("POST", format!("{ROOT}:commit").as_str())
            .with_status(200)
            .with_body(r#"{"writeResults":[{}]}"#)
            .expect(1)
            .create_async()
            .await;

        let found = store.touch_batch(&[present, absent]).await.unwrap();
        commit.assert_async().await;
        assert_eq!(found, vec![true, false]);
    }
}
