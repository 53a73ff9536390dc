//! Agent session and event model.
//!
//! Events arrive in two spellings: snake_case from the reasoning-engine
//! stream and camelCase from the Vertex AI sessions REST API. Both
//! deserialize into the same types; fields this service does not interpret
//! are kept in `extra` so they survive a round trip back to the client.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A conversation container scoped to (application, user).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, alias = "appName")]
    pub app_name: String,
    #[serde(default, alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub events: Vec<Event>,
    /// Seconds since the Unix epoch.
    #[serde(default, alias = "lastUpdateTime", deserialize_with = "de_timestamp")]
    pub last_update_time: f64,
}

/// One agent turn or tool interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, alias = "invocationId", skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default, deserialize_with = "de_timestamp")]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<EventActions>,
    #[serde(default, alias = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, alias = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, alias = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
    #[serde(default, alias = "functionResponse", skip_serializing_if = "Option::is_none")]
    pub function_response: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    #[serde(default, alias = "stateDelta")]
    pub state_delta: Map<String, Value>,
    #[serde(default, alias = "artifactDelta")]
    pub artifact_delta: Map<String, Value>,
    #[serde(default, alias = "skipSummarization", skip_serializing_if = "Option::is_none")]
    pub skip_summarization: Option<bool>,
    #[serde(
        default,
        alias = "transferToAgent",
        alias = "transferAgent",
        skip_serializing_if = "Option::is_none"
    )]
    pub transfer_to_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Part {
    /// Plain text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

impl Event {
    /// Convenience constructor used by in-memory collaborators and tests.
    pub fn text(author: impl Into<String>, text: impl Into<String>, timestamp: f64) -> Self {
        let author = author.into();
        let role = if author == "user" { "user" } else { "model" };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author,
            timestamp,
            content: Some(Content {
                role: Some(role.to_string()),
                parts: vec![Part::text(text)],
            }),
            ..Self::default()
        }
    }

    pub fn parts(&self) -> &[Part] {
        self.content.as_ref().map_or(&[], |c| c.parts.as_slice())
    }

    pub fn first_part(&self) -> Option<&Part> {
        self.parts().first()
    }

    /// Non-empty text parts joined with a single space, trimmed.
    pub fn joined_text(&self) -> String {
        self.parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// Seconds since the Unix epoch now.
pub fn now_secs() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// Convert an RFC 3339 timestamp to fractional seconds.
pub fn rfc3339_to_secs(raw: &str) -> Option<f64> {
    let parsed = chrono::DateTime::parse_from_rfc3339(raw).ok()?;
    Some(parsed.timestamp() as f64 + f64::from(parsed.timestamp_subsec_micros()) / 1_000_000.0)
}

/// Accepts a number, a numeric string, or an RFC 3339 string.
fn de_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => s
            .parse::<f64>()
            .ok()
            .or_else(|| rfc3339_to_secs(&s))
            .unwrap_or_default(),
        _ => 0.0,
    })
}
