//! Vertex AI reasoning-engine `:streamQuery` client.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Value, json};

use super::{AgentEngine, EngineError, EventStream};
use crate::auth::GoogleAuth;
use crate::session::Event;

/// Streams agent events from a deployed reasoning engine.
#[derive(Debug, Clone)]
pub struct ReasoningEngineClient {
    client: Client,
    auth: GoogleAuth,
    base_url_override: Option<String>,
}

impl ReasoningEngineClient {
    pub fn new(client: Client, auth: GoogleAuth, base_url: Option<String>) -> Self {
        Self {
            client,
            auth,
            base_url_override: base_url,
        }
    }

    fn query_url(&self, resource: &str) -> String {
        let base = self.base_url_override.clone().unwrap_or_else(|| {
            let location = location_of(resource).unwrap_or("us-central1");
            format!("https://{location}-aiplatform.googleapis.com")
        });
        format!("{}/v1/{resource}:streamQuery", base.trim_end_matches('/'))
    }
}

/// `projects/p/locations/{l}/reasoningEngines/r` -> `l`.
fn location_of(resource: &str) -> Option<&str> {
    let mut segments = resource.split('/');
    segments.by_ref().find(|s| *s == "locations")?;
    segments.next()
}

/// Decode one line of the stream. Blank lines and SSE comments yield `None`.
pub fn decode_line(line: &str) -> Option<Result<Event, EngineError>> {
    let line = line.trim();
    let payload = line.strip_prefix("data:").map_or(line, str::trim_start);
    if payload.is_empty() || payload.starts_with(':') {
        return None;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => return Some(Err(EngineError::Decode(format!("{e}: {payload}")))),
    };

    if let Some(error) = value.get("error") {
        return Some(Err(EngineError::Decode(error.to_string())));
    }

    Some(serde_json::from_value(value).map_err(|e| EngineError::Decode(e.to_string())))
}

#[async_trait]
impl AgentEngine for ReasoningEngineClient {
    async fn stream_query(
        &self,
        resource: &str,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<EventStream, EngineError> {
        let token = self.auth.token().await?;

        tracing::debug!(resource, user_id, session_id, "Streaming agent query");

        let response = self
            .client
            .post(self.query_url(resource))
            .bearer_auth(&token)
            .json(&json!({
                "class_method": "async_stream_query",
                "input": {
                    "user_id": user_id,
                    "session_id": session_id,
                    "message": message,
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status { status, body });
        }

        let bytes = response.bytes_stream();

        let events = async_stream::stream! {
            // Byte buffer so multi-byte characters split across chunks survive.
            let mut buffer: Vec<u8> = Vec::new();
            futures::pin_mut!(bytes);

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(EngineError::Http(e));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(item) = decode_line(&String::from_utf8_lossy(&line)) {
                        yield item;
                    }
                }
            }

            if let Some(item) = decode_line(&String::from_utf8_lossy(&buffer)) {
                yield item;
            }
        };

        Ok(Box::pin(events))
    }
}
