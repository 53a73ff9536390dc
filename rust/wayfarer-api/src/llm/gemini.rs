//! Gemini REST client (`generativelanguage.googleapis.com`).

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{GeminiError, GenerativeModel, Part, UploadedFile};
use crate::logging::OpTimer;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct FileEnvelope {
    file: UploadedFile,
}

impl GeminiClient {
    pub fn new(
        client: Client,
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(client: Client, config: &crate::config::GeminiConfig) -> Self {
        Self::new(
            client,
            config.api_key.clone(),
            &config.model,
            &config.base_url,
        )
    }

    fn key(&self) -> Result<&str, GeminiError> {
        self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)
    }

    async fn check(response: Response) -> Result<Response, GeminiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(GeminiError::Status { status, body })
    }
}

/// Text of the first candidate, parts joined.
pub fn candidate_text(response: &Value) -> Result<String, GeminiError> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = response["promptFeedback"]["blockReason"]
                .as_str()
                .or_else(|| response["candidates"][0]["finishReason"].as_str())
                .unwrap_or("no candidates");
            GeminiError::Empty(reason.to_string())
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<String>())
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, GeminiError> {
        let key = self.key()?;
        let timer = OpTimer::new("gemini", "generate_content");
        let body = json!({ "contents": [{ "role": "user", "parts": parts }] });

        let result: Result<String, GeminiError> = async {
            let response: Value = Self::check(
                self.client
                    .post(format!(
                        "{}/v1beta/models/{}:generateContent",
                        self.base_url, self.model
                    ))
                    .query(&[("key", key)])
                    .json(&body)
                    .send()
                    .await?,
            )
            .await?
            .json()
            .await?;
            candidate_text(&response)
        }
        .await;

        timer.finish_with_result(&result);
        result
    }

    /// Resumable upload: a metadata request returns the upload URL, then the
    /// bytes are sent and finalized in one request.
    async fn upload_file(
        &self,
        bytes: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile, GeminiError> {
        let key = self.key()?;
        let timer = OpTimer::new("gemini", "upload_file");

        let result: Result<UploadedFile, GeminiError> = async {
            let start = Self::check(
                self.client
                    .post(format!("{}/upload/v1beta/files", self.base_url))
                    .query(&[("key", key)])
                    .header("X-Goog-Upload-Protocol", "resumable")
                    .header("X-Goog-Upload-Command", "start")
                    .header("X-Goog-Upload-Header-Content-Length", bytes.len())
                    .header("X-Goog-Upload-Header-Content-Type", mime_type)
                    .json(&json!({ "file": { "display_name": display_name } }))
                    .send()
                    .await?,
            )
            .await?;

            let upload_url = start
                .headers()
                .get("x-goog-upload-url")
                .and_then(|v| v.to_str().ok())
                .ok_or(GeminiError::Upload("an upload URL"))?
                .to_string();

            let envelope: FileEnvelope = Self::check(
                self.client
                    .post(upload_url)
                    .header("X-Goog-Upload-Offset", "0")
                    .header("X-Goog-Upload-Command", "upload, finalize")
                    .header(reqwest::header::CONTENT_TYPE, mime_type)
                    .body(bytes)
                    .send()
                    .await?,
            )
            .await?
            .json()
            .await?;
            Ok(envelope.file)
        }
        .await;

        timer.finish_with_result(&result);
        result
    }

    async fn get_file(&self, name: &str) -> Result<UploadedFile, GeminiError> {
        let key = self.key()?;
        let file = Self::check(
            self.client
                .get(format!("{}/v1beta/{name}", self.base_url))
                .query(&[("key", key)])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        Ok(file)
    }

    async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
        let key = self.key()?;
        Self::check(
            self.client
                .delete(format!("{}/v1beta/{name}", self.base_url))
                .query(&[("key", key)])
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}
