//! Generative-model abstraction used by media analysis and travel summaries.
//!
//! [`GenerativeModel`] is the seam; [`GeminiClient`] talks to the Gemini REST
//! API and [`ScriptedModel`] replays canned answers in tests.

pub mod gemini;
pub mod scripted;

pub use gemini::GeminiClient;
pub use scripted::ScriptedModel;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,
    #[error("Gemini request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("Gemini returned no text: {0}")]
    Empty(String),
    #[error("Gemini upload did not return {0}")]
    Upload(&'static str),
    #[error("file {0} failed processing")]
    FileFailed(String),
    #[error("file {name} still processing after {attempts} checks")]
    StillProcessing { name: String, attempts: u32 },
}

/// One part of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub file_uri: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn file(file_uri: impl Into<String>, mime_type: Option<String>) -> Self {
        Self::File {
            file_data: FileData {
                mime_type,
                file_uri: file_uri.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    #[default]
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

/// A file held by the Files API.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Resource name, `files/{id}`.
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub state: FileState,
}

impl UploadedFile {
    pub fn as_part(&self) -> Part {
        Part::file(self.uri.clone(), self.mime_type.clone())
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync + std::fmt::Debug {
    /// Single-turn generation; returns the concatenated text of the first candidate.
    async fn generate(&self, parts: Vec<Part>) -> Result<String, GeminiError>;

    async fn upload_file(
        &self,
        bytes: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile, GeminiError>;

    async fn get_file(&self, name: &str) -> Result<UploadedFile, GeminiError>;

    async fn delete_file(&self, name: &str) -> Result<(), GeminiError>;
}

/// Poll until the file leaves `PROCESSING`.
pub async fn wait_until_active(
    model: &dyn GenerativeModel,
    mut file: UploadedFile,
    interval: Duration,
    max_attempts: u32,
) -> Result<UploadedFile, GeminiError> {
    let mut attempts = 0;
    loop {
        match file.state {
            FileState::Failed => return Err(GeminiError::FileFailed(file.name)),
            FileState::Processing if attempts >= max_attempts => {
                return Err(GeminiError::StillProcessing {
                    name: file.name,
                    attempts,
                });
            }
            FileState::Processing => {
                tokio::time::sleep(interval).await;
                attempts += 1;
                file = model.get_file(&file.name).await?;
            }
            FileState::Active | FileState::StateUnspecified => return Ok(file),
        }
    }
}
