//! In-process [`GenerativeModel`] that replays canned answers.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{FileState, GeminiError, GenerativeModel, Part, UploadedFile};

#[derive(Debug, Default)]
struct Recorded {
    prompts: Vec<Vec<Part>>,
    uploads: Vec<(String, usize)>,
    deleted: Vec<String>,
    checks_left: u32,
}

/// Answers are returned in order; the last one repeats.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    answers: Mutex<VecDeque<String>>,
    failure: Option<String>,
    processing_checks: u32,
    recorded: Mutex<Recorded>,
}

impl ScriptedModel {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Every generation fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Uploaded files report `PROCESSING` for this many status checks.
    pub fn with_processing_checks(mut self, checks: u32) -> Self {
        self.processing_checks = checks;
        self
    }

    pub fn prompts(&self) -> Vec<Vec<Part>> {
        self.recorded.lock().prompts.clone()
    }

    /// `(display name, byte length)` per upload.
    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.recorded.lock().uploads.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.recorded.lock().deleted.clone()
    }

    fn file(&self, index: usize, state: FileState, mime_type: &str) -> UploadedFile {
        UploadedFile {
            name: format!("files/scripted-{index}"),
            uri: format!("https://files.invalid/scripted-{index}"),
            mime_type: Some(mime_type.to_string()),
            state,
        }
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, GeminiError> {
        self.recorded.lock().prompts.push(parts);
        if let Some(ref message) = self.failure {
            return Err(GeminiError::Status {
                status: 500,
                body: message.clone(),
            });
        }

        let mut answers = self.answers.lock();
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };
        answer.ok_or_else(|| GeminiError::Empty("no scripted answer".to_string()))
    }

    async fn upload_file(
        &self,
        bytes: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile, GeminiError> {
        let mut recorded = self.recorded.lock();
        recorded.uploads.push((display_name.to_string(), bytes.len()));
        recorded.checks_left = self.processing_checks;
        let state = if self.processing_checks > 0 {
            FileState::Processing
        } else {
            FileState::Active
        };
        Ok(self.file(recorded.uploads.len(), state, mime_type))
    }

    async fn get_file(&self, name: &str) -> Result<UploadedFile, GeminiError> {
        let mut recorded = self.recorded.lock();
        recorded.checks_left = recorded.checks_left.saturating_sub(1);
        let state = if recorded.checks_left > 0 {
            FileState::Processing
        } else {
            FileState::Active
        };
        Ok(UploadedFile {
            name: name.to_string(),
            uri: format!("https://files.invalid/{name}"),
            mime_type: None,
            state,
        })
    }

    async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
        self.recorded.lock().deleted.push(name.to_string());
        Ok(())
    }
}
