//! Crop-disease analysis of an uploaded image or video, or a public URL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::routing::post;
use axum::{Form, Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::{ApiError, TaggedError};
use crate::llm::{GeminiError, GenerativeModel, Part, wait_until_active};

pub const ANALYSIS_PROMPT: &str = "Your task is to analyze this video/image and tell me the crop name and disease and its symptoms in JSON format { \"crop_name\": \"<crop_name>\", \"disease\": \"<disease_name>\", \"symptoms\": \"<symptoms>\" }";

pub const ALLOWED_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "mp4", "avi", "mov", "mkv"];

pub fn router() -> Router<AppState> {
    Router::new().route("/analyze", post(analyze))
}

/// Structured reading of the model's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub crop_name: String,
    pub disease: String,
    pub symptoms: String,
}

impl Verdict {
    fn parsing_failed(answer: &str) -> Self {
        let head: String = answer.chars().take(200).collect();
        Self {
            crop_name: "unknown".to_string(),
            disease: "parsing_failed".to_string(),
            symptoms: format!("Could not parse response: {head}..."),
        }
    }
}

/// Parse the answer, tolerating a ```` ```json ```` or bare ```` ``` ```` fence.
pub fn parse_verdict(answer: &str) -> Verdict {
    let trimmed = answer.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.split("```").next().unwrap_or_default()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.split("```").next().unwrap_or_default()
    } else {
        trimmed
    };

    let Ok(value) = serde_json::from_str::<Value>(body.trim()) else {
        return Verdict::parsing_failed(answer);
    };
    let field = |name: &str| match &value[name] {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    };
    if !value.is_object() {
        return Verdict::parsing_failed(answer);
    }
    Verdict {
        crop_name: field("crop_name"),
        disease: field("disease"),
        symptoms: field("symptoms"),
    }
}

/// Extension check, case-insensitive. Names without a dot are rejected.
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Base name reduced to ASCII letters, digits, `.`, `_` and `-`.
pub fn secure_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_matches(['.', '_']).to_string()
}

#[derive(Debug, Default)]
struct UploadedMedia {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

#[derive(Debug, Default)]
struct AnalyzeInput {
    url: Option<String>,
    file: Option<UploadedMedia>,
}

async fn read_input(state: &AppState, request: Request) -> Result<AnalyzeInput, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let mut input = AnalyzeInput::default();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let invalid = |e: axum::extract::multipart::MultipartError| {
            ApiError::bad_request(format!("Invalid multipart body: {e}"))
        };

        while let Some(field) = multipart.next_field().await.map_err(invalid)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "url" => input.url = Some(field.text().await.map_err(invalid)?),
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(invalid)?;
                    input.file = Some(UploadedMedia {
                        filename,
                        content_type,
                        bytes,
                    });
                }
                _ => {}
            }
        }
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<Value>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        input.url = body["url"].as_str().map(str::to_string);
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(mut fields) = Form::<HashMap<String, String>>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        input.url = fields.remove("url");
    }

    input.url = input.url.filter(|u| !u.trim().is_empty());
    Ok(input)
}

fn success(analysis: String, elapsed: Duration, source: &str, source_value: &str) -> Value {
    let verdict = parse_verdict(&analysis);
    json!({
        "analysis": analysis,
        "processing_time": format!("{:.2} seconds", elapsed.as_secs_f64()),
        "source": source,
        "source_value": source_value,
        "status": "success",
        "verdict": verdict,
    })
}

/// Upload, wait, generate. The uploaded file is deleted whatever happens.
async fn analyze_upload(
    model: &dyn GenerativeModel,
    media: UploadedMedia,
    display_name: &str,
    poll_interval: Duration,
    max_polls: u32,
) -> Result<String, GeminiError> {
    let mime_type = media
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let uploaded = model.upload_file(media.bytes, &mime_type, display_name).await?;
    tracing::info!(file = %uploaded.name, "Uploaded media for analysis");

    let name = uploaded.name.clone();
    let outcome: Result<String, GeminiError> = async {
        let active = wait_until_active(model, uploaded, poll_interval, max_polls).await?;
        model
            .generate(vec![active.as_part(), Part::text(ANALYSIS_PROMPT)])
            .await
    }
    .await;

    if let Err(e) = model.delete_file(&name).await {
        tracing::debug!(file = %name, error = %e, "Failed to delete uploaded media");
    }
    outcome
}

async fn analyze(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Value>, TaggedError> {
    let failed = |e: ApiError| e.tagged("failed");
    let input = read_input(&state, request).await.map_err(failed)?;
    let started = Instant::now();

    if let Some(url) = input.url {
        let analysis = state
            .model
            .generate(vec![Part::file(url.clone(), None), Part::text(ANALYSIS_PROMPT)])
            .await
            .map_err(|e| failed(ApiError::upstream("Media analysis failed", e)))?;
        return Ok(Json(success(analysis, started.elapsed(), "url", &url)));
    }

    let Some(media) = input.file else {
        return Err(failed(ApiError::bad_request("No file or URL provided")));
    };
    if media.filename.is_empty() {
        return Err(failed(ApiError::bad_request("No file selected")));
    }
    if !allowed_file(&media.filename) {
        return Err(failed(ApiError::bad_request("File type not allowed")));
    }

    let filename = secure_filename(&media.filename);
    let gemini = &state.config.gemini;
    let analysis = analyze_upload(
        state.model.as_ref(),
        media,
        &filename,
        Duration::from_millis(gemini.poll_interval_ms),
        gemini.max_poll_attempts,
    )
    .await
    .map_err(|e| failed(ApiError::upstream("Media analysis failed", e)))?;

    Ok(Json(success(analysis, started.elapsed(), "file_upload", &filename)))
}
