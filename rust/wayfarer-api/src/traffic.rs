//! Best departure window from BigQuery traffic predictions.

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::{AuthError, GoogleAuth};
use crate::error::ApiError;
use crate::logging::OpTimer;

pub fn router() -> Router<AppState> {
    Router::new().route("/predict-traffic", post(predict_traffic))
}

#[derive(Debug, thiserror::Error)]
pub enum TrafficError {
    #[error("BigQuery request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("BigQuery returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("BigQuery job {0} did not complete")]
    Incomplete(String),
    #[error("malformed prediction row: {0}")]
    Row(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("invalid traffic function name: {0}")]
    InvalidFunction(String),
    #[error("could not obtain a Google access token: {0}")]
    Auth(AuthError),
}

impl From<AuthError> for TrafficError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotConfigured => Self::NotConfigured("GOOGLE_APPLICATION_CREDENTIALS"),
            other => Self::Auth(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TrafficRequest {
    pub source_lat: f64,
    pub source_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPrediction {
    pub departure_time: String,
    pub source_lat: f64,
    pub source_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
    pub duration_seconds: i64,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSummary {
    pub best_time: TrafficPrediction,
    pub worst_time: TrafficPrediction,
    pub time_saved_minutes: f64,
    pub total_predictions_analyzed: usize,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fastest and slowest departures. Ties keep the earliest row.
pub fn summarize(predictions: &[TrafficPrediction]) -> Option<TrafficSummary> {
    let first = predictions.first()?;
    let (mut best, mut worst) = (first, first);
    for prediction in &predictions[1..] {
        if prediction.duration_seconds < best.duration_seconds {
            best = prediction;
        }
        if prediction.duration_seconds > worst.duration_seconds {
            worst = prediction;
        }
    }

    Some(TrafficSummary {
        best_time: best.clone(),
        worst_time: worst.clone(),
        time_saved_minutes: round2((worst.duration_seconds - best.duration_seconds) as f64 / 60.0),
        total_predictions_analyzed: predictions.len(),
    })
}

/// Source of departure-time predictions for a route, ordered by departure.
#[async_trait]
pub trait TrafficWarehouse: Send + Sync + std::fmt::Debug {
    async fn predictions(&self, request: &TrafficRequest)
    -> Result<Vec<TrafficPrediction>, TrafficError>;
}

/// `jobs.query` against a table function returning a JSON array of
/// `[departure, src_lat, src_lng, dst_lat, dst_lng, seconds]` records.
#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    client: Client,
    auth: GoogleAuth,
    project_id: Option<String>,
    function: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<Row>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: Value,
}

const MAX_RESULT_POLLS: u32 = 10;

impl BigQueryWarehouse {
    pub fn new(
        client: Client,
        auth: GoogleAuth,
        project_id: Option<String>,
        function: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth,
            project_id,
            function: function.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(
        client: Client,
        auth: GoogleAuth,
        traffic: &crate::config::TrafficConfig,
        google: &crate::config::GoogleConfig,
    ) -> Self {
        Self::new(
            client,
            auth,
            traffic.project_id.clone().or_else(|| google.project_id.clone()),
            &traffic.function,
            &traffic.base_url,
        )
    }

    /// The function name is spliced into SQL, so only identifier characters
    /// are accepted.
    fn sql(&self) -> Result<String, TrafficError> {
        let valid = !self.function.is_empty()
            && self
                .function
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(TrafficError::InvalidFunction(self.function.clone()));
        }

        Ok(format!(
            r#"WITH function_result AS (
  SELECT `{function}`(@source_lat, @source_lng, @dest_lat, @dest_lng) AS json_string_result
),
parsed_data AS (
  SELECT JSON_EXTRACT_ARRAY(PARSE_JSON(json_string_result)) AS data_array
  FROM function_result
)
SELECT
  TIMESTAMP(JSON_EXTRACT_SCALAR(record, '$[0]')) AS departure_time,
  CAST(JSON_EXTRACT_SCALAR(record, '$[1]') AS FLOAT64) AS source_lat,
  CAST(JSON_EXTRACT_SCALAR(record, '$[2]') AS FLOAT64) AS source_lng,
  CAST(JSON_EXTRACT_SCALAR(record, '$[3]') AS FLOAT64) AS dest_lat,
  CAST(JSON_EXTRACT_SCALAR(record, '$[4]') AS FLOAT64) AS dest_lng,
  CAST(JSON_EXTRACT_SCALAR(record, '$[5]') AS INT64) AS duration_seconds
FROM parsed_data, UNNEST(data_array) AS record
WHERE JSON_EXTRACT_SCALAR(record, '$[5]') IS NOT NULL
ORDER BY departure_time"#,
            function = self.function
        ))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TrafficError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(TrafficError::Status { status, body })
    }
}

fn float_param(name: &str, value: f64) -> Value {
    json!({
        "name": name,
        "parameterType": { "type": "FLOAT64" },
        "parameterValue": { "value": value.to_string() },
    })
}

fn cell_f64(row: &Row, index: usize) -> Result<f64, TrafficError> {
    let cell = row.f.get(index).map(|c| &c.v).unwrap_or(&Value::Null);
    match cell {
        Value::String(s) => s.parse().map_err(|_| TrafficError::Row(format!("column {index}: {s}"))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| TrafficError::Row(format!("column {index}: {n}"))),
        other => Err(TrafficError::Row(format!("column {index}: {other}"))),
    }
}

/// TIMESTAMP cells arrive as epoch seconds in a string (`"1.695275781898007E9"`).
fn timestamp_rfc3339(epoch_secs: f64) -> Result<String, TrafficError> {
    let micros = (epoch_secs * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        .ok_or_else(|| TrafficError::Row(format!("timestamp out of range: {epoch_secs}")))
}

fn decode_row(row: &Row) -> Result<TrafficPrediction, TrafficError> {
    let duration_seconds = cell_f64(row, 5)? as i64;
    Ok(TrafficPrediction {
        departure_time: timestamp_rfc3339(cell_f64(row, 0)?)?,
        source_lat: cell_f64(row, 1)?,
        source_lng: cell_f64(row, 2)?,
        dest_lat: cell_f64(row, 3)?,
        dest_lng: cell_f64(row, 4)?,
        duration_seconds,
        duration_minutes: round2(duration_seconds as f64 / 60.0),
    })
}

#[async_trait]
impl TrafficWarehouse for BigQueryWarehouse {
    async fn predictions(
        &self,
        request: &TrafficRequest,
    ) -> Result<Vec<TrafficPrediction>, TrafficError> {
        let token = self.auth.token().await?;
        let project = self
            .project_id
            .as_deref()
            .ok_or(TrafficError::NotConfigured("GOOGLE_CLOUD_PROJECT"))?;
        let timer = OpTimer::new("bigquery", "predict_traffic");

        let result: Result<Vec<TrafficPrediction>, TrafficError> = async {
            let body = json!({
                "query": self.sql()?,
                "useLegacySql": false,
                "parameterMode": "NAMED",
                "queryParameters": [
                    float_param("source_lat", request.source_lat),
                    float_param("source_lng", request.source_lng),
                    float_param("dest_lat", request.dest_lat),
                    float_param("dest_lng", request.dest_lng),
                ],
                "timeoutMs": 30_000,
            });
            let mut page: QueryResponse = Self::check(
                self.client
                    .post(format!("{}/projects/{project}/queries", self.base_url))
                    .bearer_auth(&token)
                    .json(&body)
                    .send()
                    .await?,
            )
            .await?
            .json()
            .await?;

            let mut predictions = Vec::new();
            let mut polls = 0;
            loop {
                if page.job_complete {
                    for row in &page.rows {
                        predictions.push(decode_row(row)?);
                    }
                }

                let job = page
                    .job_reference
                    .as_ref()
                    .ok_or_else(|| TrafficError::Incomplete("<unknown>".to_string()))?;
                let next_page = page.page_token.clone().filter(|t| !t.is_empty());
                if page.job_complete && next_page.is_none() {
                    break;
                }
                polls += 1;
                if polls > MAX_RESULT_POLLS {
                    return Err(TrafficError::Incomplete(job.job_id.clone()));
                }

                let mut query = vec![("timeoutMs", "30000".to_string())];
                if let Some(ref location) = job.location {
                    query.push(("location", location.clone()));
                }
                if let Some(page_token) = next_page {
                    query.push(("pageToken", page_token));
                }
                page = Self::check(
                    self.client
                        .get(format!(
                            "{}/projects/{project}/queries/{}",
                            self.base_url, job.job_id
                        ))
                        .bearer_auth(&token)
                        .query(&query)
                        .send()
                        .await?,
                )
                .await?
                .json()
                .await?;
            }
            Ok(predictions)
        }
        .await;

        timer.finish_with_result(&result);
        result
    }
}

/// Fixed predictions for tests and offline runs.
#[derive(Debug, Default)]
pub struct ScriptedWarehouse {
    predictions: Vec<TrafficPrediction>,
    requests: Mutex<Vec<TrafficRequest>>,
}

impl ScriptedWarehouse {
    pub fn new(predictions: Vec<TrafficPrediction>) -> Self {
        Self {
            predictions,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TrafficRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TrafficWarehouse for ScriptedWarehouse {
    async fn predictions(
        &self,
        request: &TrafficRequest,
    ) -> Result<Vec<TrafficPrediction>, TrafficError> {
        self.requests.lock().push(*request);
        Ok(self.predictions.clone())
    }
}

async fn predict_traffic(
    State(state): State<AppState>,
    body: Result<Json<TrafficRequest>, JsonRejection>,
) -> Result<Json<TrafficSummary>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let predictions = state
        .traffic
        .predictions(&request)
        .await
        .map_err(|e| match e {
            TrafficError::NotConfigured(_) | TrafficError::Auth(_) => {
                ApiError::unavailable(e.to_string())
            }
            other => ApiError::upstream("Error getting traffic predictions", other),
        })?;

    summarize(&predictions)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No traffic predictions found"))
}
