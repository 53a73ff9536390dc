//! User profiles: upsert by phone number, stub OTP check, interests and
//! favorites.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::InMemoryUserRepository;
#[cfg(feature = "database")]
pub use postgres::PgUserRepository;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::{ApiError, TaggedError, require_fields};

/// OTP accepted by `/verify-otp`. There is no real one-time password yet.
pub const STUB_OTP: &str = "123456";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-update-user", post(create_update_user))
        .route("/verify-otp", post(verify_otp))
        .route("/update-interests", post(update_interests))
        .route("/update-favorites", post(update_favorites))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub phone_no: String,
    pub interests: Option<Value>,
    pub favorites: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for UserStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Database(other),
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync + std::fmt::Debug {
    fn backend_name(&self) -> &'static str;

    /// Create the user, or rename the one already holding `phone_no`.
    async fn upsert_by_phone(
        &self,
        name: &str,
        phone_no: &str,
    ) -> Result<(User, UpsertOutcome), UserStoreError>;

    async fn find(&self, id: i64) -> Result<Option<User>, UserStoreError>;

    async fn set_interests(&self, id: i64, interests: Value)
    -> Result<Option<User>, UserStoreError>;

    async fn set_favorites(&self, id: i64, favorites: Value)
    -> Result<Option<User>, UserStoreError>;
}

fn user_payload(user: &User, message: &str) -> Value {
    json!({
        "status": "true",
        "message": message,
        "user_id": user.id,
        "user_name": user.name,
        "user_interests": user.interests,
        "user_favorites": user.favorites,
        "user_phone_no": user.phone_no,
    })
}

/// Strings and numbers are accepted as ids.
fn parse_user_id(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Text view for the required-field check: empty collections count as absent.
fn presence(value: &Value) -> Option<&str> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.as_str()),
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        _ => Some("present"),
    }
}

fn repository(state: &AppState) -> Result<&Arc<dyn UserRepository>, ApiError> {
    state
        .users
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("User store is not configured"))
}

fn user_not_found() -> ApiError {
    ApiError::not_found("User not found")
}

fn store_error(err: UserStoreError) -> ApiError {
    match err {
        UserStoreError::Unavailable(_) => ApiError::unavailable(err.to_string()),
        #[cfg(feature = "database")]
        UserStoreError::Database(_) => ApiError::upstream("User store request failed", err),
    }
}

fn read_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(body)
}

fn user_id(body: &Value) -> Result<i64, ApiError> {
    parse_user_id(&body["user_id"])
        .ok_or_else(|| ApiError::bad_request(format!("Invalid user_id: {}", body["user_id"])))
}

async fn create_update_user(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), TaggedError> {
    let failed = |e: ApiError| e.tagged("false");
    let users = repository(&state).map_err(failed)?;
    let body = read_body(body).map_err(failed)?;
    let name = body["user_name"].as_str();
    let phone_no = body["phone_no"].as_str();
    require_fields(&[("user_name", name), ("phone_no", phone_no)]).map_err(failed)?;

    let (user, outcome) = users
        .upsert_by_phone(name.unwrap_or_default().trim(), phone_no.unwrap_or_default().trim())
        .await
        .map_err(|e| failed(store_error(e)))?;

    let (status, message) = match outcome {
        UpsertOutcome::Created => (StatusCode::CREATED, "User created successfully"),
        UpsertOutcome::Updated => (StatusCode::OK, "User already exists. Updated successfully"),
    };
    tracing::info!(user_id = user.id, ?outcome, "Upserted user");

    let mut payload = user_payload(&user, message);
    payload["otp"] = json!(STUB_OTP);
    Ok((status, Json(payload)))
}

async fn verify_otp(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TaggedError> {
    let failed = |e: ApiError| e.tagged("false");
    let users = repository(&state).map_err(failed)?;
    let body = read_body(body).map_err(failed)?;
    let otp = match &body["otp"] {
        Value::Number(n) => Some(n.to_string()),
        other => other.as_str().map(str::to_string),
    };
    require_fields(&[
        ("user_id", presence(&body["user_id"])),
        ("otp", otp.as_deref()),
    ])
    .map_err(failed)?;
    let id = user_id(&body).map_err(failed)?;

    let user = users
        .find(id)
        .await
        .map_err(|e| failed(store_error(e)))?
        .ok_or_else(|| failed(user_not_found()))?;

    if otp.as_deref().map(str::trim) != Some(STUB_OTP) {
        return Err(failed(ApiError::bad_request("Invalid OTP")));
    }
    Ok(Json(user_payload(&user, "OTP verified successfully")))
}

async fn update_interests(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TaggedError> {
    let failed = |e: ApiError| e.tagged("false");
    let users = repository(&state).map_err(failed)?;
    let body = read_body(body).map_err(failed)?;
    require_fields(&[
        ("user_id", presence(&body["user_id"])),
        ("user_interest", presence(&body["user_interest"])),
    ])
    .map_err(failed)?;
    let id = user_id(&body).map_err(failed)?;

    let user = users
        .set_interests(id, body["user_interest"].clone())
        .await
        .map_err(|e| failed(store_error(e)))?
        .ok_or_else(|| failed(user_not_found()))?;
    Ok(Json(user_payload(&user, "User Interest Updated successfully")))
}

async fn update_favorites(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TaggedError> {
    let failed = |e: ApiError| e.tagged("false");
    let users = repository(&state).map_err(failed)?;
    let body = read_body(body).map_err(failed)?;
    require_fields(&[
        ("user_id", presence(&body["user_id"])),
        ("user_favorites", presence(&body["user_favorites"])),
    ])
    .map_err(failed)?;
    let id = user_id(&body).map_err(failed)?;

    let user = users
        .set_favorites(id, body["user_favorites"].clone())
        .await
        .map_err(|e| failed(store_error(e)))?
        .ok_or_else(|| failed(user_not_found()))?;
    Ok(Json(user_payload(&user, "User Favorites Updated successfully")))
}
