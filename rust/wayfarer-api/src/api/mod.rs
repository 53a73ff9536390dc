//! HTTP API endpoints.

pub mod activities;
pub mod catalog;
pub mod health;
pub mod sessions;

use axum::Router;

use crate::AppState;

/// Every route the service answers, without middleware.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(sessions::router())
        .merge(activities::router())
        .merge(catalog::router())
        .merge(crate::users::router())
        .merge(crate::media::router())
        .merge(crate::geo::router())
        .merge(crate::traffic::router())
}
