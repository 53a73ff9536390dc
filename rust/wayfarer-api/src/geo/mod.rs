//! Coordinates, routes and destination weather.

pub mod maps;
pub mod weather;

pub use maps::{MapsClient, MapsError, PlaceMatch, RouteInfo, TravelMode};
pub use weather::{WeatherInfo, WeatherService};

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, FixedOffset, Local, Offset, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;

/// India Standard Time, UTC+05:30.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/coordinates", axum::routing::post(coordinates_post))
        .route("/coordinates/geocoding", get(coordinates_geocoding))
        .route("/coordinates/places", get(coordinates_places))
        .route("/coordinates/both", get(coordinates_both))
        .route("/travel-plan", get(travel_plan_get).post(travel_plan_post))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupApi {
    Geocoding,
    Places,
}

impl LookupApi {
    /// `"geocoding"` (any case) selects geocoding; anything else uses Places.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("geocoding") {
            Self::Geocoding
        } else {
            Self::Places
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Geocoding => "Geocoding API",
            Self::Places => "Places API",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateResponse {
    pub place_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: String,
    pub place_id: Option<String>,
    pub api_used: &'static str,
}

fn maps_error(context: &str, err: MapsError) -> ApiError {
    match err {
        MapsError::Status { ref status, .. } => {
            ApiError::not_found(format!("{context} not found. API Status: {status}"))
        }
        MapsError::MissingKey(_) => ApiError::unavailable(err.to_string()),
        MapsError::Http(_) => ApiError::upstream(format!("{context} lookup failed"), err),
    }
}

async fn lookup(
    maps: &MapsClient,
    place_name: &str,
    api: LookupApi,
) -> Result<CoordinateResponse, ApiError> {
    let found = match api {
        LookupApi::Geocoding => maps.geocode(place_name).await,
        LookupApi::Places => maps.text_search(place_name).await,
    }
    .map_err(|e| maps_error("Location", e))?;

    Ok(CoordinateResponse {
        place_name: place_name.to_string(),
        latitude: found.latitude,
        longitude: found.longitude,
        formatted_address: found.formatted_address,
        place_id: found.place_id,
        api_used: api.label(),
    })
}

#[derive(Debug, Deserialize)]
struct PlaceQuery {
    place_name: Option<String>,
}

fn place_name(query: Result<Query<PlaceQuery>, QueryRejection>) -> Result<String, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    query
        .place_name
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required fields: place_name"))
}

async fn coordinates_geocoding(
    State(state): State<AppState>,
    query: Result<Query<PlaceQuery>, QueryRejection>,
) -> Result<Json<CoordinateResponse>, ApiError> {
    let place = place_name(query)?;
    Ok(Json(lookup(&state.maps, &place, LookupApi::Geocoding).await?))
}

async fn coordinates_places(
    State(state): State<AppState>,
    query: Result<Query<PlaceQuery>, QueryRejection>,
) -> Result<Json<CoordinateResponse>, ApiError> {
    let place = place_name(query)?;
    Ok(Json(lookup(&state.maps, &place, LookupApi::Places).await?))
}

/// Both lookups side by side; each failure is reported in place.
async fn coordinates_both(
    State(state): State<AppState>,
    query: Result<Query<PlaceQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let place = place_name(query)?;
    let (geocoding, places) = tokio::join!(
        lookup(&state.maps, &place, LookupApi::Geocoding),
        lookup(&state.maps, &place, LookupApi::Places),
    );
    let render = |result: Result<CoordinateResponse, ApiError>| match result {
        Ok(found) => json!(found),
        Err(e) => json!({ "error": e.to_string() }),
    };
    Ok(Json(json!({
        "geocoding": render(geocoding),
        "places": render(places),
    })))
}

#[derive(Debug, Deserialize)]
struct PlaceRequest {
    place_name: Option<String>,
    #[serde(default)]
    api_type: Option<String>,
}

async fn coordinates_post(
    State(state): State<AppState>,
    body: Result<Json<PlaceRequest>, JsonRejection>,
) -> Result<Json<CoordinateResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let place = request
        .place_name
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required fields: place_name"))?;
    let api = LookupApi::parse(request.api_type.as_deref().unwrap_or("places"));
    Ok(Json(lookup(&state.maps, &place, api).await?))
}

#[derive(Debug, Deserialize)]
pub struct TravelPlanRequest {
    pub source_lat: f64,
    pub source_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
    #[serde(default = "default_travel_mode")]
    pub travel_mode: String,
}

fn default_travel_mode() -> String {
    "DRIVE".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelPlanResponse {
    pub estimated_time: String,
    pub weather_summary: String,
}

/// `now` plus the trip, formatted without zone.
pub fn arrival_time<Tz: TimeZone>(now: DateTime<Tz>, duration_seconds: i64) -> String
where
    Tz::Offset: std::fmt::Display,
{
    (now + TimeDelta::seconds(duration_seconds))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn ist_now() -> DateTime<FixedOffset> {
    let ist = FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&ist)
}

#[derive(Debug, Clone, Copy)]
enum ArrivalClock {
    Ist,
    Local,
}

async fn travel_plan(
    state: &AppState,
    request: TravelPlanRequest,
    clock: ArrivalClock,
) -> Result<TravelPlanResponse, ApiError> {
    let route = state
        .maps
        .compute_route(
            (request.source_lat, request.source_lng),
            (request.dest_lat, request.dest_lng),
            TravelMode::parse(&request.travel_mode),
        )
        .await
        .map_err(|e| maps_error("Route", e))?;

    let weather = state.weather.current(request.dest_lat, request.dest_lng).await;

    let estimated_time = match clock {
        ArrivalClock::Ist => format!("{} IST", arrival_time(ist_now(), route.duration_seconds)),
        ArrivalClock::Local => arrival_time(Local::now(), route.duration_seconds),
    };
    tracing::debug!(
        duration = %route.duration_text,
        distance = %route.distance_text,
        %estimated_time,
        "Computed travel plan"
    );

    let weather_summary =
        weather::summarize(state.model.as_ref(), &weather, &estimated_time).await;
    Ok(TravelPlanResponse {
        estimated_time,
        weather_summary,
    })
}

/// Arrival reported in IST whatever the server zone.
async fn travel_plan_get(
    State(state): State<AppState>,
    query: Result<Query<TravelPlanRequest>, QueryRejection>,
) -> Result<Json<TravelPlanResponse>, ApiError> {
    let Query(request) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(travel_plan(&state, request, ArrivalClock::Ist).await?))
}

/// Arrival reported in server-local time.
async fn travel_plan_post(
    State(state): State<AppState>,
    body: Result<Json<TravelPlanRequest>, JsonRejection>,
) -> Result<Json<TravelPlanResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(travel_plan(&state, request, ArrivalClock::Local).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_api_parse() {
        assert_eq!(LookupApi::parse("Geocoding"), LookupApi::Geocoding);
        assert_eq!(LookupApi::parse("places"), LookupApi::Places);
        assert_eq!(LookupApi::parse("other"), LookupApi::Places);
    }

    #[test]
    fn test_arrival_time_in_ist() {
        let ist = FixedOffset::east_opt(IST_OFFSET_SECS).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap().with_timezone(&ist);
        // 20:00 UTC is 01:30 IST the next day; plus 1h 45m
        assert_eq!(arrival_time(now, 6300), "2025-03-02 03:15:00");
    }

    #[test]
    fn test_maps_error_mapping() {
        let not_found = maps_error(
            "Location",
            MapsError::Status {
                status: "ZERO_RESULTS".to_string(),
                message: None,
            },
        );
        assert_eq!(not_found.to_string(), "Location not found. API Status: ZERO_RESULTS");
        assert_eq!(not_found.status_code(), axum::http::StatusCode::NOT_FOUND);

        let missing = maps_error("Route", MapsError::MissingKey("GOOGLE_API_KEY"));
        assert_eq!(missing.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
