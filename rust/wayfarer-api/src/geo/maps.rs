//! Google Maps Platform client: Geocoding, Places text search, reverse
//! geocoding, Routes `computeRoutes` with a Distance Matrix fallback.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::logging::OpTimer;

#[derive(Debug, thiserror::Error)]
pub enum MapsError {
    #[error("{0} is not configured")]
    MissingKey(&'static str),
    #[error("Maps request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered but not with `OK`.
    #[error("API Status: {status}")]
    Status {
        status: String,
        message: Option<String>,
    },
}

impl MapsError {
    /// True when the API found nothing for the query.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

/// First match of a geocoding or text-search lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceMatch {
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: String,
    pub place_id: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TravelMode {
    #[default]
    Drive,
    Walk,
    Bicycle,
    Transit,
}

impl TravelMode {
    /// Case-insensitive; unknown modes drive.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "WALK" => Self::Walk,
            "BICYCLE" => Self::Bicycle,
            "TRANSIT" => Self::Transit,
            _ => Self::Drive,
        }
    }

    pub fn routes_name(self) -> &'static str {
        match self {
            Self::Drive => "DRIVE",
            Self::Walk => "WALK",
            Self::Bicycle => "BICYCLE",
            Self::Transit => "TRANSIT",
        }
    }

    fn matrix_name(self) -> &'static str {
        match self {
            Self::Drive => "driving",
            Self::Walk => "walking",
            Self::Bicycle => "bicycling",
            Self::Transit => "transit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInfo {
    pub duration_text: String,
    pub duration_seconds: i64,
    pub distance_text: String,
    pub distance_meters: i64,
    pub travel_mode: String,
}

/// `"{h}h {m}m"`, or `"{m}m"` under an hour.
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// `"{km:.1} km"` from a kilometre up, metres below.
pub fn format_distance(meters: i64) -> String {
    if meters >= 1000 {
        format!("{:.1} km", meters as f64 / 1000.0)
    } else {
        format!("{meters} m")
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<LookupResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    name: Option<String>,
    #[serde(default)]
    formatted_address: String,
    geometry: Geometry,
    place_id: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u64>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

impl LookupResponse {
    fn into_first(self) -> Result<LookupResult, MapsError> {
        if self.status != "OK" {
            return Err(MapsError::Status {
                status: self.status,
                message: self.error_message,
            });
        }
        self.results.into_iter().next().ok_or_else(|| MapsError::Status {
            status: "ZERO_RESULTS".to_string(),
            message: None,
        })
    }
}

impl From<LookupResult> for PlaceMatch {
    fn from(result: LookupResult) -> Self {
        Self {
            name: result.name,
            latitude: result.geometry.location.lat,
            longitude: result.geometry.location.lng,
            formatted_address: result.formatted_address,
            place_id: result.place_id,
            rating: result.rating,
            user_ratings_total: result.user_ratings_total,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapsClient {
    client: Client,
    api_key: Option<String>,
    places_api_key: Option<String>,
    maps_base_url: String,
    routes_base_url: String,
}

impl MapsClient {
    pub fn new(
        client: Client,
        api_key: Option<String>,
        places_api_key: Option<String>,
        maps_base_url: impl Into<String>,
        routes_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            places_api_key,
            maps_base_url: maps_base_url.into().trim_end_matches('/').to_string(),
            routes_base_url: routes_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(client: Client, config: &crate::config::MapsConfig) -> Self {
        Self::new(
            client,
            config.api_key.clone(),
            config.places_api_key.clone(),
            &config.maps_base_url,
            &config.routes_base_url,
        )
    }

    fn key(&self) -> Result<&str, MapsError> {
        self.api_key
            .as_deref()
            .ok_or(MapsError::MissingKey("GOOGLE_API_KEY"))
    }

    /// Places lookups prefer the dedicated key.
    fn places_key(&self) -> Result<&str, MapsError> {
        self.places_api_key
            .as_deref()
            .or(self.api_key.as_deref())
            .ok_or(MapsError::MissingKey("GOOGLE_PLACES_API_KEY"))
    }

    async fn lookup(&self, path: &str, params: &[(&str, &str)]) -> Result<LookupResult, MapsError> {
        let response: LookupResponse = self
            .client
            .get(format!("{}{path}", self.maps_base_url))
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_first()
    }

    /// Geocoding API, first result.
    pub async fn geocode(&self, address: &str) -> Result<PlaceMatch, MapsError> {
        let key = self.key()?;
        let timer = OpTimer::new("maps", "geocode");
        let result = self
            .lookup("/maps/api/geocode/json", &[("address", address), ("key", key)])
            .await
            .map(PlaceMatch::from);
        timer.finish_with_result(&result);
        result
    }

    /// Places API text search, first result.
    pub async fn text_search(&self, query: &str) -> Result<PlaceMatch, MapsError> {
        let key = self.places_key()?;
        let timer = OpTimer::new("maps", "text_search");
        let result = self
            .lookup("/maps/api/place/textsearch/json", &[("query", query), ("key", key)])
            .await
            .map(PlaceMatch::from);
        timer.finish_with_result(&result);
        result
    }

    /// Locality of the point, else the first segment of its address.
    pub async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<String, MapsError> {
        let key = self.key()?;
        let latlng = format!("{lat},{lng}");
        let result = self
            .lookup("/maps/api/geocode/json", &[("latlng", latlng.as_str()), ("key", key)])
            .await?;

        let locality = result
            .address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == "locality"))
            .map(|c| c.long_name.clone());
        Ok(locality.unwrap_or_else(|| {
            result
                .formatted_address
                .split(',')
                .next()
                .unwrap_or_default()
                .to_string()
        }))
    }

    /// Traffic-aware route, falling back to the Distance Matrix API when
    /// the Routes API fails or returns no route.
    pub async fn compute_route(
        &self,
        origin: (f64, f64),
        destination: (f64, f64),
        mode: TravelMode,
    ) -> Result<RouteInfo, MapsError> {
        let timer = OpTimer::new("maps", "compute_route");
        let result = match self.routes_api(origin, destination, mode).await {
            Ok(Some(route)) => Ok(route),
            Ok(None) => self.distance_matrix(origin, destination, mode).await,
            Err(e) => {
                tracing::warn!(error = %e, "Routes API failed, using Distance Matrix");
                self.distance_matrix(origin, destination, mode).await
            }
        };
        timer.finish_with_result(&result);
        result
    }

    async fn routes_api(
        &self,
        origin: (f64, f64),
        destination: (f64, f64),
        mode: TravelMode,
    ) -> Result<Option<RouteInfo>, MapsError> {
        let key = self.key()?;
        let waypoint = |(lat, lng): (f64, f64)| {
            json!({"location": {"latLng": {"latitude": lat, "longitude": lng}}})
        };
        let body = json!({
            "origin": waypoint(origin),
            "destination": waypoint(destination),
            "travelMode": mode.routes_name(),
            "routingPreference": "TRAFFIC_AWARE",
        });

        let data: Value = self
            .client
            .post(format!("{}/directions/v2:computeRoutes", self.routes_base_url))
            .header("X-Goog-Api-Key", key)
            .header(
                "X-Goog-FieldMask",
                "routes.duration,routes.distanceMeters,routes.travelAdvisory",
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(route) = data["routes"].get(0) else {
            return Ok(None);
        };
        let Some(duration_seconds) = route["duration"]
            .as_str()
            .and_then(|d| d.trim_end_matches('s').parse::<f64>().ok())
        else {
            return Ok(None);
        };
        let duration_seconds = duration_seconds as i64;
        let distance_meters = route["distanceMeters"].as_i64().unwrap_or(0);

        Ok(Some(RouteInfo {
            duration_text: format_duration(duration_seconds),
            duration_seconds,
            distance_text: format_distance(distance_meters),
            distance_meters,
            travel_mode: mode.routes_name().to_string(),
        }))
    }

    async fn distance_matrix(
        &self,
        origin: (f64, f64),
        destination: (f64, f64),
        mode: TravelMode,
    ) -> Result<RouteInfo, MapsError> {
        let key = self.key()?;
        let origins = format!("{},{}", origin.0, origin.1);
        let destinations = format!("{},{}", destination.0, destination.1);

        let data: Value = self
            .client
            .get(format!("{}/maps/api/distancematrix/json", self.maps_base_url))
            .query(&[
                ("origins", origins.as_str()),
                ("destinations", destinations.as_str()),
                ("mode", mode.matrix_name()),
                ("departure_time", "now"),
                ("traffic_model", "best_guess"),
                ("key", key),
            ])
            .send()
            .await?
            .json()
            .await?;

        let status = data["status"].as_str().unwrap_or("Unknown error");
        let element = &data["rows"][0]["elements"][0];
        if status != "OK" || element["status"] != "OK" {
            let status = if status == "OK" {
                element["status"].as_str().unwrap_or("Unknown error")
            } else {
                status
            };
            return Err(MapsError::Status {
                status: status.to_string(),
                message: data["error_message"].as_str().map(str::to_string),
            });
        }

        Ok(RouteInfo {
            duration_text: element["duration"]["text"].as_str().unwrap_or_default().to_string(),
            duration_seconds: element["duration"]["value"].as_i64().unwrap_or(0),
            distance_text: element["distance"]["text"].as_str().unwrap_or_default().to_string(),
            distance_meters: element["distance"]["value"].as_i64().unwrap_or(0),
            travel_mode: mode.routes_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::Server) -> MapsClient {
        MapsClient::new(
            Client::new(),
            Some("maps-key".to_string()),
            None,
            server.url(),
            server.url(),
        )
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45 * 60), "45m");
        assert_eq!(format_duration(2 * 3600 + 5 * 60 + 59), "2h 5m");
        assert_eq!(format_duration(3600), "1h 0m");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(999), "999 m");
        assert_eq!(format_distance(1000), "1.0 km");
        assert_eq!(format_distance(86_449), "86.4 km");
    }

    #[test]
    fn test_travel_mode_parse() {
        assert_eq!(TravelMode::parse("walk"), TravelMode::Walk);
        assert_eq!(TravelMode::parse("TRANSIT"), TravelMode::Transit);
        assert_eq!(TravelMode::parse("hovercraft"), TravelMode::Drive);
    }

    #[tokio::test]
    async fn test_geocode_first_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/maps/api/geocode/json")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("address".into(), "Ooty".into()),
                mockito::Matcher::UrlEncoded("key".into(), "maps-key".into()),
            ]))
            .with_body(
                json!({
                    "status": "OK",
                    "results": [{
                        "formatted_address": "Ooty, Tamil Nadu, India",
                        "geometry": {"location": {"lat": 11.41, "lng": 76.69}},
                        "place_id": "abc"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let place = client(&server).geocode("Ooty").await.unwrap();
        mock.assert_async().await;
        assert_eq!(place.latitude, 11.41);
        assert_eq!(place.place_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_zero_results_is_status_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/maps/api/place/textsearch/json")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"status": "ZERO_RESULTS", "results": []}"#)
            .create_async()
            .await;

        let err = client(&server).text_search("nowhere").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "API Status: ZERO_RESULTS");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let maps = MapsClient::new(Client::new(), None, None, "http://unused", "http://unused");
        assert!(matches!(
            maps.geocode("Ooty").await,
            Err(MapsError::MissingKey(_))
        ));
    }

    #[tokio::test]
    async fn test_reverse_geocode_prefers_locality() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/maps/api/geocode/json")
            .match_query(mockito::Matcher::UrlEncoded("latlng".into(), "11.41,76.69".into()))
            .with_body(
                json!({
                    "status": "OK",
                    "results": [{
                        "formatted_address": "Charring Cross, Ooty, India",
                        "geometry": {"location": {"lat": 11.41, "lng": 76.69}},
                        "address_components": [
                            {"long_name": "Charring Cross", "types": ["route"]},
                            {"long_name": "Ooty", "types": ["locality", "political"]}
                        ]
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let name = client(&server).reverse_geocode(11.41, 76.69).await.unwrap();
        assert_eq!(name, "Ooty");
    }

    #[tokio::test]
    async fn test_compute_route_uses_routes_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/directions/v2:computeRoutes")
            .match_header("X-Goog-Api-Key", "maps-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "travelMode": "WALK",
                "routingPreference": "TRAFFIC_AWARE"
            })))
            .with_body(r#"{"routes": [{"duration": "5400s", "distanceMeters": 86449}]}"#)
            .create_async()
            .await;

        let route = client(&server)
            .compute_route((11.0, 76.9), (11.41, 76.69), TravelMode::Walk)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(route.duration_text, "1h 30m");
        assert_eq!(route.distance_text, "86.4 km");
        assert_eq!(route.travel_mode, "WALK");
    }

    #[tokio::test]
    async fn test_compute_route_falls_back_to_distance_matrix() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/directions/v2:computeRoutes")
            .with_status(403)
            .create_async()
            .await;
        server
            .mock("GET", "/maps/api/distancematrix/json")
            .match_query(mockito::Matcher::UrlEncoded("mode".into(), "driving".into()))
            .with_body(
                json!({
                    "status": "OK",
                    "rows": [{"elements": [{
                        "status": "OK",
                        "duration": {"text": "2 hours 3 mins", "value": 7380},
                        "distance": {"text": "86.4 km", "value": 86449}
                    }]}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let route = client(&server)
            .compute_route((11.0, 76.9), (11.41, 76.69), TravelMode::Drive)
            .await
            .unwrap();
        assert_eq!(route.duration_seconds, 7380);
        assert_eq!(route.duration_text, "2 hours 3 mins");
    }
}
