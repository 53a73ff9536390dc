//! Travel lookups used by the place and itinerary agents.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::search::{SearchClient, SearchKind};
use super::{Tool, ToolDefinition, required_str};
use crate::geo::{MapsClient, MapsError};

/// Current local date and time.
#[derive(Debug)]
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "get_current_time",
            "Get the current date and time.",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn execute(&self, _arguments: &Value) -> anyhow::Result<Value> {
        let now = chrono::Local::now();
        Ok(json!({ "current_time": now.format("%Y-%m-%d %H:%M:%S").to_string() }))
    }
}

/// Latitude, longitude and formatted address through the Geocoding API.
#[derive(Debug)]
pub struct CoordinatesTool {
    maps: Arc<MapsClient>,
}

impl CoordinatesTool {
    pub fn new(maps: Arc<MapsClient>) -> Self {
        Self { maps }
    }
}

#[async_trait]
impl Tool for CoordinatesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::single_string(
            "get_coordinates",
            "Find the latitude and longitude of a location by name.",
            "location_name",
            "The location to look up, e.g. 'Ooty' or 'Eiffel Tower'.",
        )
    }

    async fn execute(&self, arguments: &Value) -> anyhow::Result<Value> {
        let location = required_str(arguments, "location_name")?;
        match self.maps.geocode(location).await {
            Ok(place) => Ok(json!({
                "latitude": place.latitude,
                "longitude": place.longitude,
                "formatted_address": place.formatted_address,
            })),
            Err(MapsError::Status { status, message }) => anyhow::bail!(
                "Geocoding API error: {status}. {}",
                message.unwrap_or_default()
            ),
            Err(e) => Err(e.into()),
        }
    }
}

/// `"{r}/5 (from {n} reviews)"`; the review count is omitted when unknown
/// and the whole value is `"Not available"` without a rating.
pub fn format_rating(rating: Option<f64>, reviews: Option<u64>) -> String {
    match (rating.filter(|r| *r > 0.0), reviews.filter(|n| *n > 0)) {
        (Some(rating), Some(reviews)) => format!("{rating}/5 (from {reviews} reviews)"),
        (Some(rating), None) => format!("{rating}/5"),
        (None, _) => "Not available".to_string(),
    }
}

/// Rating and review count through the Places text search.
#[derive(Debug)]
pub struct PlaceDetailsTool {
    maps: Arc<MapsClient>,
}

impl PlaceDetailsTool {
    pub fn new(maps: Arc<MapsClient>) -> Self {
        Self { maps }
    }
}

#[async_trait]
impl Tool for PlaceDetailsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::single_string(
            "get_place_details",
            "Look up a place with the Google Places API and return its rating and review count.",
            "place_name",
            "The place to search for, e.g. 'Ooty Botanical Gardens'.",
        )
    }

    async fn execute(&self, arguments: &Value) -> anyhow::Result<Value> {
        let place_name = required_str(arguments, "place_name")?;
        match self.maps.text_search(place_name).await {
            Ok(place) => Ok(json!({
                "rating": format_rating(place.rating, place.user_ratings_total),
            })),
            Err(MapsError::Status { status, .. }) if status == "ZERO_RESULTS" => {
                anyhow::bail!("No results found for {place_name}.")
            }
            Err(e @ MapsError::MissingKey(_)) => Err(e.into()),
            Err(e) => anyhow::bail!("The Places API request failed: {e}"),
        }
    }
}

/// Short description from the first web search result.
#[derive(Debug)]
pub struct KnowledgeGraphTool {
    search: Arc<SearchClient>,
}

impl KnowledgeGraphTool {
    pub fn new(search: Arc<SearchClient>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for KnowledgeGraphTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::single_string(
            "get_knowledge_graph_info",
            "Search the web for a short description of a tourist place.",
            "query",
            "The place to describe, e.g. 'Ooty Botanical Gardens'.",
        )
    }

    async fn execute(&self, arguments: &Value) -> anyhow::Result<Value> {
        let query = required_str(arguments, "query")?;
        let items = self.search.search(query, SearchKind::Web).await?;

        let description = match items.first() {
            Some(item) => item
                .snippet
                .as_deref()
                .unwrap_or("No description available.")
                .replace('\n', " "),
            None => format!("No information found online for '{query}'."),
        };
        Ok(json!({ "description": description }))
    }
}

/// First image result for a query.
#[derive(Debug)]
pub struct ImageSearchTool {
    search: Arc<SearchClient>,
}

impl ImageSearchTool {
    pub fn new(search: Arc<SearchClient>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for ImageSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::single_string(
            "custom_image_search",
            "Search for an image and return the URL of the first result.",
            "query",
            "The image search query, e.g. 'Eiffel Tower'.",
        )
    }

    async fn execute(&self, arguments: &Value) -> anyhow::Result<Value> {
        let query = required_str(arguments, "query")?;
        let items = self.search.search(query, SearchKind::Image).await?;
        match items.into_iter().next() {
            Some(item) => Ok(json!({ "image_url": item.link })),
            None => anyhow::bail!("No images found for {query}."),
        }
    }
}

/// Title and summary of the top three results, separated by `---` lines.
pub fn format_search_digest(items: &[super::SearchItem]) -> String {
    if items.is_empty() {
        return "No information found online.".to_string();
    }
    items
        .iter()
        .take(3)
        .map(|item| {
            format!(
                "Title: {}\nSummary: {}",
                item.title.as_deref().unwrap_or_default(),
                item.snippet.as_deref().unwrap_or_default().replace("...", "")
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Web search digest for prices, fees and names.
#[derive(Debug)]
pub struct CustomSearchTool {
    search: Arc<SearchClient>,
}

impl CustomSearchTool {
    pub fn new(search: Arc<SearchClient>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for CustomSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::single_string(
            "custom_search_tool",
            "Search the web for current information such as prices, entry fees and names.",
            "query",
            "The search query, e.g. 'Doddabetta Peak entry fee'.",
        )
    }

    async fn execute(&self, arguments: &Value) -> anyhow::Result<Value> {
        let query = required_str(arguments, "query")?;
        let items = self.search.search(query, SearchKind::Web).await?;
        Ok(json!({ "result": format_search_digest(&items) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::SearchItem;

    fn search_client(server: &mockito::Server) -> Arc<SearchClient> {
        Arc::new(SearchClient::new(
            reqwest::Client::new(),
            Some("key".to_string()),
            Some("engine".to_string()),
            format!("{}/customsearch/v1", server.url()),
        ))
    }

    #[test]
    fn test_format_rating() {
        assert_eq!(format_rating(Some(4.5), Some(1200)), "4.5/5 (from 1200 reviews)");
        assert_eq!(format_rating(Some(4.2), None), "4.2/5");
        assert_eq!(format_rating(None, Some(10)), "Not available");
        assert_eq!(format_rating(Some(0.0), Some(10)), "Not available");
    }

    #[test]
    fn test_search_digest_takes_top_three() {
        let item = |title: &str| SearchItem {
            title: Some(title.to_string()),
            snippet: Some("Entry fee Rs 30...".to_string()),
            ..SearchItem::default()
        };
        let digest = format_search_digest(&[item("A"), item("B"), item("C"), item("D")]);
        assert_eq!(digest.matches("\n---\n").count(), 2);
        assert!(digest.starts_with("Title: A\nSummary: Entry fee Rs 30"));
        assert!(!digest.contains("Title: D"));
        assert_eq!(format_search_digest(&[]), "No information found online.");
    }

    #[tokio::test]
    async fn test_knowledge_graph_uses_first_snippet() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/customsearch/v1")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"items": [{"title": "Ooty", "snippet": "Queen of\nhill stations"}]}"#)
            .create_async()
            .await;

        let tool = KnowledgeGraphTool::new(search_client(&server));
        let result = tool.execute(&json!({"query": "Ooty"})).await.unwrap();
        assert_eq!(result["description"], "Queen of hill stations");
    }

    #[tokio::test]
    async fn test_image_search_without_results_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/customsearch/v1")
            .match_query(mockito::Matcher::Any)
            .with_body("{}")
            .create_async()
            .await;

        let tool = ImageSearchTool::new(search_client(&server));
        let err = tool.execute(&json!({"query": "nothing"})).await.unwrap_err();
        assert_eq!(err.to_string(), "No images found for nothing.");
    }

    #[tokio::test]
    async fn test_place_details_rating() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/maps/api/place/textsearch/json")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "places-key".into()))
            .with_body(
                json!({
                    "status": "OK",
                    "results": [{
                        "name": "Government Botanical Garden",
                        "formatted_address": "Ooty",
                        "geometry": {"location": {"lat": 11.41, "lng": 76.71}},
                        "rating": 4.4,
                        "user_ratings_total": 52000
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let maps = MapsClient::new(
            reqwest::Client::new(),
            Some("maps-key".to_string()),
            Some("places-key".to_string()),
            server.url(),
            server.url(),
        );
        let tool = PlaceDetailsTool::new(Arc::new(maps));
        let result = tool
            .execute(&json!({"place_name": "Botanical Garden Ooty"}))
            .await
            .unwrap();
        assert_eq!(result["rating"], "4.4/5 (from 52000 reviews)");
    }
}
