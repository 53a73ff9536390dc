//! Reduces a stream of agent events into the query-agent response.
//!
//! The agents answer with a fenced JSON block (```` ```json ... ``` ````)
//! once they have a final answer. The reducer collects events until the
//! first plain-text answer appears, stops reading, and extracts either the
//! `places` array or the whole itinerary from it.

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::engine::EngineError;
use crate::session::Event;

/// What the client asked the agent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Places,
    Itineraries,
    Conversation,
}

impl QueryMode {
    /// `"places"`, `"itineraries"`; anything else is plain conversation.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("places") => Self::Places,
            Some("itineraries") => Self::Itineraries,
            _ => Self::Conversation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// Every event consumed, serialized as received.
    pub raw_parts: Vec<Value>,
    pub is_places_response: bool,
    pub places_array: Vec<Value>,
    pub is_itinerary_response: bool,
    pub itinerary_array: Value,
}

impl Default for QueryOutcome {
    fn default() -> Self {
        Self {
            raw_parts: Vec::new(),
            is_places_response: false,
            places_array: Vec::new(),
            is_itinerary_response: false,
            itinerary_array: Value::Array(Vec::new()),
        }
    }
}

/// Characters that may legally follow a backslash in a JSON string.
const JSON_ESCAPES: [char; 8] = ['"', '\\', '/', 'b', 'f', 'n', 'r', 't'];

/// Delete every backslash not followed by a valid JSON escape character
/// (`" \ / b f n r t u`). Each backslash is judged on its own.
pub fn repair_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let keep = chars
                .peek()
                .is_some_and(|next| *next == 'u' || JSON_ESCAPES.contains(next));
            if !keep {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Inner text of a ```` ```json ... ``` ```` fence, trimmed.
pub fn strip_json_fence(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.len() >= "```json```".len()
        && trimmed.starts_with("```json")
        && trimmed.ends_with("```")
    {
        Some(trimmed["```json".len()..trimmed.len() - 3].trim())
    } else {
        None
    }
}

/// Parse a fenced JSON answer after escape repair.
pub fn parse_fenced_json(text: &str) -> Option<Value> {
    let inner = strip_json_fence(text)?;
    match serde_json::from_str(&repair_escapes(inner)) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Agent answer is fenced but not valid JSON");
            None
        }
    }
}

/// True for an event whose first part is non-empty text and not a tool call.
fn is_final_answer(event: &Event) -> bool {
    event.first_part().is_some_and(|part| {
        part.function_call.is_none() && part.text.as_deref().is_some_and(|t| !t.is_empty())
    })
}

fn apply_answer(outcome: &mut QueryOutcome, text: &str, mode: QueryMode) {
    if mode == QueryMode::Conversation {
        return;
    }
    let Some(json) = parse_fenced_json(text) else {
        return;
    };

    match mode {
        QueryMode::Places => match json.get("places") {
            Some(Value::Array(places)) => {
                outcome.is_places_response = true;
                outcome.places_array.clone_from(places);
            }
            _ => tracing::warn!("Places answer has no 'places' array"),
        },
        QueryMode::Itineraries => {
            outcome.is_itinerary_response = true;
            outcome.itinerary_array = json;
        }
        QueryMode::Conversation => {}
    }
}

/// Consume `events` until the first final answer and shape the outcome.
///
/// The stream is dropped as soon as the answer is found. A stream error
/// aborts the reduction.
pub async fn reduce_stream<S>(events: S, mode: QueryMode) -> Result<QueryOutcome, EngineError>
where
    S: Stream<Item = Result<Event, EngineError>>,
{
    futures::pin_mut!(events);
    let mut accumulated: Vec<Event> = Vec::new();
    let mut outcome = QueryOutcome::default();

    while let Some(event) = events.next().await {
        accumulated.push(event?);

        let answer = accumulated
            .iter()
            .find(|e| is_final_answer(e))
            .and_then(|e| e.first_part())
            .and_then(|p| p.text.clone());

        if let Some(text) = answer {
            apply_answer(&mut outcome, &text, mode);
            break;
        }
    }

    outcome.raw_parts = accumulated
        .iter()
        .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
        .collect();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Content, Part};
    use futures::stream;
    use serde_json::json;

    fn tool_call() -> Event {
        Event {
            author: "trip_manager".to_string(),
            content: Some(Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    function_call: Some(json!({"name": "get_place_details"})),
                    ..Part::default()
                }],
            }),
            ..Event::default()
        }
    }

    fn ok_stream(events: Vec<Event>) -> impl Stream<Item = Result<Event, EngineError>> {
        stream::iter(events.into_iter().map(Ok))
    }

    #[test]
    fn test_query_mode_parse() {
        assert_eq!(QueryMode::parse(Some("places")), QueryMode::Places);
        assert_eq!(QueryMode::parse(Some("itineraries")), QueryMode::Itineraries);
        assert_eq!(QueryMode::parse(Some("chat")), QueryMode::Conversation);
        assert_eq!(QueryMode::parse(None), QueryMode::Conversation);
    }

    #[test]
    fn test_repair_escapes() {
        assert_eq!(repair_escapes(r"Ooty\'s lake"), "Ooty's lake");
        assert_eq!(repair_escapes(r#"a\"b\/d\nA\u00e9"#), r#"a\"b\/d\nA\u00e9"#);
        assert_eq!(repair_escapes(r"trailing\"), "trailing");
        // each backslash is judged alone: the second one precedes 'q'
        assert_eq!(repair_escapes(r"\\q"), r"\q");
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(strip_json_fence("  ```json{}```  "), Some("{}"));
        assert_eq!(strip_json_fence("```json"), None);
        assert_eq!(strip_json_fence("{\"a\":1}"), None);
        assert_eq!(strip_json_fence("```\n{}\n```"), None);
    }

    #[test]
    fn test_invalid_escape_is_parsed_after_cleanup() {
        let text = "```json\n{\"places\": [{\"name\": \"Ooty\\'s Lake\"}]}\n```";
        let value = parse_fenced_json(text).unwrap();
        assert_eq!(value["places"][0]["name"], "Ooty's Lake");
    }

    #[tokio::test]
    async fn test_places_answer_after_tool_calls() {
        let answer = Event::text(
            "place_analyst",
            "```json\n{\"places\": [{\"name\": \"Botanical Garden\"}, {\"name\": \"Ooty Lake\"}]}\n```",
            3.0,
        );
        let outcome = reduce_stream(ok_stream(vec![tool_call(), answer]), QueryMode::Places)
            .await
            .unwrap();

        assert!(outcome.is_places_response);
        assert_eq!(outcome.places_array.len(), 2);
        assert!(!outcome.is_itinerary_response);
        assert_eq!(outcome.raw_parts.len(), 2);
    }

    #[tokio::test]
    async fn test_itinerary_answer_surfaces_whole_object() {
        let answer = Event::text(
            "itinerary_generator_analyst",
            "```json\n{\"trip_name\": \"Ooty\", \"days\": []}\n```",
            3.0,
        );
        let outcome = reduce_stream(ok_stream(vec![answer]), QueryMode::Itineraries)
            .await
            .unwrap();

        assert!(outcome.is_itinerary_response);
        assert_eq!(outcome.itinerary_array["trip_name"], "Ooty");
    }

    #[tokio::test]
    async fn test_unfenced_answer_leaves_flags_false() {
        let answer = Event::text("trip_manager", "Which dates work for you?", 3.0);
        let outcome = reduce_stream(ok_stream(vec![answer]), QueryMode::Places)
            .await
            .unwrap();

        assert!(!outcome.is_places_response);
        assert!(outcome.places_array.is_empty());
        assert_eq!(
            outcome.raw_parts[0]["content"]["parts"][0]["text"],
            "Which dates work for you?"
        );
    }

    #[tokio::test]
    async fn test_invalid_json_keeps_raw_text() {
        let answer = Event::text("place_analyst", "```json\n{not json}\n```", 3.0);
        let outcome = reduce_stream(ok_stream(vec![answer]), QueryMode::Places)
            .await
            .unwrap();
        assert!(!outcome.is_places_response);
        assert_eq!(outcome.raw_parts.len(), 1);
    }

    #[tokio::test]
    async fn test_places_without_array_is_not_flagged() {
        let answer = Event::text("place_analyst", "```json\n{\"places\": \"none\"}\n```", 3.0);
        let outcome = reduce_stream(ok_stream(vec![answer]), QueryMode::Places)
            .await
            .unwrap();
        assert!(!outcome.is_places_response);
    }

    #[tokio::test]
    async fn test_stops_after_first_answer() {
        let events = vec![
            Event::text("trip_manager", "first answer", 1.0),
            Event::text("trip_manager", "never read", 2.0),
        ];
        let outcome = reduce_stream(ok_stream(events), QueryMode::Conversation)
            .await
            .unwrap();
        assert_eq!(outcome.raw_parts.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_aborts() {
        let events = stream::iter(vec![
            Ok(tool_call()),
            Err(EngineError::Decode("broken".to_string())),
        ]);
        let err = reduce_stream(events, QueryMode::Places).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
