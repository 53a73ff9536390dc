//! Conversation history shaping for the mobile client.
//!
//! Turns the raw event log of a [`Session`] into an ordered list of chat
//! bubbles. Everything here is pure; nothing touches the network.

use std::cmp::Ordering;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Value, json};

use crate::session::{Event, Session};

/// Status reported for every session returned by the history endpoint.
pub const SESSION_STATUS_RETRIEVED: &str = "retrieved";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    System,
}

impl Sender {
    pub fn from_author(author: &str) -> Self {
        match author {
            "user" => Self::User,
            "manager" | "assistant" | "model" | "system" => Self::Assistant,
            _ => Self::System,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    pub id: String,
    pub sender: Sender,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRecord {
    pub session_id: String,
    pub user_id: String,
    pub session_status: String,
    pub last_updated: String,
    pub total_messages: usize,
    pub conversation: Vec<ConversationMessage>,
}

/// Parse a session's events into an ordered conversation.
pub fn parse_session(session: &Session) -> ConversationRecord {
    let mut messages: Vec<(f64, ConversationMessage)> = session
        .events
        .iter()
        .filter_map(|event| {
            let message = event.joined_text();
            if message.is_empty() {
                return None;
            }
            Some((
                event.timestamp,
                ConversationMessage {
                    id: event.id.clone(),
                    sender: Sender::from_author(&event.author),
                    message,
                    timestamp: format_timestamp(event.timestamp),
                },
            ))
        })
        .collect();

    // sort_by is stable: equal timestamps keep their event order
    messages.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let conversation: Vec<ConversationMessage> = messages.into_iter().map(|(_, m)| m).collect();

    ConversationRecord {
        session_id: session.id.clone(),
        user_id: session.user_id.clone(),
        session_status: SESSION_STATUS_RETRIEVED.to_string(),
        last_updated: session.last_update_time.to_string(),
        total_messages: conversation.len(),
        conversation,
    }
}

/// Server-local `YYYY-MM-DD HH:MM:SS`, or the raw number when it is not a
/// representable instant.
pub fn format_timestamp(raw: f64) -> String {
    to_datetime(raw).map_or_else(
        || raw.to_string(),
        |dt| dt.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string(),
    )
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "range checked before casting"
)]
fn to_datetime(raw: f64) -> Option<DateTime<chrono::Utc>> {
    if !raw.is_finite() {
        return None;
    }
    let secs = raw.floor();
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return None;
    }
    let nanos = ((raw - secs) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
}

/// Wrap a parsed conversation in the envelope the mobile client expects.
pub fn mobile_response(session: &Session) -> Value {
    let record = parse_session(session);
    json!({
        "status": "success",
        "message": "Conversation history retrieved successfully",
        "data": {
            "session_info": {
                "session_id": record.session_id,
                "user_id": record.user_id,
                "status": record.session_status,
                "last_updated": record.last_updated,
                "message_count": record.total_messages,
            },
            "conversation_history": record.conversation,
        }
    })
}

/// The first non-empty text part of the user's messages, trimmed.
pub fn first_user_question(events: &[Event]) -> Option<String> {
    events
        .iter()
        .filter(|e| e.author == "user")
        .flat_map(Event::parts)
        .find_map(|p| p.text.as_deref().map(str::trim).filter(|t| !t.is_empty()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Content, Part};

    fn session(events: Vec<Event>) -> Session {
        Session {
            id: "s1".to_string(),
            app_name: "engine".to_string(),
            user_id: "u1".to_string(),
            last_update_time: 1_753_561_200.0,
            events,
            ..Session::default()
        }
    }

    #[test]
    fn test_orders_and_maps_senders() {
        let record = parse_session(&session(vec![
            Event::text("trip_manager", "Sure, when?", 20.0),
            Event::text("user", "Plan a trip to Ooty", 10.0),
            Event::text("place_analyst", "Found places", 30.0),
            Event::text("model", "Here you go", 40.0),
        ]));

        let senders: Vec<Sender> = record.conversation.iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            vec![Sender::User, Sender::System, Sender::System, Sender::Assistant]
        );
        assert_eq!(record.conversation[0].message, "Plan a trip to Ooty");
        assert_eq!(record.total_messages, 4);
        assert_eq!(record.session_status, "retrieved");
    }

    #[test]
    fn test_drops_messages_without_text() {
        let tool_call = Event {
            author: "trip_manager".to_string(),
            timestamp: 5.0,
            content: Some(Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    function_call: Some(json!({"name": "get_current_time"})),
                    ..Part::default()
                }],
            }),
            ..Event::default()
        };
        let blank = Event::text("user", "   ", 6.0);

        let record = parse_session(&session(vec![tool_call, blank, Event::text("user", "hi", 7.0)]));
        assert_eq!(record.total_messages, 1);
        assert_eq!(record.conversation[0].message, "hi");
    }

    #[test]
    fn test_equal_timestamps_keep_event_order() {
        let record = parse_session(&session(vec![
            Event::text("user", "first", 10.0),
            Event::text("model", "second", 10.0),
            Event::text("user", "third", 10.0),
        ]));
        let texts: Vec<&str> = record.conversation.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_timestamp_format() {
        let formatted = format_timestamp(1_753_561_170.798_229);
        let expected = DateTime::from_timestamp(1_753_561_170, 0)
            .unwrap()
            .with_timezone(&Local)
            .format(TIMESTAMP_FORMAT)
            .to_string();
        assert_eq!(formatted, expected);
    }

    #[test]
    fn test_unrepresentable_timestamp_falls_back_to_raw() {
        assert_eq!(format_timestamp(f64::NAN), "NaN");
        assert_eq!(format_timestamp(1e300), 1e300_f64.to_string());
    }

    #[test]
    fn test_mobile_response_envelope() {
        let value = mobile_response(&session(vec![Event::text("user", "hi", 10.0)]));
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "Conversation history retrieved successfully");
        assert_eq!(value["data"]["session_info"]["session_id"], "s1");
        assert_eq!(value["data"]["session_info"]["message_count"], 1);
        assert_eq!(value["data"]["session_info"]["status"], "retrieved");
        assert_eq!(value["data"]["conversation_history"][0]["sender"], "user");
        assert!(value["data"]["conversation_history"][0].get("raw_timestamp").is_none());
    }

    #[test]
    fn test_first_user_question() {
        let events = vec![
            Event::text("trip_manager", "Hello!", 1.0),
            Event::text("user", "  ", 2.0),
            Event::text("user", " Plan a 3-day trip to Ooty ", 3.0),
            Event::text("user", "second question", 4.0),
        ];
        assert_eq!(
            first_user_question(&events).as_deref(),
            Some("Plan a 3-day trip to Ooty")
        );
        assert!(first_user_question(&[]).is_none());
    }

    #[test]
    fn test_first_user_question_takes_first_part_only() {
        let event = Event {
            author: "user".to_string(),
            content: Some(Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::text(" "),
                    Part::text(" Weekend in Munnar "),
                    Part::text("with kids"),
                ],
            }),
            ..Event::default()
        };
        assert_eq!(
            first_user_question(&[event]).as_deref(),
            Some("Weekend in Munnar")
        );
    }
}
