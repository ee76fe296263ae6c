use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of events accepted in a single tracking request.
pub const MAX_EVENT_BATCH: usize = 100;

/// Maximum number of entries in an event's properties map.
pub const MAX_PROPERTIES: usize = 50;
/// Maximum length of a property key.
pub const MAX_PROPERTY_KEY_LEN: usize = 100;
/// Maximum length of a string property value.
pub const MAX_PROPERTY_VALUE_LEN: usize = 1000;

/// How far in the past a client-supplied event timestamp may lie.
const MAX_TIMESTAMP_AGE_DAYS: i64 = 30;
/// How far in the future a client-supplied event timestamp may lie.
const MAX_TIMESTAMP_SKEW_HOURS: i64 = 1;

/// The enumerated set of trackable event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pageview,
    Click,
    Conversion,
    Custom,
    FormSubmit,
    Scroll,
    Download,
    VideoPlay,
    VideoPause,
    Search,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Pageview => "pageview",
            EventType::Click => "click",
            EventType::Conversion => "conversion",
            EventType::Custom => "custom",
            EventType::FormSubmit => "form_submit",
            EventType::Scroll => "scroll",
            EventType::Download => "download",
            EventType::VideoPlay => "video_play",
            EventType::VideoPause => "video_pause",
            EventType::Search => "search",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = EventValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pageview" => Ok(EventType::Pageview),
            "click" => Ok(EventType::Click),
            "conversion" => Ok(EventType::Conversion),
            "custom" => Ok(EventType::Custom),
            "form_submit" => Ok(EventType::FormSubmit),
            "scroll" => Ok(EventType::Scroll),
            "download" => Ok(EventType::Download),
            "video_play" => Ok(EventType::VideoPlay),
            "video_pause" => Ok(EventType::VideoPause),
            "search" => Ok(EventType::Search),
            other => Err(EventValidationError::UnknownEventType {
                event_type: other.to_string(),
            }),
        }
    }
}

/// A single tracked occurrence inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session_id: Uuid,
    pub workspace_id: Uuid,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Why an event was rejected during validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventValidationError {
    #[error("unknown event type: {event_type}")]
    UnknownEventType { event_type: String },

    #[error("pageview event requires a non-empty url")]
    PageviewWithoutUrl,

    #[error("timestamp {timestamp} outside the accepted window")]
    TimestampOutOfRange { timestamp: DateTime<Utc> },

    #[error("too many properties: {count} (maximum {MAX_PROPERTIES})")]
    TooManyProperties { count: usize },

    #[error("property key exceeds {MAX_PROPERTY_KEY_LEN} characters: {key}")]
    PropertyKeyTooLong { key: String },

    #[error("property value for {key} exceeds {MAX_PROPERTY_VALUE_LEN} characters")]
    PropertyValueTooLong { key: String },
}

/// Validate a single event against the ingestion constraints.
///
/// `now` is passed in so the timestamp window is testable.
pub fn validate_event(event: &Event, now: DateTime<Utc>) -> Result<(), EventValidationError> {
    if event.event_type == EventType::Pageview
        && event.url.as_deref().map_or(true, |u| u.trim().is_empty())
    {
        return Err(EventValidationError::PageviewWithoutUrl);
    }

    let oldest = now - Duration::days(MAX_TIMESTAMP_AGE_DAYS);
    let newest = now + Duration::hours(MAX_TIMESTAMP_SKEW_HOURS);
    if event.timestamp < oldest || event.timestamp > newest {
        return Err(EventValidationError::TimestampOutOfRange {
            timestamp: event.timestamp,
        });
    }

    if event.properties.len() > MAX_PROPERTIES {
        return Err(EventValidationError::TooManyProperties {
            count: event.properties.len(),
        });
    }
    for (key, value) in &event.properties {
        if key.len() > MAX_PROPERTY_KEY_LEN {
            return Err(EventValidationError::PropertyKeyTooLong { key: key.clone() });
        }
        if let serde_json::Value::String(s) = value {
            if s.len() > MAX_PROPERTY_VALUE_LEN {
                return Err(EventValidationError::PropertyValueTooLong { key: key.clone() });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType) -> Event {
        Event {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            event_type,
            url: Some("/".into()),
            timestamp: Utc::now(),
            properties: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn event_type_snake_case_round_trip() {
        let encoded = serde_json::to_string(&EventType::FormSubmit).unwrap();
        assert_eq!(encoded, "\"form_submit\"");
        let decoded: EventType = serde_json::from_str("\"video_play\"").unwrap();
        assert_eq!(decoded, EventType::VideoPlay);
    }

    #[test]
    fn pageview_requires_url() {
        let mut e = event(EventType::Pageview);
        assert!(validate_event(&e, Utc::now()).is_ok());

        e.url = None;
        assert_eq!(
            validate_event(&e, Utc::now()),
            Err(EventValidationError::PageviewWithoutUrl)
        );

        e.url = Some("   ".into());
        assert_eq!(
            validate_event(&e, Utc::now()),
            Err(EventValidationError::PageviewWithoutUrl)
        );
    }

    #[test]
    fn click_without_url_is_fine() {
        let mut e = event(EventType::Click);
        e.url = None;
        assert!(validate_event(&e, Utc::now()).is_ok());
    }

    #[test]
    fn timestamp_window_is_enforced() {
        let now = Utc::now();

        let mut e = event(EventType::Click);
        e.timestamp = now - Duration::days(31);
        assert!(matches!(
            validate_event(&e, now),
            Err(EventValidationError::TimestampOutOfRange { .. })
        ));

        e.timestamp = now + Duration::hours(2);
        assert!(matches!(
            validate_event(&e, now),
            Err(EventValidationError::TimestampOutOfRange { .. })
        ));

        e.timestamp = now - Duration::days(29);
        assert!(validate_event(&e, now).is_ok());
    }

    #[test]
    fn property_limits_are_enforced() {
        let now = Utc::now();

        let mut e = event(EventType::Click);
        for i in 0..51 {
            e.properties
                .insert(format!("k{i}"), serde_json::json!(i));
        }
        assert!(matches!(
            validate_event(&e, now),
            Err(EventValidationError::TooManyProperties { count: 51 })
        ));

        let mut e = event(EventType::Click);
        e.properties
            .insert("x".repeat(101), serde_json::json!(1));
        assert!(matches!(
            validate_event(&e, now),
            Err(EventValidationError::PropertyKeyTooLong { .. })
        ));

        let mut e = event(EventType::Click);
        e.properties
            .insert("note".into(), serde_json::json!("y".repeat(1001)));
        assert!(matches!(
            validate_event(&e, now),
            Err(EventValidationError::PropertyValueTooLong { .. })
        ));

        // Non-string values are not length-checked
        let mut e = event(EventType::Click);
        e.properties
            .insert("n".into(), serde_json::json!([1, 2, 3]));
        assert!(validate_event(&e, now).is_ok());
    }
}
