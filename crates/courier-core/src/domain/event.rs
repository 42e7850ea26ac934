//! Notification events posted to the webhook.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::ConnectionContext;
use super::ids::EventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "session.started")]
    SessionStarted,
    #[serde(rename = "session.ended")]
    SessionEnded,
    #[serde(rename = "recording.started")]
    RecordingStarted,
    #[serde(rename = "recording.completed")]
    RecordingCompleted,
    #[serde(rename = "recording.delivered")]
    RecordingDelivered,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session.started",
            EventKind::SessionEnded => "session.ended",
            EventKind::RecordingStarted => "recording.started",
            EventKind::RecordingCompleted => "recording.completed",
            EventKind::RecordingDelivered => "recording.delivered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One webhook notification, before serialization.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub context: ConnectionContext,
    /// Extra top-level fields (e.g. bucket/key for `recording.delivered`).
    pub extra: Map<String, Value>,
}

impl NotificationEvent {
    pub fn new(
        kind: EventKind,
        session_id: impl Into<String>,
        context: ConnectionContext,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            kind,
            timestamp,
            session_id: session_id.into(),
            context,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra.extend(extra);
        self
    }

    /// JSON body of the webhook POST.
    ///
    /// Fixed fields are written last so `extra` cannot overwrite them.
    pub fn to_body(&self) -> Value {
        let mut body = self.extra.clone();
        body.insert(
            "connection".to_string(),
            Value::Object(self.context.metadata.clone()),
        );
        body.insert("eventId".to_string(), Value::String(self.id.to_string()));
        body.insert("event".to_string(), Value::String(self.kind.to_string()));
        body.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        body.insert(
            "sessionId".to_string(),
            Value::String(self.session_id.clone()),
        );
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn kind_serializes_with_dotted_name() {
        let s = serde_json::to_string(&EventKind::RecordingDelivered).unwrap();
        assert_eq!(s, "\"recording.delivered\"");

        let back: EventKind = serde_json::from_str("\"session.ended\"").unwrap();
        assert_eq!(back, EventKind::SessionEnded);
    }

    #[test]
    fn body_contains_fixed_fields_and_extra() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let ctx = ConnectionContext::new().with_meta("userId", "u1");
        let mut extra = Map::new();
        extra.insert("key".to_string(), json!("recordings/u1/a.guac"));
        extra.insert("event".to_string(), json!("spoofed"));

        let event = NotificationEvent::new(EventKind::RecordingDelivered, "s-1", ctx, ts)
            .with_extra(extra);
        let body = event.to_body();

        assert_eq!(body["event"], "recording.delivered");
        assert_eq!(body["sessionId"], "s-1");
        assert_eq!(body["timestamp"], "2024-05-01T08:30:00.000Z");
        assert_eq!(body["connection"]["userId"], "u1");
        assert_eq!(body["key"], "recordings/u1/a.guac");
        assert!(body["eventId"].as_str().unwrap().starts_with("evt-"));
    }
}
