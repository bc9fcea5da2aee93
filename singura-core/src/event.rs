//! Canonical audit event — the unified input type for all detectors.
//!
//! Source adapters map per-platform audit records onto `Event`; everything
//! downstream (detectors, the engine, the evaluator) consumes only this type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of normalized audit event types.
///
/// Values outside the closed set are preserved as opaque strings so that
/// downstream consumers tolerate new platform event names without a schema
/// change. Unknown events never trigger a pattern on their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FileCreate,
    FileEdit,
    FileShare,
    FileDownload,
    FileDelete,
    PermissionChange,
    ScriptExecution,
    EmailSend,
    Login,
    AppInstall,
    TokenGrant,
    #[serde(untagged)]
    Unknown(String),
}

impl EventType {
    /// Parse a normalized event name; anything outside the closed set is
    /// preserved as `Unknown`.
    pub fn parse(name: &str) -> Self {
        match name {
            "file_create" => EventType::FileCreate,
            "file_edit" => EventType::FileEdit,
            "file_share" => EventType::FileShare,
            "file_download" => EventType::FileDownload,
            "file_delete" => EventType::FileDelete,
            "permission_change" => EventType::PermissionChange,
            "script_execution" => EventType::ScriptExecution,
            "email_send" => EventType::EmailSend,
            "login" => EventType::Login,
            "app_install" => EventType::AppInstall,
            "token_grant" => EventType::TokenGrant,
            other => EventType::Unknown(other.to_string()),
        }
    }

    /// The wire name for this event type.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::FileCreate => "file_create",
            EventType::FileEdit => "file_edit",
            EventType::FileShare => "file_share",
            EventType::FileDownload => "file_download",
            EventType::FileDelete => "file_delete",
            EventType::PermissionChange => "permission_change",
            EventType::ScriptExecution => "script_execution",
            EventType::EmailSend => "email_send",
            EventType::Login => "login",
            EventType::AppInstall => "app_install",
            EventType::TokenGrant => "token_grant",
            EventType::Unknown(s) => s.as_str(),
        }
    }

    /// Whether this event represents a download-class operation
    /// (consumed by the data-volume detector).
    pub fn is_download(&self) -> bool {
        matches!(self, EventType::FileDownload)
    }

    /// Whether this event is a member of the closed set.
    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Unknown(_))
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource classification for the object an event acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    File,
    Email,
    Calendar,
    Script,
    Permission,
    Conversation,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceType::File => "file",
            ResourceType::Email => "email",
            ResourceType::Calendar => "calendar",
            ResourceType::Script => "script",
            ResourceType::Permission => "permission",
            ResourceType::Conversation => "conversation",
            ResourceType::Other => "other",
        };
        f.write_str(s)
    }
}

/// Free-form action context carried alongside every event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDetails {
    /// Platform-native action name (e.g. `drive.file.download`).
    pub action: String,
    /// Display name of the resource acted on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    /// Unstructured platform metadata (sizes, endpoints, scopes, roles).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_metadata: HashMap<String, serde_json::Value>,
}

impl ActionDetails {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_name: None,
            additional_metadata: HashMap::new(),
        }
    }

    pub fn with_resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.additional_metadata.insert(key.into(), value);
        self
    }

    /// Fetch a metadata value as a string, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.additional_metadata.get(key).and_then(|v| v.as_str())
    }

    /// Fetch a metadata value as an unsigned integer, tolerating numeric
    /// strings.
    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        match self.additional_metadata.get(key)? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// A single normalized audit event. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Opaque unique identifier from the source platform.
    pub event_id: String,
    /// Absolute instant with millisecond precision, UTC.
    pub timestamp: DateTime<Utc>,
    /// Acting user. Never empty; the normalizer rejects records without one.
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub organization_id: String,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub resource_type: ResourceType,
    pub action_details: ActionDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Event {
    /// Construct an event with the required fields; optional fields attach
    /// through the `with_*` builders.
    pub fn new(
        event_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        user_id: impl Into<String>,
        organization_id: impl Into<String>,
        event_type: EventType,
        resource_type: ResourceType,
        action_details: ActionDetails,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            user_id: user_id.into(),
            user_email: None,
            organization_id: organization_id.into(),
            event_type,
            resource_id: None,
            resource_type,
            action_details,
            user_agent: None,
            ip_address: None,
            location: None,
        }
    }

    pub fn with_user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Secondary view of an event on an AI platform (ChatGPT, Claude, Gemini
/// enterprise feeds). Produced by the normalizer alongside the `Event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIActivity {
    /// The event this view was derived from.
    pub event_id: String,
    /// Provider hint as reported by the platform feed.
    pub provider_hint: String,
    /// Model named by the platform, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Conversation or session the activity belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Token usage when the feed reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

/// Group a batch of events by user, borrowing from the input slice.
///
/// Single pass, O(events) memory; the only per-batch scratch the engine
/// allocates.
pub fn group_by_user<'a>(events: &'a [Event]) -> HashMap<&'a str, Vec<&'a Event>> {
    let mut groups: HashMap<&str, Vec<&Event>> = HashMap::new();
    for event in events {
        groups.entry(event.user_id.as_str()).or_default().push(event);
    }
    groups
}
