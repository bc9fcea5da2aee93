//! Event normalizer — maps per-platform audit records onto the canonical
//! `Event` (and, for AI platforms, a secondary `AIActivity` view).
//!
//! Pure over its input: no I/O, no clock reads beyond parsing timestamps the
//! record supplies. Records missing a required field are dropped and
//! counted, never silently mutated; event names outside the closed set are
//! coerced to `Unknown` and still emitted.

use crate::error::NormalizeError;
use crate::event::{ActionDetails, AIActivity, Event, EventType, ResourceType};
use crate::metrics::NormalizerStats;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// The SaaS platforms this normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    GoogleWorkspace,
    Slack,
    Microsoft365,
    AiPlatform,
}

/// A normalized record: the canonical event plus, for AI-platform feeds,
/// the provider-side activity view.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub event: Event,
    pub ai_activity: Option<AIActivity>,
}

/// Normalizes platform-specific audit records into unified `Event`s.
pub struct Normalizer;

impl Normalizer {
    /// Normalize a Google Workspace admin-reports activity record.
    pub fn normalize_google(
        organization_id: &str,
        record: &Value,
    ) -> Result<NormalizedRecord, NormalizeError> {
        let timestamp = parse_timestamp(
            record.pointer("/id/time").or_else(|| record.get("time")),
            "id.time",
        )?;
        let user_id = required_str(
            record
                .pointer("/actor/profileId")
                .or_else(|| record.pointer("/actor/email")),
            "actor",
        )?;
        let event_name = required_str(record.pointer("/events/0/name"), "events[0].name")?;

        let (event_type, resource_type) = map_google_event(&event_name);
        let mut details = ActionDetails::new(event_name);
        if let Some(params) = record.pointer("/events/0/parameters").and_then(Value::as_array) {
            for param in params {
                if let (Some(name), Some(value)) = (param.get("name").and_then(Value::as_str), param.get("value")) {
                    if name == "doc_title" {
                        details.resource_name = value.as_str().map(String::from);
                    } else {
                        details
                            .additional_metadata
                            .insert(name.to_string(), value.clone());
                    }
                }
            }
        }

        let mut event = Event::new(
            string_or(record.pointer("/id/uniqueQualifier"), || {
                format!("google-{}", timestamp.timestamp_millis())
            }),
            timestamp,
            user_id,
            organization_id,
            event_type,
            resource_type,
            details,
        );
        if let Some(email) = record.pointer("/actor/email").and_then(Value::as_str) {
            event = event.with_user_email(email);
        }
        if let Some(ip) = record.get("ipAddress").and_then(Value::as_str) {
            event = event.with_ip_address(ip);
        }
        if let Some(doc_id) = record
            .pointer("/events/0/parameters")
            .and_then(Value::as_array)
            .and_then(|params| {
                params.iter().find_map(|p| {
                    (p.get("name").and_then(Value::as_str) == Some("doc_id"))
                        .then(|| p.get("value").and_then(Value::as_str))
                        .flatten()
                })
            })
        {
            event = event.with_resource_id(doc_id);
        }

        Ok(NormalizedRecord {
            event,
            ai_activity: None,
        })
    }

    /// Normalize a Slack audit-log entry.
    pub fn normalize_slack(
        organization_id: &str,
        record: &Value,
    ) -> Result<NormalizedRecord, NormalizeError> {
        let timestamp = parse_timestamp(record.get("date_create"), "date_create")?;
        let user_id = required_str(record.pointer("/actor/user/id"), "actor.user.id")?;
        let action = required_str(record.get("action"), "action")?;

        let (event_type, resource_type) = map_slack_action(&action);
        let mut details = ActionDetails::new(action);
        if let Some(name) = record
            .pointer("/entity/file/name")
            .or_else(|| record.pointer("/entity/channel/name"))
            .and_then(Value::as_str)
        {
            details.resource_name = Some(name.to_string());
        }
        if let Some(app) = record.pointer("/entity/app/name").and_then(Value::as_str) {
            details
                .additional_metadata
                .insert("app_name".to_string(), Value::String(app.to_string()));
        }
        if let Some(scopes) = record.pointer("/entity/app/scopes") {
            details
                .additional_metadata
                .insert("oauth_scopes".to_string(), scopes.clone());
        }

        let mut event = Event::new(
            string_or(record.get("id"), || {
                format!("slack-{}", timestamp.timestamp_millis())
            }),
            timestamp,
            user_id,
            organization_id,
            event_type,
            resource_type,
            details,
        );
        if let Some(email) = record.pointer("/actor/user/email").and_then(Value::as_str) {
            event = event.with_user_email(email);
        }
        if let Some(ip) = record.pointer("/context/ip_address").and_then(Value::as_str) {
            event = event.with_ip_address(ip);
        }
        if let Some(ua) = record.pointer("/context/ua").and_then(Value::as_str) {
            event = event.with_user_agent(ua);
        }
        if let Some(file_id) = record.pointer("/entity/file/id").and_then(Value::as_str) {
            event = event.with_resource_id(file_id);
        }

        Ok(NormalizedRecord {
            event,
            ai_activity: None,
        })
    }

    /// Normalize a Microsoft 365 (Graph activity) record.
    pub fn normalize_microsoft(
        organization_id: &str,
        record: &Value,
    ) -> Result<NormalizedRecord, NormalizeError> {
        let timestamp = parse_timestamp(record.get("createdDateTime"), "createdDateTime")?;
        let user_id = required_str(record.get("userId"), "userId")?;
        let operation = required_str(record.get("operation"), "operation")?;

        let (event_type, resource_type) = map_microsoft_operation(&operation);
        let mut details = ActionDetails::new(operation);
        if let Some(name) = record.get("objectName").and_then(Value::as_str) {
            details.resource_name = Some(name.to_string());
        }
        for key in ["fileSize", "targetUser", "clientAppId"] {
            if let Some(value) = record.get(key) {
                details
                    .additional_metadata
                    .insert(snake_case(key), value.clone());
            }
        }

        let mut event = Event::new(
            string_or(record.get("id"), || {
                format!("ms-{}", timestamp.timestamp_millis())
            }),
            timestamp,
            user_id,
            organization_id,
            event_type,
            resource_type,
            details,
        );
        if let Some(email) = record.get("userPrincipalName").and_then(Value::as_str) {
            event = event.with_user_email(email);
        }
        if let Some(ip) = record.get("clientIP").and_then(Value::as_str) {
            event = event.with_ip_address(ip);
        }
        if let Some(ua) = record.get("userAgent").and_then(Value::as_str) {
            event = event.with_user_agent(ua);
        }
        if let Some(object_id) = record.get("objectId").and_then(Value::as_str) {
            event = event.with_resource_id(object_id);
        }

        Ok(NormalizedRecord {
            event,
            ai_activity: None,
        })
    }

    /// Normalize an AI-platform compliance-feed record (ChatGPT, Claude,
    /// Gemini enterprise). Emits both the canonical event and the
    /// `AIActivity` view.
    pub fn normalize_ai_platform(
        organization_id: &str,
        record: &Value,
    ) -> Result<NormalizedRecord, NormalizeError> {
        let timestamp = parse_timestamp(record.get("timestamp"), "timestamp")?;
        let user_id = required_str(record.pointer("/user/id"), "user.id")?;
        let event_name = required_str(record.get("event"), "event")?;

        let event_id = string_or(record.get("id"), || {
            format!("ai-{}", timestamp.timestamp_millis())
        });
        let event_type = EventType::parse(&event_name);
        let mut details = ActionDetails::new(event_name);
        for key in ["model", "provider", "tokens"] {
            if let Some(value) = record.get(key) {
                details
                    .additional_metadata
                    .insert(key.to_string(), value.clone());
            }
        }

        let mut event = Event::new(
            event_id.clone(),
            timestamp,
            user_id,
            organization_id,
            event_type,
            ResourceType::Conversation,
            details,
        );
        if let Some(email) = record.pointer("/user/email").and_then(Value::as_str) {
            event = event.with_user_email(email);
        }
        if let Some(conversation) = record.get("conversation_id").and_then(Value::as_str) {
            event = event.with_resource_id(conversation);
        }

        let ai_activity = AIActivity {
            event_id,
            provider_hint: record
                .get("provider")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            model: record.get("model").and_then(Value::as_str).map(String::from),
            conversation_id: record
                .get("conversation_id")
                .and_then(Value::as_str)
                .map(String::from),
            tokens_used: record.get("tokens").and_then(Value::as_u64),
        };

        Ok(NormalizedRecord {
            event,
            ai_activity: Some(ai_activity),
        })
    }

    /// Normalize a batch, preserving per-user input order. Invalid records
    /// are dropped and counted; the batch never fails as a whole.
    pub fn normalize_batch(
        platform: Platform,
        organization_id: &str,
        records: &[Value],
    ) -> (Vec<NormalizedRecord>, NormalizerStats) {
        let mut stats = NormalizerStats::default();
        let mut normalized = Vec::with_capacity(records.len());

        for record in records {
            let result = match platform {
                Platform::GoogleWorkspace => Self::normalize_google(organization_id, record),
                Platform::Slack => Self::normalize_slack(organization_id, record),
                Platform::Microsoft365 => Self::normalize_microsoft(organization_id, record),
                Platform::AiPlatform => Self::normalize_ai_platform(organization_id, record),
            };
            match result {
                Ok(rec) => {
                    stats.record_normalized();
                    if !rec.event.event_type.is_known() {
                        stats.record_coerced();
                    }
                    normalized.push(rec);
                }
                Err(err) => {
                    stats.record_dropped();
                    tracing::debug!(%err, "dropped invalid audit record");
                }
            }
        }

        (normalized, stats)
    }
}

fn required_str(value: Option<&Value>, field: &'static str) -> Result<String, NormalizeError> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None => Err(NormalizeError::MissingField { field }),
        Some(other) => Err(NormalizeError::IllTyped {
            field,
            message: format!("expected string, got {other}"),
        }),
    }
}

fn string_or(value: Option<&Value>, fallback: impl FnOnce() -> String) -> String {
    value
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(fallback)
}

/// Parse a timestamp from RFC 3339 text or a Unix epoch number
/// (seconds or milliseconds, disambiguated by magnitude).
fn parse_timestamp(value: Option<&Value>, field: &'static str) -> Result<DateTime<Utc>, NormalizeError> {
    let value = value.ok_or(NormalizeError::MissingField { field })?;
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| NormalizeError::BadTimestamp(s.clone())),
        Value::Number(n) => {
            let raw = n.as_i64().ok_or_else(|| NormalizeError::BadTimestamp(n.to_string()))?;
            let instant = if raw > 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            };
            instant.ok_or_else(|| NormalizeError::BadTimestamp(raw.to_string()))
        }
        other => Err(NormalizeError::IllTyped {
            field,
            message: format!("expected timestamp, got {other}"),
        }),
    }
}

fn map_google_event(name: &str) -> (EventType, ResourceType) {
    match name {
        "create" | "upload" => (EventType::FileCreate, ResourceType::File),
        "edit" => (EventType::FileEdit, ResourceType::File),
        "download" => (EventType::FileDownload, ResourceType::File),
        "delete" | "trash" => (EventType::FileDelete, ResourceType::File),
        "acl_change" | "change_user_access" | "change_document_visibility" => {
            (EventType::PermissionChange, ResourceType::Permission)
        }
        "shared_drive_membership_change" => (EventType::PermissionChange, ResourceType::Permission),
        "login_success" | "login" => (EventType::Login, ResourceType::Other),
        "authorize" => (EventType::TokenGrant, ResourceType::Permission),
        "run_script" | "script_execution" => (EventType::ScriptExecution, ResourceType::Script),
        other => (EventType::parse(other), ResourceType::Other),
    }
}

fn map_slack_action(action: &str) -> (EventType, ResourceType) {
    match action {
        "file_uploaded" => (EventType::FileCreate, ResourceType::File),
        "file_downloaded" => (EventType::FileDownload, ResourceType::File),
        "file_shared" | "file_public_link_created" => (EventType::FileShare, ResourceType::File),
        "user_login" => (EventType::Login, ResourceType::Other),
        "app_installed" => (EventType::AppInstall, ResourceType::Other),
        "app_scopes_expanded" | "app_token_created" => {
            (EventType::TokenGrant, ResourceType::Permission)
        }
        "role_change" | "permissions_changed" => {
            (EventType::PermissionChange, ResourceType::Permission)
        }
        other => (EventType::parse(other), ResourceType::Other),
    }
}

fn map_microsoft_operation(operation: &str) -> (EventType, ResourceType) {
    match operation {
        "FileUploaded" | "FileCreated" => (EventType::FileCreate, ResourceType::File),
        "FileModified" => (EventType::FileEdit, ResourceType::File),
        "FileDownloaded" | "FileSyncDownloadedFull" => {
            (EventType::FileDownload, ResourceType::File)
        }
        "SharingInvitationCreated" | "AnonymousLinkCreated" => {
            (EventType::FileShare, ResourceType::File)
        }
        "PermissionLevelModified" | "AddedToGroup" => {
            (EventType::PermissionChange, ResourceType::Permission)
        }
        "Send" | "SendAs" => (EventType::EmailSend, ResourceType::Email),
        "UserLoggedIn" => (EventType::Login, ResourceType::Other),
        "Add app role assignment grant to user" => (EventType::TokenGrant, ResourceType::Permission),
        other => (EventType::parse(other), ResourceType::Other),
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
