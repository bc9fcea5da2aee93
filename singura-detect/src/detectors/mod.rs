//! The six statistical pattern detectors.
//!
//! Declaration order here is the engine's stable aggregation order.

mod batch;
mod data_volume;
mod escalation;
mod off_hours;
mod timing;
mod velocity;

pub use batch::BatchOperationDetector;
pub use data_volume::DataVolumeDetector;
pub use escalation::PermissionEscalationDetector;
pub use off_hours::OffHoursDetector;
pub use timing::TimingVarianceDetector;
pub use velocity::VelocityDetector;

use singura_core::event::Event;
use singura_core::finding::{PatternEvidence, PatternSubject};

/// Build the canonical pattern subject from a user's events. Uses the most
/// recent event for resource class and timestamp.
pub(crate) fn subject_for(events: &[&Event], action_type: &str) -> PatternSubject {
    let latest = events
        .iter()
        .max_by_key(|e| e.timestamp)
        .expect("subject_for requires at least one event");
    PatternSubject {
        user_id: latest.user_id.clone(),
        user_email: latest.user_email.clone(),
        resource_type: latest.resource_type,
        action_type: action_type.to_string(),
        timestamp: latest.timestamp,
    }
}

/// Build evidence from a description, named measurements, and the
/// supporting events.
pub(crate) fn evidence_for(
    description: String,
    data_points: Vec<(&str, serde_json::Value)>,
    events: &[&Event],
) -> PatternEvidence {
    PatternEvidence {
        description,
        data_points: data_points
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        supporting_events: events.iter().map(|e| e.event_id.clone()).collect(),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{DateTime, TimeZone, Utc};
    use singura_core::event::{ActionDetails, Event, EventType, ResourceType};

    /// Tuesday 2024-03-05 12:00:00 UTC — inside default business hours.
    pub fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
    }

    pub fn make_event(
        id: &str,
        user: &str,
        event_type: EventType,
        offset_ms: i64,
    ) -> Event {
        let resource_type = match event_type {
            EventType::PermissionChange => ResourceType::Permission,
            EventType::EmailSend => ResourceType::Email,
            EventType::ScriptExecution => ResourceType::Script,
            _ => ResourceType::File,
        };
        Event::new(
            id,
            base_time() + chrono::Duration::milliseconds(offset_ms),
            user,
            "org-1",
            event_type,
            resource_type,
            ActionDetails::new("test.action"),
        )
    }
}
