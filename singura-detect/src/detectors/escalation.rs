//! Permission-escalation detector — flags users climbing the role ladder
//! faster or further than policy tolerates.
//!
//! Roles map onto an ordinal ladder (read=0, write=1, admin=2, share=3,
//! owner=4); only strictly increasing transitions count as escalations.

use crate::detector::PatternDetector;
use crate::detectors::{evidence_for, subject_for};
use crate::error::DetectError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use singura_core::config::BusinessHours;
use singura_core::event::{Event, EventType};
use singura_core::finding::{ActivityPattern, PatternType};
use singura_core::thresholds::ThresholdSet;

pub struct PermissionEscalationDetector;

/// Ordinal privilege level for a role string. Unrecognized roles are
/// skipped; they demote confidence instead of guessing a rung.
fn role_level(role: &str) -> Option<u8> {
    match role.to_ascii_lowercase().as_str() {
        "read" | "reader" | "viewer" => Some(0),
        "write" | "writer" | "editor" => Some(1),
        "admin" | "administrator" => Some(2),
        "share" | "sharer" => Some(3),
        "owner" => Some(4),
        _ => None,
    }
}

/// The role a permission-change event granted, read from metadata.
fn granted_role(event: &Event) -> Option<&str> {
    event
        .action_details
        .meta_str("new_role")
        .or_else(|| event.action_details.meta_str("role"))
        .or_else(|| event.action_details.meta_str("permission_level"))
}

#[async_trait]
impl PatternDetector for PermissionEscalationDetector {
    fn name(&self) -> &str {
        "permission_escalation"
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::PermissionChange
    }

    async fn detect(
        &self,
        events: &[Event],
        thresholds: &ThresholdSet,
        _business_hours: &BusinessHours,
    ) -> Result<Vec<ActivityPattern>, DetectError> {
        let bounds = &thresholds.escalation;
        let mut patterns = Vec::new();

        let permission_events: Vec<&Event> = events
            .iter()
            .filter(|e| e.event_type == EventType::PermissionChange)
            .collect();

        let mut users: Vec<_> = group_by_user_refs(&permission_events).into_iter().collect();
        users.sort_by_key(|(user, _)| *user);

        for (_, mut user_events) in users {
            if user_events.len() < bounds.min_events {
                continue;
            }
            user_events.sort_by_key(|e| e.timestamp);

            let leveled: Vec<(&Event, u8)> = user_events
                .iter()
                .copied()
                .filter_map(|e| granted_role(e).and_then(role_level).map(|l| (e, l)))
                .collect();
            if leveled.len() < 2 {
                continue;
            }
            let known_fraction = leveled.len() as f64 / user_events.len() as f64;

            let mut escalations: Vec<DateTime<Utc>> = Vec::new();
            let mut max_jump = 0u8;
            for pair in leveled.windows(2) {
                let (_, from) = pair[0];
                let (event, to) = pair[1];
                if to > from {
                    escalations.push(event.timestamp);
                    max_jump = max_jump.max(to - from);
                }
            }
            if escalations.is_empty() {
                continue;
            }

            let span_days = ((leveled[leveled.len() - 1].0.timestamp - leveled[0].0.timestamp)
                .num_seconds() as f64
                / 86_400.0)
                .max(1.0);
            let velocity = escalations.len() as f64 / span_days;
            let monthly_peak = max_in_window(&escalations, Duration::days(30));

            let fires = velocity > bounds.suspicious_velocity
                || max_jump >= bounds.max_level_jump
                || monthly_peak > bounds.max_escalations_per_month;
            if !fires {
                continue;
            }

            // Jump dominates; the rate contribution saturates at 50.
            let velocity_component =
                (velocity / bounds.suspicious_velocity * 25.0).min(50.0);
            let confidence = (max_jump as f64 * 20.0 + velocity_component) * known_fraction;

            let subject = subject_for(&user_events, "permission_change");
            let evidence = evidence_for(
                format!(
                    "{} escalations over {:.1} days (max jump {}, peak {} in 30 days)",
                    escalations.len(),
                    span_days,
                    max_jump,
                    monthly_peak
                ),
                vec![
                    ("escalation_count", json!(escalations.len())),
                    ("max_level_jump", json!(max_jump)),
                    ("escalation_velocity_per_day", json!(velocity)),
                    ("escalations_in_30_days", json!(monthly_peak)),
                ],
                &user_events,
            );
            patterns.push(ActivityPattern::new(
                PatternType::PermissionChange,
                confidence,
                subject,
                evidence,
            ));
        }

        Ok(patterns)
    }
}

/// Group pre-filtered event references by user.
fn group_by_user_refs<'a>(
    events: &[&'a Event],
) -> std::collections::HashMap<&'a str, Vec<&'a Event>> {
    let mut groups: std::collections::HashMap<&str, Vec<&Event>> =
        std::collections::HashMap::new();
    for event in events.iter().copied() {
        groups.entry(event.user_id.as_str()).or_default().push(event);
    }
    groups
}

/// Largest number of instants falling inside any sliding window of the
/// given width. Input must be sorted ascending.
fn max_in_window(instants: &[DateTime<Utc>], width: Duration) -> usize {
    let mut peak = 0;
    let mut start = 0;
    for end in 0..instants.len() {
        while instants[end] - instants[start] > width {
            start += 1;
        }
        peak = peak.max(end - start + 1);
    }
    peak
}
