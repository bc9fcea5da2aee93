//! Velocity detector — flags event rates no human sustains.
//!
//! Computes events-per-second per `(user, event type)` over the batch
//! window and compares against the per-type calibration threshold.

use crate::detector::PatternDetector;
use crate::detectors::{evidence_for, subject_for};
use crate::error::DetectError;
use async_trait::async_trait;
use serde_json::json;
use singura_core::config::BusinessHours;
use singura_core::event::{Event, EventType, group_by_user};
use singura_core::finding::{ActivityPattern, PatternType};
use singura_core::thresholds::ThresholdSet;
use std::collections::HashMap;

pub struct VelocityDetector;

#[async_trait]
impl PatternDetector for VelocityDetector {
    fn name(&self) -> &str {
        "velocity"
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Velocity
    }

    async fn detect(
        &self,
        events: &[Event],
        thresholds: &ThresholdSet,
        _business_hours: &BusinessHours,
    ) -> Result<Vec<ActivityPattern>, DetectError> {
        let mut patterns = Vec::new();

        for (_, user_events) in sorted_groups(group_by_user(events)) {
            let mut by_type: HashMap<&EventType, Vec<&Event>> = HashMap::new();
            for event in &user_events {
                by_type.entry(&event.event_type).or_default().push(event);
            }

            // Each exceeding event type is reported separately.
            let mut typed: Vec<_> = by_type.into_iter().collect();
            typed.sort_by_key(|(event_type, _)| event_type.as_str().to_string());

            for (event_type, group) in typed {
                let Some(limit) = thresholds.velocity_for(event_type) else {
                    continue;
                };
                if group.len() < thresholds.velocity.min_events {
                    continue;
                }

                let (Some(first), Some(last)) = (
                    group.iter().map(|e| e.timestamp).min(),
                    group.iter().map(|e| e.timestamp).max(),
                ) else {
                    continue;
                };
                let window_secs = (last - first).num_milliseconds() as f64 / 1000.0;
                if window_secs <= 0.0 {
                    // Zero-duration window: rate undefined, never emits.
                    continue;
                }

                let rate = group.len() as f64 / window_secs;
                if rate <= limit {
                    continue;
                }

                // 50 at 1x the threshold, saturating at 100 by 10x.
                let ratio = (rate / limit).min(10.0);
                let confidence = 50.0 + 50.0 * (ratio - 1.0) / 9.0;

                let subject = subject_for(&group, event_type.as_str());
                let evidence = evidence_for(
                    format!(
                        "{} {} events in {:.1}s ({:.2}/s, threshold {:.2}/s)",
                        group.len(),
                        event_type,
                        window_secs,
                        rate,
                        limit
                    ),
                    vec![
                        ("events_per_second", json!(rate)),
                        ("threshold_per_second", json!(limit)),
                        ("window_seconds", json!(window_secs)),
                        ("event_count", json!(group.len())),
                    ],
                    &group,
                );
                patterns.push(ActivityPattern::new(
                    PatternType::Velocity,
                    confidence,
                    subject,
                    evidence,
                ));
            }
        }

        Ok(patterns)
    }
}

/// Deterministic iteration order over the per-user grouping.
fn sorted_groups<'a>(
    groups: HashMap<&'a str, Vec<&'a Event>>,
) -> Vec<(&'a str, Vec<&'a Event>)> {
    let mut sorted: Vec<_> = groups.into_iter().collect();
    sorted.sort_by_key(|(user, _)| *user);
    sorted
}
