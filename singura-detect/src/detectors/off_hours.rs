//! Off-hours detector — flags users whose activity concentrates outside
//! the tenant's working hours.
//!
//! Hour and weekday derive in the tenant's IANA zone, DST included; UTC is
//! never assumed.

use crate::detector::PatternDetector;
use crate::detectors::{evidence_for, subject_for};
use crate::error::DetectError;
use async_trait::async_trait;
use serde_json::json;
use singura_core::config::BusinessHours;
use singura_core::event::{Event, group_by_user};
use singura_core::finding::{ActivityPattern, PatternType};
use singura_core::thresholds::ThresholdSet;

pub struct OffHoursDetector;

#[async_trait]
impl PatternDetector for OffHoursDetector {
    fn name(&self) -> &str {
        "off_hours"
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::OffHours
    }

    async fn detect(
        &self,
        events: &[Event],
        thresholds: &ThresholdSet,
        business_hours: &BusinessHours,
    ) -> Result<Vec<ActivityPattern>, DetectError> {
        let bounds = &thresholds.off_hours;
        let mut patterns = Vec::new();

        let mut users: Vec<_> = group_by_user(events).into_iter().collect();
        users.sort_by_key(|(user, _)| *user);

        for (_, user_events) in users {
            if user_events.len() < bounds.min_events {
                continue;
            }

            let off_hours: Vec<&Event> = user_events
                .iter()
                .copied()
                .filter(|e| !business_hours.is_business(&e.timestamp))
                .collect();
            let percentage = off_hours.len() as f64 * 100.0 / user_events.len() as f64;
            if percentage < bounds.suspicious_percent {
                continue;
            }

            let confidence = 100.0 * (percentage - bounds.suspicious_percent)
                / (bounds.critical_percent - bounds.suspicious_percent);

            let subject = subject_for(&off_hours, "off_hours_activity");
            let evidence = evidence_for(
                format!(
                    "{:.0}% of {} events fell outside {}:00-{}:00 ({})",
                    percentage,
                    user_events.len(),
                    business_hours.start_hour,
                    business_hours.end_hour,
                    business_hours.timezone
                ),
                vec![
                    ("off_hours_percentage", json!(percentage)),
                    ("off_hours_count", json!(off_hours.len())),
                    ("total_events", json!(user_events.len())),
                    ("timezone", json!(business_hours.timezone)),
                ],
                &off_hours,
            );
            patterns.push(ActivityPattern::new(
                PatternType::OffHours,
                confidence,
                subject,
                evidence,
            ));
        }

        Ok(patterns)
    }
}
