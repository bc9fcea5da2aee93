//! Data-volume detector — flags exfiltration-scale download activity.
//!
//! Builds a per-user daily baseline from prior days in the batch and
//! compares the most recent day against it, alongside absolute byte and
//! file-count ceilings.

use crate::detector::PatternDetector;
use crate::detectors::{evidence_for, subject_for};
use crate::error::DetectError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use singura_core::config::BusinessHours;
use singura_core::event::Event;
use singura_core::finding::{ActivityPattern, PatternType};
use singura_core::stats::DailyBaseline;
use singura_core::thresholds::ThresholdSet;
use std::collections::HashMap;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

pub struct DataVolumeDetector;

/// Estimate a download's size from its file extension when the platform
/// did not report one.
fn estimated_size(resource_name: &str) -> u64 {
    let extension = resource_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => 200 * KIB,
        "doc" | "docx" => 300 * KIB,
        "xls" | "xlsx" => 250 * KIB,
        "ppt" | "pptx" => 500 * KIB,
        "csv" => 100 * KIB,
        "txt" | "md" => 10 * KIB,
        "zip" | "tar" | "gz" => 5 * MIB,
        "png" => 500 * KIB,
        "jpg" | "jpeg" => 300 * KIB,
        "mp4" | "mov" => 50 * MIB,
        _ => 100 * KIB,
    }
}

/// Bytes attributed to one download event: reported size when present,
/// extension heuristic otherwise.
fn event_bytes(event: &Event) -> u64 {
    event
        .action_details
        .meta_u64("file_size")
        .or_else(|| event.action_details.meta_u64("size"))
        .or_else(|| event.action_details.meta_u64("bytes"))
        .unwrap_or_else(|| {
            event
                .action_details
                .resource_name
                .as_deref()
                .map(estimated_size)
                .unwrap_or(100 * KIB)
        })
}

#[async_trait]
impl PatternDetector for DataVolumeDetector {
    fn name(&self) -> &str {
        "data_volume"
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::FileDownload
    }

    async fn detect(
        &self,
        events: &[Event],
        thresholds: &ThresholdSet,
        _business_hours: &BusinessHours,
    ) -> Result<Vec<ActivityPattern>, DetectError> {
        let bounds = &thresholds.data_volume;
        let mut patterns = Vec::new();

        let downloads: Vec<&Event> = events
            .iter()
            .filter(|e| e.event_type.is_download())
            .collect();
        // "Today" is the most recent day present in the batch; no clock
        // reads keep the pass deterministic.
        let Some(today) = downloads.iter().map(|e| e.timestamp.date_naive()).max() else {
            return Ok(patterns);
        };

        let mut users: Vec<_> = group_downloads(&downloads).into_iter().collect();
        users.sort_by_key(|(user, _)| *user);

        for (_, user_events) in users {
            let mut daily: HashMap<NaiveDate, (u64, usize)> = HashMap::new();
            for event in user_events.iter().copied() {
                let entry = daily.entry(event.timestamp.date_naive()).or_insert((0, 0));
                entry.0 += event_bytes(event);
                entry.1 += 1;
            }

            let (today_bytes, today_count) = daily.get(&today).copied().unwrap_or((0, 0));
            if today_count == 0 {
                continue;
            }

            // Zero-filled window of the preceding baseline days.
            let window: Vec<f64> = (1..=bounds.min_baseline_days as i64)
                .map(|back| {
                    today
                        .checked_sub_days(chrono::Days::new(back as u64))
                        .and_then(|day| daily.get(&day))
                        .map(|(bytes, _)| *bytes as f64)
                        .unwrap_or(0.0)
                })
                .collect();
            let baseline = DailyBaseline::from_daily_totals(&window);

            let abnormal = baseline.is_abnormal(today_bytes as f64, bounds.abnormal_multiplier);
            let critical = today_bytes >= bounds.daily_critical_bytes
                || today_count >= bounds.file_count_threshold;
            if !abnormal && !critical {
                continue;
            }

            let confidence = if critical {
                95.0 + 5.0
                    * ((today_bytes as f64 / bounds.daily_critical_bytes as f64) - 1.0)
                        .clamp(0.0, 1.0)
            } else {
                90.0
            };

            let today_events: Vec<&Event> = user_events
                .iter()
                .copied()
                .filter(|e| e.timestamp.date_naive() == today)
                .collect();
            let subject = subject_for(&today_events, "file_download");
            let evidence = evidence_for(
                format!(
                    "{} downloads totaling {:.1} MiB today against a {:.1} MiB/day baseline",
                    today_count,
                    today_bytes as f64 / MIB as f64,
                    baseline.mean / MIB as f64
                ),
                vec![
                    ("total_bytes_today", json!(today_bytes)),
                    ("file_count_today", json!(today_count)),
                    ("baseline_mean_bytes", json!(baseline.mean)),
                    ("baseline_days", json!(bounds.min_baseline_days)),
                    ("abnormal_multiplier", json!(bounds.abnormal_multiplier)),
                ],
                &today_events,
            );
            patterns.push(ActivityPattern::new(
                PatternType::FileDownload,
                confidence,
                subject,
                evidence,
            ));
        }

        Ok(patterns)
    }
}

fn group_downloads<'a>(downloads: &[&'a Event]) -> HashMap<&'a str, Vec<&'a Event>> {
    let mut groups: HashMap<&str, Vec<&Event>> = HashMap::new();
    for event in downloads.iter().copied() {
        groups.entry(event.user_id.as_str()).or_default().push(event);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use singura_core::event::{ActionDetails, EventType, ResourceType};

    fn download(id: &str, user: &str, bytes: u64, day_offset: i64, index: i64) -> Event {
        Event::new(
            id,
            Utc.with_ymd_and_hms(2024, 3, 12, 10, 0, 0).unwrap()
                + Duration::days(day_offset)
                + Duration::minutes(index),
            user,
            "org-1",
            EventType::FileDownload,
            ResourceType::File,
            ActionDetails::new("download")
                .with_resource_name("export.csv")
                .with_metadata("file_size", serde_json::json!(bytes)),
        )
    }

    #[tokio::test]
    async fn test_exfiltration_over_baseline_fires() {
        // Seven prior days of 5 MiB/day, then 50 x 5 MiB today.
        let mut events = Vec::new();
        for day in 0..7 {
            events.push(download(
                &format!("b-{day}"),
                "user-1",
                5 * MIB,
                day - 7,
                0,
            ));
        }
        for i in 0..50 {
            events.push(download(&format!("t-{i}"), "user-1", 5 * MIB, 0, i));
        }

        let patterns = DataVolumeDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();

        assert_eq!(patterns.len(), 1);
        let pattern = &patterns[0];
        assert_eq!(pattern.pattern_type, PatternType::FileDownload);
        assert!(pattern.confidence >= 90.0);
        assert_eq!(
            pattern.evidence.data_points["file_count_today"]
                .as_u64()
                .unwrap(),
            50
        );
        assert_eq!(pattern.evidence.supporting_events.len(), 50);
    }

    #[tokio::test]
    async fn test_steady_usage_is_quiet() {
        let mut events = Vec::new();
        for day in 0..8 {
            events.push(download(&format!("d-{day}"), "user-1", 5 * MIB, day - 7, 0));
        }
        let patterns = DataVolumeDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[tokio::test]
    async fn test_absolute_critical_bytes_fire_without_baseline() {
        // No history at all, but 600 MiB in one day.
        let events = vec![download("big-1", "user-1", 600 * MIB, 0, 0)];
        let patterns = DataVolumeDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].confidence >= 95.0);
    }

    #[tokio::test]
    async fn test_file_count_threshold_fires() {
        // 120 tiny downloads: bytes are unremarkable, the count is not.
        let events: Vec<Event> = (0..120)
            .map(|i| download(&format!("s-{i}"), "user-1", 10 * KIB, 0, i))
            .collect();
        let patterns = DataVolumeDetector
            .detect(&events, &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].confidence >= 95.0);
    }

    #[tokio::test]
    async fn test_non_download_events_ignored() {
        let mut event = download("e-1", "user-1", 600 * MIB, 0, 0);
        event.event_type = EventType::FileEdit;
        let patterns = DataVolumeDetector
            .detect(&[event], &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_extension_heuristic() {
        assert_eq!(estimated_size("report.pdf"), 200 * KIB);
        assert_eq!(estimated_size("archive.ZIP"), 5 * MIB);
        assert_eq!(estimated_size("mystery.bin"), 100 * KIB);
    }

    #[test]
    fn test_event_bytes_prefers_reported_size() {
        let event = download("e-1", "user-1", 123, 0, 0);
        assert_eq!(event_bytes(&event), 123);

        let mut event = download("e-2", "user-1", 0, 0, 0);
        event.action_details.additional_metadata.clear();
        event.action_details.resource_name = Some("big.mp4".into());
        assert_eq!(event_bytes(&event), 50 * MIB);
    }
}
