//! Configuration types for the detection engine.
//!
//! Source adapters supply a `BusinessHours` per batch; engine tuning lives in
//! `DetectionConfig`. All types deserialize leniently with defaults so a
//! partial config is always usable.

use chrono::{Datelike, TimeZone, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A tenant's working-hours definition, DST-aware via an IANA zone name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessHours {
    /// First working hour (inclusive), 0-23 in the tenant's zone.
    pub start_hour: u32,
    /// First non-working hour (exclusive), 0-23 in the tenant's zone.
    pub end_hour: u32,
    /// Working days of the week.
    pub days_of_week: Vec<Weekday>,
    /// IANA zone name (e.g. `Europe/Berlin`). Unparseable zones fall back
    /// to UTC.
    pub timezone: String,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            days_of_week: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            timezone: "UTC".to_string(),
        }
    }
}

impl BusinessHours {
    /// Resolve the configured zone, falling back to UTC.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    /// Classify an instant as inside or outside business hours, deriving
    /// hour and weekday in the tenant's zone (DST included).
    ///
    /// An overnight window (`start_hour > end_hour`) wraps midnight.
    pub fn is_business(&self, instant: &chrono::DateTime<chrono::Utc>) -> bool {
        let local = self.tz().from_utc_datetime(&instant.naive_utc());
        if !self.days_of_week.contains(&local.weekday()) {
            return false;
        }
        let hour = local.hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Batch-operation clustering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Events closer than this belong to the same temporal cluster.
    pub cluster_gap_secs: u64,
    /// Smallest cluster that can form a batch pattern.
    pub min_cluster_size: usize,
    /// Minimum resource-naming similarity (0.0-1.0) inside a cluster.
    pub min_name_similarity: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            cluster_gap_secs: 10,
            min_cluster_size: 3,
            min_name_similarity: 0.7,
        }
    }
}

/// Engine-level tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Master enable/disable for the detection subsystem.
    pub enabled: bool,
    /// Maximum detectors running concurrently inside one pass.
    pub max_concurrent_detectors: usize,
    /// Per-input cap for content-signature matching; longer inputs are
    /// truncated before any regex runs.
    pub max_content_bytes: usize,
    /// Batch-operation detector parameters.
    pub batch: BatchConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_detectors: 4,
            max_content_bytes: 64 * 1024,
            batch: BatchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_default_business_hours() {
        let hours = BusinessHours::default();
        // Tuesday 12:00 UTC is business time.
        assert!(hours.is_business(&utc(2024, 3, 5, 12, 0)));
        // Tuesday 22:00 UTC is off hours.
        assert!(!hours.is_business(&utc(2024, 3, 5, 22, 0)));
        // Saturday noon is off hours.
        assert!(!hours.is_business(&utc(2024, 3, 9, 12, 0)));
        // Boundary: 09:00 inclusive, 17:00 exclusive.
        assert!(hours.is_business(&utc(2024, 3, 5, 9, 0)));
        assert!(!hours.is_business(&utc(2024, 3, 5, 17, 0)));
    }

    #[test]
    fn test_timezone_shift() {
        let hours = BusinessHours {
            timezone: "America/New_York".to_string(),
            ..Default::default()
        };
        // 14:00 UTC in March (EST/EDT boundary aside) is morning in New York.
        assert!(hours.is_business(&utc(2024, 3, 20, 14, 0)));
        // 02:00 UTC is 21:00/22:00 the previous evening in New York.
        assert!(!hours.is_business(&utc(2024, 3, 20, 2, 0)));
    }

    #[test]
    fn test_dst_transition_respected() {
        let hours = BusinessHours {
            timezone: "Europe/Berlin".to_string(),
            ..Default::default()
        };
        // Before DST (winter): 08:30 UTC = 09:30 CET, business.
        assert!(hours.is_business(&utc(2024, 1, 10, 8, 30)));
        // After DST (summer): 07:30 UTC = 09:30 CEST, business;
        // 16:30 UTC = 18:30 CEST, off hours.
        assert!(hours.is_business(&utc(2024, 7, 10, 7, 30)));
        assert!(!hours.is_business(&utc(2024, 7, 10, 16, 30)));
    }

    #[test]
    fn test_overnight_window_wraps_midnight() {
        let hours = BusinessHours {
            start_hour: 22,
            end_hour: 6,
            days_of_week: vec![Weekday::Tue],
            timezone: "UTC".to_string(),
        };
        assert!(hours.is_business(&utc(2024, 3, 5, 23, 0)));
        assert!(hours.is_business(&utc(2024, 3, 5, 2, 0)));
        assert!(!hours.is_business(&utc(2024, 3, 5, 12, 0)));
    }

    #[test]
    fn test_unparseable_zone_falls_back_to_utc() {
        let hours = BusinessHours {
            timezone: "Not/AZone".to_string(),
            ..Default::default()
        };
        assert!(hours.is_business(&utc(2024, 3, 5, 12, 0)));
    }

    #[test]
    fn test_detection_config_defaults() {
        let config = DetectionConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_concurrent_detectors, 4);
        assert_eq!(config.max_content_bytes, 64 * 1024);
        assert_eq!(config.batch.cluster_gap_secs, 10);
        assert!((config.batch.min_name_similarity - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: DetectionConfig = serde_json::from_str("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.batch.min_cluster_size, 3);
    }
}
