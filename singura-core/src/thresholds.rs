//! Per-organization detection thresholds.
//!
//! A `ThresholdSet` gates every detector's firing behavior. Sets are either
//! compiled-in defaults or reinforcement-optimized overrides produced by the
//! feedback pipeline; detectors always see one complete, validated set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Where a threshold set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    Default,
    RlOptimized,
}

/// Events-per-second bounds per event class.
///
/// These are calibration constants: the shipped defaults are conservative,
/// and per-tenant overrides arrive through the threshold store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityThresholds {
    pub files_per_second: f64,
    pub permission_changes_per_second: f64,
    pub emails_per_second: f64,
    pub downloads_per_second: f64,
    pub scripts_per_second: f64,
    /// Minimum events per (user, event type) group before the detector runs.
    pub min_events: usize,
}

impl Default for VelocityThresholds {
    fn default() -> Self {
        Self {
            files_per_second: 3.0,
            permission_changes_per_second: 1.0,
            emails_per_second: 5.0,
            downloads_per_second: 3.0,
            scripts_per_second: 2.0,
            min_events: 5,
        }
    }
}

/// Inter-event interval regularity bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingThresholds {
    /// Minimum intervals in a sequence before regularity is judged.
    pub min_events: usize,
    /// Gaps longer than this split sequences instead of joining them.
    pub max_interval_ms: i64,
    /// Coefficient of variation below which timing is suspicious.
    pub suspicious_cv: f64,
    /// Coefficient of variation below which timing is near-certain automation.
    pub critical_cv: f64,
}

impl Default for TimingThresholds {
    fn default() -> Self {
        Self {
            min_events: 5,
            max_interval_ms: 10_000,
            suspicious_cv: 0.15,
            critical_cv: 0.05,
        }
    }
}

/// Off-hours activity share bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffHoursThresholds {
    /// Off-hours percentage at which a pattern fires.
    pub suspicious_percent: f64,
    /// Off-hours percentage treated as maximal confidence.
    pub critical_percent: f64,
    pub min_events: usize,
}

impl Default for OffHoursThresholds {
    fn default() -> Self {
        Self {
            suspicious_percent: 30.0,
            critical_percent: 60.0,
            min_events: 10,
        }
    }
}

/// Permission-escalation bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationThresholds {
    /// Escalations tolerated inside any 30-day window.
    pub max_escalations_per_month: usize,
    /// Single-transition level jump that fires regardless of rate.
    pub max_level_jump: u8,
    /// Escalations per day above which the rate is suspicious.
    pub suspicious_velocity: f64,
    pub min_events: usize,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            max_escalations_per_month: 2,
            max_level_jump: 2,
            suspicious_velocity: 0.1,
            min_events: 3,
        }
    }
}

/// Download-volume bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataVolumeThresholds {
    pub daily_warn_bytes: u64,
    pub daily_critical_bytes: u64,
    /// Today ÷ baseline mean above which volume is abnormal.
    pub abnormal_multiplier: f64,
    /// History days required before the baseline comparison applies.
    pub min_baseline_days: usize,
    /// Absolute file count that fires regardless of bytes.
    pub file_count_threshold: usize,
}

impl Default for DataVolumeThresholds {
    fn default() -> Self {
        Self {
            daily_warn_bytes: 100 * MIB,
            daily_critical_bytes: 500 * MIB,
            abnormal_multiplier: 3.0,
            min_baseline_days: 7,
            file_count_threshold: 100,
        }
    }
}

/// The complete per-organization threshold set. Versioned; replaced as a
/// whole, never patched field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSet {
    pub velocity: VelocityThresholds,
    pub timing: TimingThresholds,
    pub off_hours: OffHoursThresholds,
    pub escalation: EscalationThresholds,
    pub data_volume: DataVolumeThresholds,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub source: ThresholdSource,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            velocity: VelocityThresholds::default(),
            timing: TimingThresholds::default(),
            off_hours: OffHoursThresholds::default(),
            escalation: EscalationThresholds::default(),
            data_volume: DataVolumeThresholds::default(),
            version: 1,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            source: ThresholdSource::Default,
        }
    }
}

impl ThresholdSet {
    /// Validate that every bound is finite and strictly positive where it
    /// represents a limit. Invalid sets are replaced by defaults upstream.
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("velocity.files_per_second", self.velocity.files_per_second),
            (
                "velocity.permission_changes_per_second",
                self.velocity.permission_changes_per_second,
            ),
            ("velocity.emails_per_second", self.velocity.emails_per_second),
            (
                "velocity.downloads_per_second",
                self.velocity.downloads_per_second,
            ),
            ("velocity.scripts_per_second", self.velocity.scripts_per_second),
            ("timing.suspicious_cv", self.timing.suspicious_cv),
            ("timing.critical_cv", self.timing.critical_cv),
            ("off_hours.suspicious_percent", self.off_hours.suspicious_percent),
            ("off_hours.critical_percent", self.off_hours.critical_percent),
            (
                "escalation.suspicious_velocity",
                self.escalation.suspicious_velocity,
            ),
            ("data_volume.abnormal_multiplier", self.data_volume.abnormal_multiplier),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} must be finite and positive, got {value}"));
            }
        }
        if self.timing.max_interval_ms <= 0 {
            return Err("timing.max_interval_ms must be positive".to_string());
        }
        if self.timing.critical_cv >= self.timing.suspicious_cv {
            return Err("timing.critical_cv must be below timing.suspicious_cv".to_string());
        }
        if self.off_hours.suspicious_percent >= self.off_hours.critical_percent {
            return Err(
                "off_hours.suspicious_percent must be below off_hours.critical_percent".to_string(),
            );
        }
        if self.data_volume.daily_warn_bytes == 0
            || self.data_volume.daily_critical_bytes <= self.data_volume.daily_warn_bytes
        {
            return Err("data_volume byte thresholds must satisfy 0 < warn < critical".to_string());
        }
        Ok(())
    }

    /// The velocity bound for a given event type, when one is defined.
    pub fn velocity_for(&self, event_type: &crate::event::EventType) -> Option<f64> {
        use crate::event::EventType;
        match event_type {
            EventType::FileCreate | EventType::FileEdit | EventType::FileShare | EventType::FileDelete => {
                Some(self.velocity.files_per_second)
            }
            EventType::FileDownload => Some(self.velocity.downloads_per_second),
            EventType::PermissionChange => Some(self.velocity.permission_changes_per_second),
            EventType::EmailSend => Some(self.velocity.emails_per_second),
            EventType::ScriptExecution => Some(self.velocity.scripts_per_second),
            _ => None,
        }
    }
}
