//! Threshold tuning — bounded, feedback-driven threshold update proposals.
//!
//! Proposals are clipped to ±25% per cycle to prevent oscillation, require
//! at least 50 accumulated labels per organization before any movement, and
//! act on per-tenant sets only; shipped defaults are never mutated.
//! Rollback is replacement by a retained earlier version.

use crate::feedback::{ActualClass, GroundTruthLabel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use singura_core::thresholds::{ThresholdSet, ThresholdSource};
use std::collections::HashMap;

/// A versioned threshold update proposal for one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdProposal {
    pub organization_id: String,
    pub thresholds: ThresholdSet,
    /// Labels the proposal was derived from.
    pub based_on_labels: usize,
    pub confirmed_detections: usize,
    pub false_positives: usize,
    pub missed_detections: usize,
    /// The multiplicative step applied to sensitivity-raising bounds.
    pub adjustment_factor: f64,
}

/// Derives bounded threshold proposals from accumulated ground truth.
pub struct ThresholdTuner {
    /// Minimum labels per organization before any change is proposed.
    min_labels: usize,
    /// Maximum relative change per update cycle.
    max_adjustment: f64,
    /// Retained sets per organization, newest last, for rollback.
    history: HashMap<String, Vec<ThresholdSet>>,
}

impl Default for ThresholdTuner {
    fn default() -> Self {
        Self::new(50, 0.25)
    }
}

impl ThresholdTuner {
    pub fn new(min_labels: usize, max_adjustment: f64) -> Self {
        Self {
            min_labels,
            max_adjustment: max_adjustment.clamp(0.0, 1.0),
            history: HashMap::new(),
        }
    }

    /// Propose a new threshold set for an organization, or `None` when the
    /// evidence is insufficient or balanced. Deterministic for a given
    /// label multiset.
    pub fn propose(
        &self,
        organization_id: &str,
        current: &ThresholdSet,
        labels: &[GroundTruthLabel],
    ) -> Option<ThresholdProposal> {
        let relevant: Vec<&GroundTruthLabel> = labels
            .iter()
            .filter(|label| label.organization_id == organization_id)
            .collect();
        if relevant.len() < self.min_labels {
            return None;
        }

        // confidence 1.0 malicious labels confirm detections; 0.9 marks
        // misses surfaced by false-negative feedback.
        let false_positives = relevant
            .iter()
            .filter(|l| l.actual == ActualClass::Legitimate)
            .count();
        let missed = relevant
            .iter()
            .filter(|l| l.actual == ActualClass::Malicious && l.confidence < 1.0)
            .count();
        let confirmed = relevant.len() - false_positives - missed;

        let total = relevant.len() as f64;
        let imbalance = (false_positives as f64 - missed as f64) / total;
        if imbalance.abs() < 0.02 {
            return None;
        }

        // Positive imbalance: too many false positives, desensitize.
        // Negative: too many misses, sensitize. Clipped per cycle.
        let step = (imbalance.abs() * 0.5).min(self.max_adjustment);
        let factor = if imbalance > 0.0 { 1.0 + step } else { 1.0 - step };

        let mut thresholds = current.clone();
        // Bounds where larger means harder to fire scale by the factor.
        thresholds.velocity.files_per_second *= factor;
        thresholds.velocity.permission_changes_per_second *= factor;
        thresholds.velocity.emails_per_second *= factor;
        thresholds.velocity.downloads_per_second *= factor;
        thresholds.velocity.scripts_per_second *= factor;
        thresholds.off_hours.suspicious_percent =
            (thresholds.off_hours.suspicious_percent * factor)
                .min(thresholds.off_hours.critical_percent - 1.0);
        thresholds.escalation.suspicious_velocity *= factor;
        thresholds.data_volume.abnormal_multiplier *= factor;
        // CV bounds invert: a smaller suspicious CV is harder to fire.
        thresholds.timing.suspicious_cv = (thresholds.timing.suspicious_cv / factor)
            .max(thresholds.timing.critical_cv * 1.5);

        thresholds.version = current.version + 1;
        thresholds.source = ThresholdSource::RlOptimized;
        thresholds.updated_at = latest_label_time(&relevant);

        if let Err(reason) = thresholds.validate() {
            tracing::debug!(%organization_id, %reason, "discarding invalid tuner proposal");
            return None;
        }

        Some(ThresholdProposal {
            organization_id: organization_id.to_string(),
            thresholds,
            based_on_labels: relevant.len(),
            confirmed_detections: confirmed,
            false_positives,
            missed_detections: missed,
            adjustment_factor: factor,
        })
    }

    /// Retain a set so a later rollback can restore it.
    pub fn record(&mut self, organization_id: &str, set: ThresholdSet) {
        self.history
            .entry(organization_id.to_string())
            .or_default()
            .push(set);
    }

    /// The retained set with the given version, for rollback by
    /// replacement.
    pub fn retained(&self, organization_id: &str, version: u32) -> Option<&ThresholdSet> {
        self.history
            .get(organization_id)?
            .iter()
            .rev()
            .find(|set| set.version == version)
    }
}

/// The most recent label timestamp; keeps proposals clock-free and
/// reproducible.
fn latest_label_time(labels: &[&GroundTruthLabel]) -> DateTime<Utc> {
    labels
        .iter()
        .map(|label| label.labeled_at)
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn label(automation_id: &str, actual: ActualClass, confidence: f64) -> GroundTruthLabel {
        GroundTruthLabel {
            automation_id: automation_id.to_string(),
            organization_id: "org-1".to_string(),
            actual,
            confidence,
            reviewers: vec!["riley".to_string()],
            rationale: "reviewed".to_string(),
            labeled_at: Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
        }
    }

    fn labels(confirmed: usize, false_positives: usize, missed: usize) -> Vec<GroundTruthLabel> {
        let mut all = Vec::new();
        for i in 0..confirmed {
            all.push(label(&format!("c-{i}"), ActualClass::Malicious, 1.0));
        }
        for i in 0..false_positives {
            all.push(label(&format!("f-{i}"), ActualClass::Legitimate, 1.0));
        }
        for i in 0..missed {
            all.push(label(&format!("m-{i}"), ActualClass::Malicious, 0.9));
        }
        all
    }

    #[test]
    fn test_below_label_floor_proposes_nothing() {
        let tuner = ThresholdTuner::default();
        let current = ThresholdSet::default();
        // 49 labels, heavily imbalanced: still no proposal.
        assert!(
            tuner
                .propose("org-1", &current, &labels(9, 40, 0))
                .is_none()
        );
    }

    #[test]
    fn test_false_positive_surplus_desensitizes() {
        let tuner = ThresholdTuner::default();
        let current = ThresholdSet::default();
        let proposal = tuner
            .propose("org-1", &current, &labels(30, 30, 0))
            .expect("enough labels and imbalance");

        assert!(proposal.adjustment_factor > 1.0);
        assert!(
            proposal.thresholds.velocity.files_per_second
                > current.velocity.files_per_second
        );
        // A smaller suspicious CV fires less often.
        assert!(proposal.thresholds.timing.suspicious_cv < current.timing.suspicious_cv);
        assert_eq!(proposal.thresholds.version, current.version + 1);
        assert_eq!(proposal.thresholds.source, ThresholdSource::RlOptimized);
    }

    #[test]
    fn test_missed_detections_sensitize() {
        let tuner = ThresholdTuner::default();
        let current = ThresholdSet::default();
        let proposal = tuner
            .propose("org-1", &current, &labels(30, 0, 30))
            .expect("enough labels and imbalance");

        assert!(proposal.adjustment_factor < 1.0);
        assert!(
            proposal.thresholds.velocity.files_per_second
                < current.velocity.files_per_second
        );
        assert!(proposal.thresholds.timing.suspicious_cv > current.timing.suspicious_cv);
    }

    #[test]
    fn test_adjustment_clipped_to_quarter() {
        let tuner = ThresholdTuner::default();
        let current = ThresholdSet::default();
        // All labels false positives: maximal imbalance.
        let proposal = tuner
            .propose("org-1", &current, &labels(0, 60, 0))
            .unwrap();
        assert!(proposal.adjustment_factor <= 1.25);
        assert!(
            proposal.thresholds.velocity.files_per_second
                <= current.velocity.files_per_second * 1.25 + 1e-9
        );
    }

    #[test]
    fn test_balanced_feedback_proposes_nothing() {
        let tuner = ThresholdTuner::default();
        let current = ThresholdSet::default();
        assert!(
            tuner
                .propose("org-1", &current, &labels(20, 20, 20))
                .is_none()
        );
    }

    #[test]
    fn test_other_org_labels_do_not_count() {
        let tuner = ThresholdTuner::default();
        let current = ThresholdSet::default();
        let mut foreign = labels(0, 60, 0);
        for label in &mut foreign {
            label.organization_id = "org-2".to_string();
        }
        assert!(tuner.propose("org-1", &current, &foreign).is_none());
    }

    #[test]
    fn test_determinism() {
        let tuner = ThresholdTuner::default();
        let current = ThresholdSet::default();
        let batch = labels(10, 50, 5);
        let first = tuner.propose("org-1", &current, &batch).unwrap();
        let second = tuner.propose("org-1", &current, &batch).unwrap();
        assert_eq!(first.thresholds, second.thresholds);
        assert_eq!(first.adjustment_factor, second.adjustment_factor);
    }

    #[test]
    fn test_rollback_by_retained_version() {
        let mut tuner = ThresholdTuner::default();
        let v1 = ThresholdSet::default();
        tuner.record("org-1", v1.clone());

        let proposal = tuner
            .propose("org-1", &v1, &labels(0, 60, 0))
            .unwrap();
        tuner.record("org-1", proposal.thresholds.clone());

        let restored = tuner.retained("org-1", 1).expect("version 1 retained");
        assert_eq!(restored, &v1);
        assert!(tuner.retained("org-1", 99).is_none());
        assert!(tuner.retained("org-9", 1).is_none());
    }
}
