//! Feedback ingestion — analyst verdicts on emitted findings, converted
//! into the ground-truth set that drives evaluation and threshold tuning.
//!
//! A label is actionable only when at least one reviewer stands behind it.
//! Correction-type feedback (wrong provider, wrong risk band) carries no
//! truth value; it is preserved as a correction delta instead of a label.

use crate::error::EvalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Analyst verdict categories on a previously emitted finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    /// The detection was right and the activity is malicious.
    CorrectDetection,
    /// The detection was wrong; the activity is legitimate.
    FalsePositive,
    /// A real automation the engine missed.
    FalseNegative,
    /// Right detection, wrong classification details.
    IncorrectClassification,
    /// Right detection, wrong provider attribution.
    IncorrectProvider,
    /// Right detection, wrong risk band.
    IncorrectRisk,
}

/// Analyst sentiment accompanying the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// One piece of analyst feedback on a finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationFeedback {
    pub automation_id: String,
    pub organization_id: String,
    pub feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_correction: Option<String>,
    pub sentiment: Sentiment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub reviewers: Vec<String>,
    pub rationale: String,
    pub submitted_at: DateTime<Utc>,
}

/// The analyst-assigned correct classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualClass {
    Malicious,
    Legitimate,
}

/// A ground-truth label derived from actionable feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthLabel {
    pub automation_id: String,
    pub organization_id: String,
    pub actual: ActualClass,
    /// Label confidence in [0, 1]. Direct verdicts carry 1.0; inferred
    /// misses carry 0.9.
    pub confidence: f64,
    pub reviewers: Vec<String>,
    pub rationale: String,
    pub labeled_at: DateTime<Utc>,
}

/// A preserved correction that carries no truth value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionDelta {
    pub automation_id: String,
    pub organization_id: String,
    pub feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_correction: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// What one piece of feedback became.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Labeled(ActualClass),
    CorrectionRecorded,
}

/// Accumulates feedback into a ground-truth set and correction log.
#[derive(Default)]
pub struct FeedbackIngestor {
    /// Latest label per `(organization, automation)`; re-review replaces.
    labels: HashMap<(String, String), GroundTruthLabel>,
    corrections: Vec<CorrectionDelta>,
}

impl FeedbackIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one feedback record. Rejects records with no reviewers.
    pub fn ingest(&mut self, feedback: AutomationFeedback) -> Result<IngestOutcome, EvalError> {
        if feedback.reviewers.is_empty() {
            return Err(EvalError::NotActionable {
                automation_id: feedback.automation_id,
                reason: "no reviewers".into(),
            });
        }

        let (actual, confidence) = match feedback.feedback_type {
            FeedbackType::CorrectDetection => (ActualClass::Malicious, 1.0),
            FeedbackType::FalsePositive => (ActualClass::Legitimate, 1.0),
            FeedbackType::FalseNegative => (ActualClass::Malicious, 0.9),
            FeedbackType::IncorrectClassification
            | FeedbackType::IncorrectProvider
            | FeedbackType::IncorrectRisk => {
                self.corrections.push(CorrectionDelta {
                    automation_id: feedback.automation_id,
                    organization_id: feedback.organization_id,
                    feedback_type: feedback.feedback_type,
                    suggested_correction: feedback.suggested_correction,
                    submitted_at: feedback.submitted_at,
                });
                return Ok(IngestOutcome::CorrectionRecorded);
            }
        };

        let label = GroundTruthLabel {
            automation_id: feedback.automation_id.clone(),
            organization_id: feedback.organization_id.clone(),
            actual,
            confidence,
            reviewers: feedback.reviewers,
            rationale: feedback.rationale,
            labeled_at: feedback.submitted_at,
        };
        self.labels.insert(
            (feedback.organization_id, feedback.automation_id),
            label,
        );
        Ok(IngestOutcome::Labeled(actual))
    }

    /// All labels, ordered by `(organization_id, automation_id)`.
    pub fn labels(&self) -> Vec<&GroundTruthLabel> {
        let mut labels: Vec<&GroundTruthLabel> = self.labels.values().collect();
        labels.sort_by(|a, b| {
            a.organization_id
                .cmp(&b.organization_id)
                .then_with(|| a.automation_id.cmp(&b.automation_id))
        });
        labels
    }

    /// Labels belonging to one organization, in automation-id order.
    pub fn labels_for(&self, organization_id: &str) -> Vec<&GroundTruthLabel> {
        self.labels()
            .into_iter()
            .filter(|label| label.organization_id == organization_id)
            .collect()
    }

    pub fn corrections(&self) -> &[CorrectionDelta] {
        &self.corrections
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Bulk export for downstream consumers: newline-delimited JSON, one
    /// label per line, deterministic `(organization, automation)` order.
    pub fn export_ndjson(&self) -> Result<String, EvalError> {
        let mut out = String::new();
        for label in self.labels() {
            out.push_str(&serde_json::to_string(label)?);
            out.push('\n');
        }
        Ok(out)
    }
}
