//! Detection-quality evaluation — confusion matrices, precision/recall/F1,
//! precision-recall curves, AUC, and F1-optimal threshold selection over
//! paired predictions and ground truth.
//!
//! Pairs align by automation id; a prediction with no ground-truth label is
//! ignored entirely and never contributes to any count.

use crate::error::EvalError;
use crate::feedback::{ActualClass, GroundTruthLabel};
use serde::{Deserialize, Serialize};
use singura_core::stats::trapezoid_auc;
use std::collections::HashMap;

/// One engine prediction to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub automation_id: String,
    /// The binary verdict at the engine's operating point.
    pub predicted: bool,
    /// Detection confidence normalized to [0, 1].
    pub confidence: f64,
}

/// Binary confusion counts at one classification threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn precision(&self) -> f64 {
        let tp = self.true_positives as f64;
        let fp = self.false_positives as f64;
        if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 }
    }

    pub fn recall(&self) -> f64 {
        let tp = self.true_positives as f64;
        let fn_ = self.false_negatives as f64;
        if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 }
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 }
    }
}

/// One point on the precision-recall curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// A full precision-recall sweep with its area and optimal operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrCurveData {
    pub points: Vec<PrPoint>,
    /// Trapezoidal area under the (recall, precision) curve.
    pub auc: f64,
    pub optimal_threshold: f64,
    pub optimal_precision: f64,
    pub optimal_recall: f64,
    pub optimal_f1: f64,
}

/// An aligned (confidence, actual) pair.
struct Pair {
    confidence: f64,
    actual_malicious: bool,
    predicted: bool,
}

pub struct Evaluator;

impl Evaluator {
    /// Confusion matrix using each prediction's own binary verdict.
    pub fn confusion_matrix(
        predictions: &[Prediction],
        ground_truth: &[GroundTruthLabel],
    ) -> Result<ConfusionMatrix, EvalError> {
        let pairs = align(predictions, ground_truth)?;
        Ok(count(&pairs, |pair| pair.predicted))
    }

    /// Confusion matrix classifying positive when confidence reaches the
    /// threshold.
    pub fn confusion_at_threshold(
        predictions: &[Prediction],
        ground_truth: &[GroundTruthLabel],
        threshold: f64,
    ) -> Result<ConfusionMatrix, EvalError> {
        validate_unit("threshold", threshold)?;
        let pairs = align(predictions, ground_truth)?;
        Ok(count(&pairs, |pair| pair.confidence >= threshold))
    }

    /// Precision, recall, and F1 at one threshold.
    pub fn point_at_threshold(
        predictions: &[Prediction],
        ground_truth: &[GroundTruthLabel],
        threshold: f64,
    ) -> Result<PrPoint, EvalError> {
        let matrix = Self::confusion_at_threshold(predictions, ground_truth, threshold)?;
        Ok(PrPoint {
            threshold,
            precision: matrix.precision(),
            recall: matrix.recall(),
            f1: matrix.f1(),
        })
    }

    /// Sweep the supplied thresholds (or an adaptive sample of the
    /// confidence distribution plus the {0, 1} endpoints) into a full
    /// precision-recall curve.
    pub fn pr_curve(
        predictions: &[Prediction],
        ground_truth: &[GroundTruthLabel],
        thresholds: Option<&[f64]>,
    ) -> Result<PrCurveData, EvalError> {
        let pairs = align(predictions, ground_truth)?;

        let thresholds: Vec<f64> = match thresholds {
            Some(supplied) => {
                for threshold in supplied {
                    validate_unit("threshold", *threshold)?;
                }
                supplied.to_vec()
            }
            None => adaptive_thresholds(&pairs),
        };

        let points: Vec<PrPoint> = thresholds
            .iter()
            .map(|&threshold| {
                let matrix = count(&pairs, |pair| pair.confidence >= threshold);
                PrPoint {
                    threshold,
                    precision: matrix.precision(),
                    recall: matrix.recall(),
                    f1: matrix.f1(),
                }
            })
            .collect();

        let auc_points: Vec<(f64, f64)> =
            points.iter().map(|p| (p.recall, p.precision)).collect();
        let auc = trapezoid_auc(&auc_points);

        // Max F1; ties break toward higher precision, then higher recall.
        let optimal = points
            .iter()
            .max_by(|a, b| {
                a.f1.partial_cmp(&b.f1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        a.precision
                            .partial_cmp(&b.precision)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| {
                        a.recall
                            .partial_cmp(&b.recall)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            })
            .cloned()
            .ok_or_else(|| EvalError::InvalidInput("no thresholds supplied".into()))?;

        Ok(PrCurveData {
            points,
            auc,
            optimal_threshold: optimal.threshold,
            optimal_precision: optimal.precision,
            optimal_recall: optimal.recall,
            optimal_f1: optimal.f1,
        })
    }
}

/// Align predictions with ground truth by automation id. Unlabeled
/// predictions are dropped; labels without predictions contribute nothing.
fn align(
    predictions: &[Prediction],
    ground_truth: &[GroundTruthLabel],
) -> Result<Vec<Pair>, EvalError> {
    if predictions.is_empty() {
        return Err(EvalError::InvalidInput("no predictions supplied".into()));
    }
    if ground_truth.is_empty() {
        return Err(EvalError::InvalidInput("no ground truth supplied".into()));
    }
    for prediction in predictions {
        validate_unit("confidence", prediction.confidence)?;
    }
    for label in ground_truth {
        validate_unit("label confidence", label.confidence)?;
    }

    let by_id: HashMap<&str, &GroundTruthLabel> = ground_truth
        .iter()
        .map(|label| (label.automation_id.as_str(), label))
        .collect();

    Ok(predictions
        .iter()
        .filter_map(|prediction| {
            by_id.get(prediction.automation_id.as_str()).map(|label| Pair {
                confidence: prediction.confidence,
                actual_malicious: label.actual == ActualClass::Malicious,
                predicted: prediction.predicted,
            })
        })
        .collect())
}

fn count(pairs: &[Pair], classify: impl Fn(&Pair) -> bool) -> ConfusionMatrix {
    let mut matrix = ConfusionMatrix::default();
    for pair in pairs {
        match (classify(pair), pair.actual_malicious) {
            (true, true) => matrix.true_positives += 1,
            (true, false) => matrix.false_positives += 1,
            (false, false) => matrix.true_negatives += 1,
            (false, true) => matrix.false_negatives += 1,
        }
    }
    matrix
}

/// Distinct observed confidences plus the {0, 1} endpoints, sorted.
fn adaptive_thresholds(pairs: &[Pair]) -> Vec<f64> {
    let mut thresholds: Vec<f64> = pairs.iter().map(|pair| pair.confidence).collect();
    thresholds.push(0.0);
    thresholds.push(1.0);
    thresholds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    thresholds.dedup();
    thresholds
}

fn validate_unit(name: &str, value: f64) -> Result<(), EvalError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(EvalError::InvalidInput(format!(
            "{name} {value} outside [0, 1]"
        )));
    }
    Ok(())
}
