//! Deterministic exports of evaluation results.
//!
//! JSON exports round-trip exactly through serde. The CSV format is the
//! fixed `threshold,precision,recall,f1` table followed by `# AUC:`,
//! `# Optimal Threshold:`, and `# Optimal F1:` comment lines.

use crate::error::EvalError;
use crate::evaluator::PrCurveData;
use std::fmt::Write as _;

/// Serialize a PR curve to pretty JSON.
pub fn pr_curve_to_json(curve: &PrCurveData) -> Result<String, EvalError> {
    Ok(serde_json::to_string_pretty(curve)?)
}

/// Parse a PR curve back from its JSON export.
pub fn pr_curve_from_json(json: &str) -> Result<PrCurveData, EvalError> {
    Ok(serde_json::from_str(json)?)
}

/// Render a PR curve as CSV with the trailing summary comment lines.
pub fn pr_curve_to_csv(curve: &PrCurveData) -> String {
    let mut out = String::from("threshold,precision,recall,f1\n");
    for point in &curve.points {
        let _ = writeln!(
            out,
            "{:.4},{:.4},{:.4},{:.4}",
            point.threshold, point.precision, point.recall, point.f1
        );
    }
    let _ = writeln!(out, "# AUC: {:.4}", curve.auc);
    let _ = writeln!(out, "# Optimal Threshold: {:.4}", curve.optimal_threshold);
    let _ = writeln!(out, "# Optimal F1: {:.4}", curve.optimal_f1);
    out
}
