//! Singura evaluation — the feedback and measurement side of the detection
//! engine.
//!
//! - **Feedback ingestion:** analyst verdicts become ground-truth labels
//!   (with a reviewer floor) or preserved correction deltas
//! - **Threshold tuning:** bounded per-tenant threshold proposals derived
//!   from accumulated labels, clipped to ±25% per cycle
//! - **Evaluation:** confusion matrices, precision/recall/F1, PR curves
//!   with trapezoidal AUC, and F1-optimal threshold selection
//! - **Exports:** deterministic JSON and CSV, plus newline-delimited JSON
//!   for bulk label consumption

pub mod error;
pub mod evaluator;
pub mod export;
pub mod feedback;
pub mod tuner;

// Re-exports for convenience
pub use error::EvalError;
pub use evaluator::{ConfusionMatrix, Evaluator, PrCurveData, PrPoint, Prediction};
pub use export::{pr_curve_from_json, pr_curve_to_csv, pr_curve_to_json};
pub use feedback::{
    ActualClass, AutomationFeedback, CorrectionDelta, FeedbackIngestor, FeedbackType,
    GroundTruthLabel, IngestOutcome, Sentiment,
};
pub use tuner::{ThresholdProposal, ThresholdTuner};
