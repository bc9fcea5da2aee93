//! Singura detection — the shadow-AI detection engine.
//!
//! Consumes normalized audit events and emits two kinds of findings:
//!
//! - **Activity patterns:** statistical anomalies (inhuman velocity,
//!   metronomic timing, off-hours bursts, batched operations, permission
//!   escalation, exfiltration-scale downloads)
//! - **Automation signatures:** multi-method evidence that a specific AI
//!   provider is being called, with model extraction
//!
//! The engine fans detectors out concurrently over one read-only batch,
//! reads per-organization thresholds from the store, and fuses everything
//! into a `DetectionResult` with an overall risk score.

pub mod detector;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod providers;
pub mod risk;
pub mod thresholds;

// Re-exports for convenience
pub use detector::PatternDetector;
pub use detectors::{
    BatchOperationDetector, DataVolumeDetector, OffHoursDetector, PermissionEscalationDetector,
    TimingVarianceDetector, VelocityDetector,
};
pub use engine::{DetectionEngine, DetectionOutcome};
pub use error::{DetectError, ThresholdLoadError};
pub use providers::{DetectionInput, ProviderDetector};
pub use risk::{fuse_overall_risk, indicators_from_signatures};
pub use thresholds::{NullThresholdLoader, ThresholdLoader, ThresholdStore};
