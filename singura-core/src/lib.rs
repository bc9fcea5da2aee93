//! Singura core — the canonical data model and pure kernels of the
//! shadow-AI detection engine.
//!
//! This crate holds everything the detection and evaluation crates share:
//!
//! - **Event model:** the normalized `Event` every detector consumes, plus
//!   the `AIActivity` view for AI-platform feeds
//! - **Normalizer:** per-platform audit-record mapping with drop counting
//! - **Findings:** `ActivityPattern`, `AutomationSignature`, `RiskIndicator`,
//!   and the fused `DetectionResult`
//! - **Thresholds:** the per-organization `ThresholdSet` with defaults and
//!   validation
//! - **Statistical kernels:** mean/variance/CV, trapezoidal AUC, daily
//!   baselines, temporal clustering
//!
//! Everything here is pure over its inputs; I/O belongs to the surrounding
//! transport and persistence layers.

pub mod config;
pub mod error;
pub mod event;
pub mod finding;
pub mod metrics;
pub mod normalize;
pub mod stats;
pub mod thresholds;

// Re-exports for convenience
pub use config::{BatchConfig, BusinessHours, DetectionConfig};
pub use error::{CoreError, NormalizeError};
pub use event::{ActionDetails, AIActivity, Event, EventType, ResourceType, group_by_user};
pub use finding::{
    ActivityPattern, AiProvider, AutomationSignature, ComplianceImpact, DetectionMethod,
    DetectionResult, PatternEvidence, PatternSubject, PatternType, RiskIndicator, RiskLevel,
    SignatureIndicators, SignatureMetadata, clamp_confidence,
};
pub use metrics::{DetectionMetrics, NormalizerStats};
pub use normalize::{NormalizedRecord, Normalizer, Platform};
pub use thresholds::{
    DataVolumeThresholds, EscalationThresholds, OffHoursThresholds, ThresholdSet, ThresholdSource,
    TimingThresholds, VelocityThresholds,
};
