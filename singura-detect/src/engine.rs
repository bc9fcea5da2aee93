//! Detection engine — one pass over a batch of normalized events.
//!
//! Fans the batch out to the six pattern detectors and the AI-provider
//! matcher concurrently (all are pure over the shared slice), aggregates
//! their outputs in stable declaration order, derives risk indicators, and
//! fuses everything into the overall risk score. One detector's fault never
//! fails the pass; its slot stays empty and a counter increments.

use crate::detector::PatternDetector;
use crate::detectors::{
    BatchOperationDetector, DataVolumeDetector, OffHoursDetector, PermissionEscalationDetector,
    TimingVarianceDetector, VelocityDetector,
};
use crate::error::DetectError;
use crate::providers::ProviderDetector;
use crate::risk::{fuse_overall_risk, indicators_from_signatures};
use crate::thresholds::ThresholdStore;
use singura_core::config::{BusinessHours, DetectionConfig};
use singura_core::event::Event;
use singura_core::finding::DetectionResult;
use singura_core::metrics::DetectionMetrics;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A completed pass: the findings plus the observability counters the
/// transport layer publishes.
#[derive(Debug, serde::Serialize)]
pub struct DetectionOutcome {
    pub result: DetectionResult,
    pub metrics: DetectionMetrics,
}

/// The detection engine. Immutable after construction; safe to share across
/// passes and tenants.
pub struct DetectionEngine {
    config: DetectionConfig,
    store: Arc<ThresholdStore>,
    detectors: Vec<Arc<dyn PatternDetector>>,
    providers: Arc<ProviderDetector>,
}

impl DetectionEngine {
    pub fn new(store: Arc<ThresholdStore>) -> Self {
        Self::with_config(DetectionConfig::default(), store)
    }

    pub fn with_config(config: DetectionConfig, store: Arc<ThresholdStore>) -> Self {
        // Declaration order here is the stable aggregation order.
        let detectors: Vec<Arc<dyn PatternDetector>> = vec![
            Arc::new(VelocityDetector),
            Arc::new(TimingVarianceDetector),
            Arc::new(OffHoursDetector),
            Arc::new(BatchOperationDetector::new(config.batch.clone())),
            Arc::new(PermissionEscalationDetector),
            Arc::new(DataVolumeDetector),
        ];
        let providers = Arc::new(ProviderDetector::with_content_cap(config.max_content_bytes));
        Self {
            config,
            store,
            detectors,
            providers,
        }
    }

    /// Run one detection pass. On cancellation, partial results are
    /// discarded and never published.
    pub async fn detect_shadow_ai(
        &self,
        events: Vec<Event>,
        business_hours: &BusinessHours,
        organization_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DetectionOutcome, DetectError> {
        if cancel.is_cancelled() {
            return Err(DetectError::Cancelled);
        }
        if !self.config.enabled {
            return Ok(DetectionOutcome {
                result: DetectionResult {
                    activity_patterns: Vec::new(),
                    risk_indicators: Vec::new(),
                    overall_risk: 0.0,
                },
                metrics: DetectionMetrics::default(),
            });
        }

        let thresholds = self.store.get_for(organization_id).await;
        let events: Arc<Vec<Event>> = Arc::new(events);
        let hours = Arc::new(business_hours.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_detectors.max(1)));

        let mut handles = Vec::with_capacity(self.detectors.len());
        for detector in &self.detectors {
            let detector = detector.clone();
            let events = events.clone();
            let thresholds = thresholds.clone();
            let hours = hours.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let name = detector.name().to_string();

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| DetectError::Cancelled)?;
                if cancel.is_cancelled() {
                    return Err(DetectError::Cancelled);
                }
                detector.detect(&events, &thresholds, &hours).await
            });
            handles.push((name, handle));
        }

        let providers = self.providers.clone();
        let provider_events = events.clone();
        let provider_handle = tokio::spawn(async move { providers.detect(&provider_events) });

        let mut metrics = DetectionMetrics {
            events_processed: events.len() as u64,
            ..Default::default()
        };

        // Join in declaration order for reproducible aggregation.
        let mut patterns = Vec::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(found)) => {
                    metrics.record_hits(&name, found.len() as u64);
                    patterns.extend(found);
                }
                Ok(Err(DetectError::Cancelled)) => return Err(DetectError::Cancelled),
                Ok(Err(err)) => {
                    tracing::warn!(detector = %name, %err, "detector failed; slot left empty");
                    metrics.record_error();
                }
                Err(join_err) => {
                    tracing::warn!(detector = %name, %join_err, "detector task aborted");
                    metrics.record_error();
                }
            }
        }
        let signatures = match provider_handle.await {
            Ok(signatures) => {
                metrics.record_hits("ai_provider", signatures.len() as u64);
                signatures
            }
            Err(join_err) => {
                tracing::warn!(%join_err, "provider detector task aborted");
                metrics.record_error();
                Vec::new()
            }
        };

        if cancel.is_cancelled() {
            return Err(DetectError::Cancelled);
        }

        // Confidence out of range after clamping is a bug, not bad data.
        let pass_id = Uuid::new_v4();
        for pattern in &patterns {
            if !(0.0..=100.0).contains(&pattern.confidence) {
                return Err(DetectError::InvariantViolation {
                    pass_id: pass_id.to_string(),
                    message: format!(
                        "pattern {} confidence {} outside [0,100]",
                        pattern.pattern_id, pattern.confidence
                    ),
                });
            }
        }
        for signature in &signatures {
            if !(0.0..=100.0).contains(&signature.confidence) {
                return Err(DetectError::InvariantViolation {
                    pass_id: pass_id.to_string(),
                    message: format!(
                        "signature {} confidence {} outside [0,100]",
                        signature.signature_id, signature.confidence
                    ),
                });
            }
        }

        let risk_indicators = indicators_from_signatures(&signatures);
        let overall_risk = fuse_overall_risk(&patterns, &risk_indicators);

        Ok(DetectionOutcome {
            result: DetectionResult {
                activity_patterns: patterns,
                risk_indicators,
                overall_risk,
            },
            metrics,
        })
    }
}
