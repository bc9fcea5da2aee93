//! Pattern-detector capability — trait shared by all six statistical
//! detectors.
//!
//! Detectors are pure over the batch: they read the full event slice, the
//! active threshold set, and the tenant's business hours, and return their
//! patterns. They hold no cross-batch state and never mutate inputs, which
//! is what lets the engine fan them out concurrently over one shared slice.

use crate::error::DetectError;
use async_trait::async_trait;
use singura_core::config::BusinessHours;
use singura_core::event::Event;
use singura_core::finding::{ActivityPattern, PatternType};
use singura_core::thresholds::ThresholdSet;

/// The core trait for all pattern detectors.
#[async_trait]
pub trait PatternDetector: Send + Sync {
    /// Unique name for this detector (stable; used in metrics keys).
    fn name(&self) -> &str;

    /// The pattern type this detector emits.
    fn pattern_type(&self) -> PatternType;

    /// Analyze a batch and return zero or more patterns.
    ///
    /// Insufficient data is an empty result, not an error. Errors are
    /// reserved for genuine faults and are isolated by the engine.
    async fn detect(
        &self,
        events: &[Event],
        thresholds: &ThresholdSet,
        business_hours: &BusinessHours,
    ) -> Result<Vec<ActivityPattern>, DetectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopDetector;

    #[async_trait]
    impl PatternDetector for NoopDetector {
        fn name(&self) -> &str {
            "noop"
        }
        fn pattern_type(&self) -> PatternType {
            PatternType::Velocity
        }
        async fn detect(
            &self,
            _events: &[Event],
            _thresholds: &ThresholdSet,
            _business_hours: &BusinessHours,
        ) -> Result<Vec<ActivityPattern>, DetectError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_trait_object_usage() {
        let detector: Box<dyn PatternDetector> = Box::new(NoopDetector);
        let patterns = detector
            .detect(&[], &ThresholdSet::default(), &BusinessHours::default())
            .await
            .unwrap();
        assert!(patterns.is_empty());
        assert_eq!(detector.name(), "noop");
    }
}
