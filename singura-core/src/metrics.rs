//! Observability counters for detection passes.
//!
//! Plain single-writer structs; the transport layer consumes snapshots.
//! No metrics framework is wired in here.

use serde::Serialize;
use std::collections::HashMap;

/// Counters accumulated by the normalizer over one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizerStats {
    /// Records successfully mapped onto `Event`.
    pub normalized: u64,
    /// Records dropped for missing required fields.
    pub dropped_invalid: u64,
    /// Events emitted with an out-of-set event type.
    pub coerced_unknown: u64,
}

impl NormalizerStats {
    pub fn record_normalized(&mut self) {
        self.normalized += 1;
    }

    pub fn record_dropped(&mut self) {
        self.dropped_invalid += 1;
    }

    pub fn record_coerced(&mut self) {
        self.coerced_unknown += 1;
    }
}

/// Per-pass counters published alongside every `DetectionResult`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionMetrics {
    /// Events the pass consumed.
    pub events_processed: u64,
    /// Invalid records dropped upstream by the normalizer, when known.
    pub dropped_invalid: u64,
    /// Patterns or signatures emitted, keyed by detector name.
    pub detector_hits: HashMap<String, u64>,
    /// Detectors that returned empty for insufficient data.
    pub detectors_skipped: u64,
    /// Detectors that faulted; their slots stay empty.
    pub detector_errors: u64,
}

impl DetectionMetrics {
    pub fn record_hits(&mut self, detector: &str, hits: u64) {
        if hits == 0 {
            self.detectors_skipped += 1;
        } else {
            *self.detector_hits.entry(detector.to_string()).or_insert(0) += hits;
        }
    }

    pub fn record_error(&mut self) {
        self.detector_errors += 1;
    }

    /// Total findings across all detectors.
    pub fn total_hits(&self) -> u64 {
        self.detector_hits.values().sum()
    }
}
