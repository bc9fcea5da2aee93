//! Batch-operation detector — flags tight clusters of uniform, serially
//! named operations (the shape of a scripted loop over resources).

use crate::detector::PatternDetector;
use crate::detectors::{evidence_for, subject_for};
use crate::error::DetectError;
use async_trait::async_trait;
use serde_json::json;
use singura_core::config::{BatchConfig, BusinessHours};
use singura_core::event::{Event, group_by_user};
use singura_core::finding::{ActivityPattern, PatternType};
use singura_core::stats::temporal_clusters;
use singura_core::thresholds::ThresholdSet;

pub struct BatchOperationDetector {
    config: BatchConfig,
}

impl BatchOperationDetector {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }
}

impl Default for BatchOperationDetector {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

#[async_trait]
impl PatternDetector for BatchOperationDetector {
    fn name(&self) -> &str {
        "batch_operation"
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::BatchOperation
    }

    async fn detect(
        &self,
        events: &[Event],
        _thresholds: &ThresholdSet,
        _business_hours: &BusinessHours,
    ) -> Result<Vec<ActivityPattern>, DetectError> {
        let gap_ms = self.config.cluster_gap_secs as i64 * 1_000;
        let mut patterns = Vec::new();

        let mut users: Vec<_> = group_by_user(events).into_iter().collect();
        users.sort_by_key(|(user, _)| *user);

        for (_, mut user_events) in users {
            user_events.sort_by_key(|e| e.timestamp);
            let timestamps: Vec<_> = user_events.iter().map(|e| e.timestamp).collect();

            for (start, end) in temporal_clusters(&timestamps, gap_ms) {
                let cluster = &user_events[start..end];
                // Single-event clusters never fire; the configured minimum
                // is at least 3.
                if cluster.len() < self.config.min_cluster_size {
                    continue;
                }
                // A batch is one operation repeated, not a mixed burst.
                let event_type = &cluster[0].event_type;
                if !cluster.iter().all(|e| &e.event_type == event_type) {
                    continue;
                }

                let names: Vec<&str> = cluster
                    .iter()
                    .filter_map(|e| e.action_details.resource_name.as_deref())
                    .collect();
                // Missing names demote similarity to zero rather than guess.
                let similarity = if names.len() == cluster.len() {
                    naming_similarity(&names)
                } else {
                    0.0
                };
                if similarity < self.config.min_name_similarity {
                    continue;
                }

                let duration_ms =
                    (cluster[cluster.len() - 1].timestamp - cluster[0].timestamp).num_milliseconds();
                // Larger, more uniform clusters are more convincing.
                let confidence =
                    50.0 + (cluster.len() as f64 * 5.0).min(30.0) + similarity * 20.0;

                let subject = subject_for(cluster, event_type.as_str());
                let evidence = evidence_for(
                    format!(
                        "{} {} operations within {:.1}s, {:.0}% naming similarity",
                        cluster.len(),
                        event_type,
                        duration_ms as f64 / 1000.0,
                        similarity * 100.0
                    ),
                    vec![
                        ("cluster_size", json!(cluster.len())),
                        ("name_similarity", json!(similarity)),
                        ("duration_ms", json!(duration_ms)),
                    ],
                    cluster,
                );
                patterns.push(ActivityPattern::new(
                    PatternType::BatchOperation,
                    confidence,
                    subject,
                    evidence,
                ));
            }
        }

        Ok(patterns)
    }
}

/// Similarity of a resource-name set: shared prefix proportion, with a bonus
/// when every name is the prefix plus a numeric run (the `report-1`,
/// `report-2`, ... shape).
fn naming_similarity(names: &[&str]) -> f64 {
    if names.len() < 2 {
        return 0.0;
    }
    let stems: Vec<&str> = names.iter().map(|n| strip_extension(n)).collect();
    let prefix_len = common_prefix_len(&stems);
    if prefix_len == 0 {
        return 0.0;
    }

    let mean_len = stems.iter().map(|s| s.chars().count()).sum::<usize>() as f64
        / stems.len() as f64;
    let mut similarity = prefix_len as f64 / mean_len.max(1.0);

    let numeric_suffixes = stems.iter().all(|stem| {
        let suffix: String = stem.chars().skip(prefix_len).collect();
        !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
    });
    if numeric_suffixes {
        similarity += 0.3;
    }

    similarity.min(1.0)
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

fn common_prefix_len(names: &[&str]) -> usize {
    let first: Vec<char> = names[0].chars().collect();
    let mut len = first.len();
    for name in &names[1..] {
        let mut matched = 0;
        for (a, b) in first.iter().zip(name.chars()) {
            if *a == b && matched < len {
                matched += 1;
            } else {
                break;
            }
        }
        len = len.min(matched);
        if len == 0 {
            break;
        }
    }
    len
}
