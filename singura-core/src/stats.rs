//! Statistical kernels — pure, deterministic numeric routines shared by the
//! detectors and the evaluator.
//!
//! Empty input yields zero for mean and variance; callers guard median.
//! No routine here allocates beyond its output or reads a clock.

use chrono::{DateTime, Utc};

/// Arithmetic mean. Empty input yields 0.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample variance (n-1 denominator). Fewer than two points yields 0.
pub fn variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

/// Sample standard deviation.
pub fn std_deviation(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// Median of a sample. `None` for empty input.
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Coefficient of variation: stdDev / mean when mean > 0, else 0.
///
/// Dimensionless dispersion; near-zero CV over inter-event intervals is the
/// metronomic-automation signal.
pub fn coefficient_of_variation(data: &[f64]) -> f64 {
    let m = mean(data);
    if m > 0.0 { std_deviation(data) / m } else { 0.0 }
}

/// Trapezoidal area under a curve of `(x, y)` points.
///
/// Points are sorted by `x` internally; duplicate-`x` runs contribute
/// zero-width segments and therefore no area. Result is clamped to [0, 1]
/// for the precision-recall use where both axes live in the unit square.
pub fn trapezoid_auc(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut area = 0.0;
    for pair in sorted.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        area += (x1 - x0) * (y0 + y1) / 2.0;
    }
    area.clamp(0.0, 1.0)
}

/// Rolling per-day baseline over a window of daily totals.
///
/// The data-volume detector feeds it the previous N days of per-user byte
/// totals and compares today against `mean + multiplier` bounds.
#[derive(Debug, Clone)]
pub struct DailyBaseline {
    pub days: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl DailyBaseline {
    /// Build a baseline from daily totals. Days with no activity must be
    /// passed as explicit zeros by the caller if they are to count.
    pub fn from_daily_totals(totals: &[f64]) -> Self {
        Self {
            days: totals.len(),
            mean: mean(totals),
            std_dev: std_deviation(totals),
        }
    }

    /// Whether the baseline has enough history to be meaningful.
    pub fn is_established(&self, min_days: usize) -> bool {
        self.days >= min_days
    }

    /// Whether `observed` exceeds `multiplier` times the baseline mean.
    pub fn is_abnormal(&self, observed: f64, multiplier: f64) -> bool {
        self.mean > 0.0 && observed > self.mean * multiplier
    }
}

/// Split sorted timestamps into temporal clusters: consecutive events more
/// than `max_gap_ms` apart start a new cluster.
///
/// Returns index ranges into the input. Input must already be sorted
/// ascending; the caller owns that invariant.
pub fn temporal_clusters(timestamps: &[DateTime<Utc>], max_gap_ms: i64) -> Vec<(usize, usize)> {
    if timestamps.is_empty() {
        return Vec::new();
    }
    let mut clusters = Vec::new();
    let mut start = 0usize;
    for i in 1..timestamps.len() {
        let gap = (timestamps[i] - timestamps[i - 1]).num_milliseconds();
        if gap > max_gap_ms {
            clusters.push((start, i));
            start = i;
        }
    }
    clusters.push((start, timestamps.len()));
    clusters
}

/// Inter-event intervals in milliseconds, dropping gaps longer than
/// `max_interval_ms` (long gaps split sequences rather than inflate them).
pub fn bounded_intervals_ms(timestamps: &[DateTime<Utc>], max_interval_ms: i64) -> Vec<f64> {
    timestamps
        .windows(2)
        .filter_map(|pair| {
            let gap = (pair[1] - pair[0]).num_milliseconds();
            (gap >= 0 && gap <= max_interval_ms).then_some(gap as f64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(offset_ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(offset_ms)
    }

    #[test]
    fn test_mean_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(variance(&[]), 0.0);
    }

    #[test]
    fn test_mean_and_variance() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&data) - 5.0).abs() < 1e-9);
        // Sample variance with n-1 denominator.
        assert!((variance(&data) - 4.571_428_571).abs() < 1e-6);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0]), Some(3.0));
        assert_eq!(median(&[1.0, 3.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_cv_zero_mean() {
        assert_eq!(coefficient_of_variation(&[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[]), 0.0);
    }

    #[test]
    fn test_cv_metronomic_is_near_zero() {
        let intervals = [1100.0, 1100.0, 1100.0, 1100.0, 1100.0];
        assert!(coefficient_of_variation(&intervals) < 1e-9);
    }

    #[test]
    fn test_cv_human_jitter_is_large() {
        let intervals = [1200.0, 800.0, 2100.0, 1500.0, 900.0];
        assert!(coefficient_of_variation(&intervals) > 0.3);
    }

    #[test]
    fn test_trapezoid_auc_unit_square() {
        // Constant precision 1.0 across the full recall range.
        let points = [(0.0, 1.0), (0.5, 1.0), (1.0, 1.0)];
        assert!((trapezoid_auc(&points) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trapezoid_auc_degenerate_runs() {
        // Duplicate recall values contribute no width.
        let points = [(0.0, 1.0), (0.5, 1.0), (0.5, 0.5), (1.0, 0.5)];
        let auc = trapezoid_auc(&points);
        assert!(auc > 0.0 && auc <= 1.0);
    }

    #[test]
    fn test_trapezoid_auc_too_few_points() {
        assert_eq!(trapezoid_auc(&[]), 0.0);
        assert_eq!(trapezoid_auc(&[(0.5, 0.5)]), 0.0);
    }

    #[test]
    fn test_daily_baseline() {
        let totals = vec![5.0 * 1024.0 * 1024.0; 7];
        let baseline = DailyBaseline::from_daily_totals(&totals);
        assert!(baseline.is_established(7));
        assert!(!baseline.is_established(8));
        assert!(baseline.is_abnormal(250.0 * 1024.0 * 1024.0, 3.0));
        assert!(!baseline.is_abnormal(10.0 * 1024.0 * 1024.0, 3.0));
    }

    #[test]
    fn test_temporal_clusters_split_on_gap() {
        let timestamps = vec![ts(0), ts(1_000), ts(2_000), ts(60_000), ts(61_000)];
        let clusters = temporal_clusters(&timestamps, 10_000);
        assert_eq!(clusters, vec![(0, 3), (3, 5)]);
    }

    #[test]
    fn test_temporal_clusters_single_run() {
        let timestamps = vec![ts(0), ts(500), ts(900)];
        assert_eq!(temporal_clusters(&timestamps, 10_000), vec![(0, 3)]);
    }

    #[test]
    fn test_bounded_intervals_drop_long_gaps() {
        let timestamps = vec![ts(0), ts(1_000), ts(100_000), ts(101_000)];
        let intervals = bounded_intervals_ms(&timestamps, 10_000);
        assert_eq!(intervals, vec![1_000.0, 1_000.0]);
    }
}
