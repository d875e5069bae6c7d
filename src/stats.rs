//! Shared latency statistics: population standard
//! deviation ("jitter") and nearest-rank percentiles, used by both the ping
//! session and the bufferbloat orchestrator so the two don't each hand-roll
//! a slightly different definition.

use std::time::Duration;

/// Population standard deviation of `samples`, in the same units as the
/// input (sub-millisecond precision preserved via `f64` seconds).
#[must_use]
pub fn population_stddev(samples: &[Duration]) -> Duration {
    if samples.len() < 2 {
        return Duration::ZERO;
    }
    let secs: Vec<f64> = samples.iter().map(Duration::as_secs_f64).collect();
    let mean = secs.iter().sum::<f64>() / secs.len() as f64;
    let variance = secs.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / secs.len() as f64;
    Duration::from_secs_f64(variance.sqrt().max(0.0))
}

/// Nearest-rank percentile (`p` in `0.0..=100.0`) over `sorted`, which must
/// already be sorted ascending. Returns `None` for an empty input.
#[must_use]
pub fn nearest_rank_percentile(sorted: &[Duration], p: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[idx])
}

#[must_use]
pub fn mean(samples: &[Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let total: Duration = samples.iter().sum();
    Some(total / samples.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_statistics_scenario_jitter() {
        let samples = [10, 20, 30, 20, 20].map(|ms| Duration::from_millis(ms));
        let jitter = population_stddev(&samples);
        assert!((jitter.as_secs_f64() * 1000.0 - 6.32).abs() < 0.01);
    }

    #[test]
    fn single_sample_has_zero_stddev() {
        assert_eq!(population_stddev(&[Duration::from_millis(5)]), Duration::ZERO);
    }

    #[test]
    fn empty_input_has_no_percentile() {
        assert!(nearest_rank_percentile(&[], 50.0).is_none());
    }

    #[test]
    fn p50_of_five_sorted_samples() {
        let sorted = [10, 20, 20, 20, 30].map(Duration::from_millis);
        assert_eq!(nearest_rank_percentile(&sorted, 50.0), Some(Duration::from_millis(20)));
    }

    #[test]
    fn p99_of_five_sorted_samples_is_the_max() {
        let sorted = [10, 20, 20, 20, 30].map(Duration::from_millis);
        assert_eq!(nearest_rank_percentile(&sorted, 99.0), Some(Duration::from_millis(30)));
    }
}
