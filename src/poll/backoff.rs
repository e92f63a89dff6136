//! Staged poll interval table.

use std::time::Duration;

use crate::error::LapseError;

/// Maps an attempt count to a multiple of the base poll interval.
///
/// `thresholds[i]` is the first attempt count that uses `multipliers[i + 1]`;
/// counts below `thresholds[0]` use `multipliers[0]`.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use lapse::poll::BackoffSchedule;
///
/// let schedule = BackoffSchedule::default();
/// let base = Duration::from_millis(15_000);
/// assert_eq!(schedule.interval_for(base, 4), Duration::from_millis(15_000));
/// assert_eq!(schedule.interval_for(base, 5), Duration::from_millis(30_000));
/// assert_eq!(schedule.interval_for(base, 20), Duration::from_millis(120_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    thresholds: Vec<u32>,
    multipliers: Vec<u32>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            thresholds: vec![5, 10, 20],
            multipliers: vec![1, 2, 4, 8],
        }
    }
}

impl BackoffSchedule {
    /// Build a schedule, rejecting tables that would shrink the interval or
    /// leave an attempt count without a multiplier.
    pub fn new(thresholds: Vec<u32>, multipliers: Vec<u32>) -> Result<Self, LapseError> {
        if multipliers.len() != thresholds.len() + 1 {
            return Err(LapseError::Configuration(format!(
                "backoff needs {} multipliers for {} thresholds, got {}",
                thresholds.len() + 1,
                thresholds.len(),
                multipliers.len()
            )));
        }
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(LapseError::Configuration(
                "backoff thresholds must be strictly ascending".to_string(),
            ));
        }
        if multipliers.iter().any(|m| *m == 0) {
            return Err(LapseError::Configuration(
                "backoff multipliers must be at least 1".to_string(),
            ));
        }
        if multipliers.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(LapseError::Configuration(
                "backoff multipliers must not decrease".to_string(),
            ));
        }
        Ok(Self {
            thresholds,
            multipliers,
        })
    }

    pub fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    pub fn multipliers(&self) -> &[u32] {
        &self.multipliers
    }

    pub fn multiplier_for(&self, attempt_count: u32) -> u32 {
        let stage = self
            .thresholds
            .iter()
            .take_while(|threshold| attempt_count >= **threshold)
            .count();
        self.multipliers
            .get(stage)
            .or_else(|| self.multipliers.last())
            .copied()
            .unwrap_or(1)
    }

    pub fn interval_for(&self, base: Duration, attempt_count: u32) -> Duration {
        base.saturating_mul(self.multiplier_for(attempt_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_boundaries() {
        let schedule = BackoffSchedule::default();
        let cases = [
            (0, 1),
            (4, 1),
            (5, 2),
            (9, 2),
            (10, 4),
            (19, 4),
            (20, 8),
            (500, 8),
        ];
        for (attempt, expected) in cases {
            assert_eq!(schedule.multiplier_for(attempt), expected, "attempt {attempt}");
        }
    }

    #[test]
    fn interval_is_monotonic_in_attempts() {
        let schedule = BackoffSchedule::default();
        let base = Duration::from_millis(15_000);
        let intervals: Vec<_> = (0..40).map(|n| schedule.interval_for(base, n)).collect();
        assert!(intervals.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn custom_table_is_honoured() {
        let schedule = BackoffSchedule::new(vec![2], vec![1, 3]).unwrap();
        let base = Duration::from_secs(1);
        assert_eq!(schedule.interval_for(base, 1), Duration::from_secs(1));
        assert_eq!(schedule.interval_for(base, 2), Duration::from_secs(3));
    }

    #[test]
    fn empty_thresholds_mean_a_flat_interval() {
        let schedule = BackoffSchedule::new(vec![], vec![3]).unwrap();
        assert_eq!(schedule.multiplier_for(0), 3);
        assert_eq!(schedule.multiplier_for(1000), 3);
    }

    #[test]
    fn invalid_tables_are_rejected() {
        assert!(BackoffSchedule::new(vec![5, 10], vec![1, 2]).is_err());
        assert!(BackoffSchedule::new(vec![10, 5], vec![1, 2, 4]).is_err());
        assert!(BackoffSchedule::new(vec![5, 5], vec![1, 2, 4]).is_err());
        assert!(BackoffSchedule::new(vec![5], vec![0, 2]).is_err());
        assert!(BackoffSchedule::new(vec![5], vec![4, 2]).is_err());
    }
}
