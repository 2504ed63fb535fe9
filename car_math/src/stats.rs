//! Missing-aware aggregation helpers
//!
//! Two different missingness rules live here and they must not be mixed up:
//!
//! - [`sum_all`] is strict: one missing input makes the whole sum missing.
//!   This is the rule for summing abnormal returns over a CAR window.
//! - [`mean_present`] skips missing inputs and only returns `None` when
//!   nothing is left. This is the rule for averaging CARs across events.

use crate::{MathError, Result};
use std::cmp::Ordering;

/// Sum every value, or `None` if any value is missing or non-finite, or
/// the sum itself overflows.
pub fn sum_all<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut total = 0.0;
    for value in values {
        match value {
            Some(v) if v.is_finite() => total += v,
            _ => return None,
        }
    }
    finite(total)
}

/// Arithmetic mean of the present, finite values.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Arithmetic mean of a slice, `None` when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Turn non-finite values into missing ones.
pub fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Assign each value to one of `bins` equal-count quantile bins.
///
/// Bins are labelled `1..=bins`, 1 holding the smallest values. The
/// assignment is rank based: values are ordered ascending (ties keep their
/// input order) and the value at rank `r` goes to bin `r * bins / n + 1`.
/// Every bin therefore holds `floor(n / bins)` or `ceil(n / bins)` values,
/// and when `n < bins` the upper labels are simply skipped.
///
/// The returned vector is aligned with the input.
pub fn quantile_bins(values: &[f64], bins: usize) -> Result<Vec<usize>> {
    if bins == 0 {
        return Err(MathError::InvalidInput(
            "Number of bins must be positive".to_string(),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput(
            "Quantile bins require finite values".to_string(),
        ));
    }

    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    // sort_by is stable, so equal values keep their input order
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut labels = vec![0; n];
    for (rank, &idx) in order.iter().enumerate() {
        labels[idx] = rank * bins / n + 1;
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_sum_all_propagates_missing() {
        assert_relative_eq!(sum_all(vec![Some(0.01), Some(0.02)]).unwrap(), 0.03, epsilon = 1e-12);
        assert_eq!(sum_all(vec![Some(0.01), None, Some(0.02)]), None);
        assert_eq!(sum_all(vec![Some(f64::NAN)]), None);
        // empty window sums to zero; windows reject empty offset sets upstream
        assert_eq!(sum_all(Vec::new()), Some(0.0));
    }

    #[test]
    fn test_sum_all_overflow_is_missing() {
        assert_eq!(sum_all(vec![Some(1e308), Some(1e308), Some(0.0)]), None);
        assert_eq!(sum_all(vec![Some(-1e308), Some(-1e308)]), None);
    }

    #[test]
    fn test_mean_present_skips_missing() {
        let mean = mean_present(vec![Some(0.01), None, Some(0.03)]).unwrap();
        assert_relative_eq!(mean, 0.02, epsilon = 1e-12);

        assert_eq!(mean_present(vec![None, None]), None);
        assert_eq!(mean_present(Vec::new()), None);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_relative_eq!(mean(&[0.01, -0.02, 0.03]).unwrap(), 0.02 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_finite() {
        assert_eq!(finite(1.5), Some(1.5));
        assert_eq!(finite(f64::INFINITY), None);
        assert_eq!(finite(f64::NEG_INFINITY), None);
        assert_eq!(finite(f64::NAN), None);
    }

    #[rstest]
    #[case(10)]
    #[case(11)]
    #[case(23)]
    #[case(99)]
    #[case(100)]
    fn test_quantile_bins_equal_count(#[case] n: usize) {
        // deterministic but unsorted input
        let values: Vec<f64> = (0..n).map(|i| ((i * 37) % n) as f64 - 3.5).collect();
        let labels = quantile_bins(&values, 10).unwrap();

        let lo = n / 10;
        let hi = (n + 9) / 10;
        for bin in 1..=10 {
            let count = labels.iter().filter(|&&l| l == bin).count();
            assert!(count == lo || count == hi, "bin {} had {} of {}", bin, count, n);
        }
    }

    #[test]
    fn test_quantile_bins_ordering() {
        let values = vec![0.5, -0.2, 0.1, 0.9, -0.7, 0.0, 0.3, 0.4, -0.1, 0.8];
        let labels = quantile_bins(&values, 10).unwrap();

        assert_eq!(labels[4], 1); // -0.7 is the smallest
        assert_eq!(labels[3], 10); // 0.9 is the largest
        for i in 0..values.len() {
            for j in 0..values.len() {
                if values[i] < values[j] {
                    assert!(labels[i] <= labels[j]);
                }
            }
        }
    }

    #[test]
    fn test_quantile_bins_small_and_tied() {
        let labels = quantile_bins(&[0.2, 0.2, 0.2], 10).unwrap();
        assert_eq!(labels, vec![1, 4, 7]);

        assert!(quantile_bins(&[], 10).unwrap().is_empty());
        assert!(quantile_bins(&[1.0], 0).is_err());
        assert!(quantile_bins(&[f64::NAN], 10).is_err());
    }
}
