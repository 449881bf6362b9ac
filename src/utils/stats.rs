//! Descriptive statistics over `f64` slices
//!
//! All helpers ignore non-finite entries, so a column with gaps can be
//! summarized without a separate filtering pass.

use std::cmp::Ordering;

fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(f64::total_cmp);
    finite
}

/// Linear-interpolated percentile of an already sorted slice, `q` in [0, 100]
pub fn percentile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 100.0);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Linear-interpolated percentile, `q` in [0, 100]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    percentile_sorted(&finite_sorted(values), q)
}

/// Several percentiles from a single sort
pub fn percentiles(values: &[f64], qs: &[f64]) -> Vec<Option<f64>> {
    let sorted = finite_sorted(values);
    qs.iter().map(|&q| percentile_sorted(&sorted, q)).collect()
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

pub fn nan_mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Standard deviation with `ddof` delta degrees of freedom
pub fn nan_std(values: &[f64], ddof: usize) -> Option<f64> {
    let mean = nan_mean(values)?;
    let (sq, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), &v| (s + (v - mean).powi(2), c + 1));
    if count <= ddof {
        return None;
    }
    Some((sq / (count - ddof) as f64).sqrt())
}

/// Maximum over finite entries
pub fn nan_max(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

/// True when every value is within tolerance of the first one
///
/// Uses the same tolerance rule as `numpy.allclose`
/// (`|a - b| <= atol + rtol * |b|`, rtol 1e-5, atol 1e-8).
pub fn all_close(values: &[f64]) -> bool {
    const RTOL: f64 = 1e-5;
    const ATOL: f64 = 1e-8;

    let Some(&first) = values.first() else {
        return true;
    };
    values
        .iter()
        .all(|&v| (v - first).abs() <= ATOL + RTOL * first.abs())
}

/// Descending order with NaN after every number; a total order for `sort_by`
pub fn descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_linear() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        assert!((percentile(&values, 97.0).unwrap() - 4.88).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_percentile_ignores_nan() {
        let values = vec![f64::NAN, 10.0, 20.0, f64::NAN];
        assert_eq!(percentile(&values, 50.0), Some(15.0));
    }

    #[test]
    fn test_mean_std() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(nan_mean(&values), Some(5.0));
        assert!((nan_std(&values, 0).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(nan_std(&[1.0], 1), None);
    }

    #[test]
    fn test_all_close() {
        assert!(all_close(&[1.0, 1.0, 1.0 + 1e-9]));
        assert!(!all_close(&[1.0, 1.1]));
        assert!(all_close(&[]));
    }

    #[test]
    fn test_descending_puts_nan_last() {
        let mut values = vec![1.0, f64::NAN, 3.0, f64::NAN, 2.0];
        values.sort_by(|a, b| descending(*a, *b));
        assert_eq!(&values[..3], &[3.0, 2.0, 1.0]);
        assert!(values[3..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234_56, 4), 1.2346);
        assert_eq!(round_to(-0.5, 0), -1.0);
    }
}
