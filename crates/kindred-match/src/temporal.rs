//! Temporal activity correlation.
//!
//! Each profile carries a 168-bucket hour-of-week histogram of message
//! activity. Two accounts operated by the same human tend to be active in
//! the same hours; Pearson correlation over the histograms captures that
//! without this core ever seeing message content.

/// Sum of observations in a histogram.
pub fn total_observations(histogram: &[i32]) -> i64 {
    histogram.iter().map(|&n| n as i64).sum()
}

/// Pearson correlation coefficient between two equal-length histograms.
///
/// Returns `None` when lengths differ or either histogram has zero
/// variance (a flat histogram correlates with everything spuriously).
pub fn pearson_correlation(a: &[i32], b: &[i32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let n = a.len() as f64;
    let mean_a = a.iter().map(|&x| x as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&x| x as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }

    Some((cov / (var_a.sqrt() * var_b.sqrt())) as f32)
}

/// Confidence contribution for a correlation value: `correlation x weight`
/// once it clears the floor, else nothing.
pub fn correlation_score(correlation: f32, floor: f32, weight: f32) -> f32 {
    if correlation >= floor {
        correlation * weight
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram_with(buckets: &[(usize, i32)]) -> Vec<i32> {
        let mut h = vec![0; 168];
        for &(idx, count) in buckets {
            h[idx] = count;
        }
        h
    }

    #[test]
    fn test_identical_histograms_correlate_perfectly() {
        let h = histogram_with(&[(9, 5), (10, 8), (20, 3)]);
        let corr = pearson_correlation(&h, &h).unwrap();
        assert!((corr - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_disjoint_histograms_correlate_negatively_or_weakly() {
        let a = histogram_with(&[(9, 10), (10, 10)]);
        let b = histogram_with(&[(150, 10), (151, 10)]);
        let corr = pearson_correlation(&a, &b).unwrap();
        assert!(corr < 0.1);
    }

    #[test]
    fn test_flat_histogram_has_no_correlation() {
        let flat = vec![0; 168];
        let active = histogram_with(&[(9, 5)]);
        assert!(pearson_correlation(&flat, &active).is_none());
        assert!(pearson_correlation(&flat, &flat).is_none());
    }

    #[test]
    fn test_length_mismatch_is_none() {
        assert!(pearson_correlation(&[1, 2], &[1, 2, 3]).is_none());
    }

    #[test]
    fn test_correlation_score_respects_floor() {
        assert_eq!(correlation_score(0.69, 0.7, 60.0), 0.0);
        assert!((correlation_score(0.9, 0.7, 60.0) - 54.0).abs() < 1e-4);
        assert!((correlation_score(1.0, 0.7, 60.0) - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_total_observations() {
        let h = histogram_with(&[(0, 3), (167, 4)]);
        assert_eq!(total_observations(&h), 7);
    }
}
