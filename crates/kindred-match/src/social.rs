//! Social graph overlap scoring.
//!
//! The storage layer counts logical communities two profiles co-occupy
//! (see `kindred_db::rooms`); this module turns that count into a
//! confidence contribution.

/// Confidence contribution for `shared` co-occupied communities:
/// `min(cap, shared x weight)` once the minimum is met, else nothing.
pub fn overlap_score(shared: i64, min_shared: i64, weight: f32, cap: f32) -> f32 {
    if shared >= min_shared {
        (shared as f32 * weight).min(cap)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_minimum_contributes_nothing() {
        assert_eq!(overlap_score(2, 3, 10.0, 80.0), 0.0);
        assert_eq!(overlap_score(0, 3, 10.0, 80.0), 0.0);
    }

    #[test]
    fn test_scales_linearly_above_minimum() {
        assert_eq!(overlap_score(3, 3, 10.0, 80.0), 30.0);
        assert_eq!(overlap_score(5, 3, 10.0, 80.0), 50.0);
    }

    #[test]
    fn test_capped_at_ceiling() {
        assert_eq!(overlap_score(8, 3, 10.0, 80.0), 80.0);
        assert_eq!(overlap_score(50, 3, 10.0, 80.0), 80.0);
    }
}
