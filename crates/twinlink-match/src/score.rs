// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Score arithmetic.

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compatibility score from cosine distance: `clamp(1 - d/2, 0, 1)`,
/// i.e. `(cosine + 1) / 2`, rounded to two decimals.
pub fn score_from_distance(distance: f32) -> f64 {
    round2((1.0 - f64::from(distance) / 2.0).clamp(0.0, 1.0))
}

/// Blend a stored score with a conversation's compatibility estimate.
pub fn blend(score: f64, estimate: f64) -> f64 {
    round2(((score + estimate) / 2.0).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn known_points() {
        assert_eq!(score_from_distance(0.0), 1.0);
        assert_eq!(score_from_distance(1.0), 0.5);
        assert_eq!(score_from_distance(2.0), 0.0);
        assert_eq!(score_from_distance(0.5), 0.75);
        assert_eq!(score_from_distance(-0.1), 1.0);
        assert_eq!(score_from_distance(3.0), 0.0);
    }

    #[test]
    fn blend_averages() {
        assert_eq!(blend(0.8, 0.6), 0.7);
        assert_eq!(blend(0.9, 1.0), 0.95);
    }

    proptest! {
        #[test]
        fn score_is_bounded_with_two_decimals(d in -1.0f32..3.0) {
            let s = score_from_distance(d);
            prop_assert!((0.0..=1.0).contains(&s));
            prop_assert!(((s * 100.0).round() - s * 100.0).abs() < 1e-9);
        }

        #[test]
        fn score_decreases_with_distance(a in 0.0f32..2.0, b in 0.0f32..2.0) {
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(score_from_distance(near) >= score_from_distance(far));
        }
    }
}
