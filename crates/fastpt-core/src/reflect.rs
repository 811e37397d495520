//! Cosine/angle correction after a jump.
//!
//! A cosine that leaves [-1, 1] is folded back with a 4-periodic reflection
//! and its paired angle is rotated by a half-turn constant. One pass can
//! overshoot from above to below -1, so the lower fold runs a second time.

use crate::parameters::ParameterLayout;

/// Reduce `angle` to `[0, period)`.
pub fn wrap_angle(angle: f64, period: f64) -> f64 {
    let wrapped = angle.rem_euclid(period);
    // rem_euclid can round up to `period` for tiny negative inputs
    if wrapped >= period {
        0.0
    } else {
        wrapped
    }
}

/// Fold `cosine` back into [-1, 1], rotating `angle` by `rotation` on each
/// fold, and return the corrected pair with the angle in `[0, period)`.
pub fn reflect_cosine(cosine: f64, angle: f64, rotation: f64, period: f64) -> (f64, f64) {
    let mut c = cosine;
    let mut a = angle;
    if c < -1.0 {
        c = -1.0 + (-(c + 1.0)).rem_euclid(4.0);
        a += rotation;
    }
    if c > 1.0 {
        c = 1.0 - (c - 1.0).rem_euclid(4.0);
        a += rotation;
    }
    if c < -1.0 {
        c = -1.0 + (-(c + 1.0)).rem_euclid(4.0);
        a += rotation;
    }
    (c, wrap_angle(a, period))
}

/// Correct the extrinsic cosine pairs and wrap the periodic coordinates.
pub fn correct_extrinsic(layout: &ParameterLayout, values: &mut [f64]) {
    for pair in layout.extrinsic_pairs() {
        let (c, a) = reflect_cosine(
            values[pair.cosine],
            values[pair.angle],
            pair.rotation,
            pair.period,
        );
        values[pair.cosine] = c;
        values[pair.angle] = a;
    }
    for coord in layout.periodic() {
        values[coord.index] = wrap_angle(values[coord.index], coord.period);
    }
}

/// Correct the cosine pairs of the shared intrinsic set.
pub fn correct_intrinsic(layout: &ParameterLayout, values: &mut [f64]) {
    for pair in layout.intrinsic_pairs() {
        let (c, a) = reflect_cosine(
            values[pair.cosine],
            values[pair.angle],
            pair.rotation,
            pair.period,
        );
        values[pair.cosine] = c;
        values[pair.angle] = a;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::LayoutBuilder;
    use is_close::is_close;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    #[test]
    fn test_inside_range_is_untouched() {
        let (c, a) = reflect_cosine(0.3, 1.0, PI, 2.0 * PI);
        assert_eq!(c, 0.3);
        assert_eq!(a, 1.0);
    }

    #[test]
    fn test_single_fold_above() {
        let (c, a) = reflect_cosine(1.2, 0.5, PI / 2.0, PI);
        assert!(is_close!(c, 0.8));
        assert!(is_close!(a, 0.5 + PI / 2.0));
    }

    #[test]
    fn test_single_fold_below() {
        let (c, a) = reflect_cosine(-1.5, 6.0, PI, 2.0 * PI);
        assert!(is_close!(c, -0.5));
        assert!(is_close!(a, 6.0 + PI - 2.0 * PI));
    }

    #[test]
    fn test_double_fold() {
        // -1 + 3.5 = 2.5 after the first fold, then 1 - 1.5 = -0.5
        let (c, a) = reflect_cosine(-4.5, 0.0, PI, 2.0 * PI);
        assert!(is_close!(c, -0.5));
        assert!(a.abs() < 1e-12);
    }

    #[test]
    fn test_tiny_negative_angle_wraps_into_range() {
        let a = wrap_angle(-1e-18, 2.0 * PI);
        assert!((0.0..2.0 * PI).contains(&a));
    }

    #[test]
    fn test_layout_corrections() {
        let mut builder = LayoutBuilder::new();
        builder
            .shared_intrinsic("cos_theta")
            .shared_intrinsic("phi")
            .extrinsic("cos_inc")
            .extrinsic("psi")
            .extrinsic("phase0")
            .cosine_pair("cos_theta", "phi", PI, 2.0 * PI)
            .cosine_pair("cos_inc", "psi", PI / 2.0, PI)
            .periodic("phase0", 2.0 * PI);
        let layout = builder.build().unwrap();

        let mut values = [1.5, 1.0, -1.25, 3.0, 7.0];
        correct_extrinsic(&layout, &mut values);
        assert_eq!(values[0], 1.5);
        assert!(is_close!(values[2], -0.75));
        assert!(is_close!(values[3], (3.0 + PI / 2.0) - PI));
        assert!(is_close!(values[4], 7.0 - 2.0 * PI));

        correct_intrinsic(&layout, &mut values);
        assert!(is_close!(values[0], 0.5));
        assert!(is_close!(values[1], 1.0 + PI));
    }

    proptest! {
        #[test]
        fn prop_reflection_lands_in_range(
            cosine in -5.0f64..5.0,
            angle in 0.0f64..(4.0 * PI),
        ) {
            for (rotation, period) in [(PI / 2.0, PI), (PI, 2.0 * PI)] {
                let (c, a) = reflect_cosine(cosine, angle, rotation, period);
                prop_assert!((-1.0..=1.0).contains(&c), "cosine {} -> {}", cosine, c);
                prop_assert!(a >= 0.0 && a < period, "angle {} -> {}", angle, a);
            }
        }

        #[test]
        fn prop_reflection_preserves_in_range_cosine(
            cosine in -1.0f64..=1.0,
            angle in 0.0f64..PI,
        ) {
            let (c, a) = reflect_cosine(cosine, angle, PI / 2.0, PI);
            prop_assert_eq!(c, cosine);
            prop_assert_eq!(a, angle);
        }
    }
}
