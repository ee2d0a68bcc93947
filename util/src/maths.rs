//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
///
/// The target range may be inverted (`target_range.0 > target_range.1`), in which case the
/// mapping is inverted too. No clamping is performed.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Clamp a value between the two bounds, which may be given in either order.
pub fn clamp<T>(value: T, bound_a: T, bound_b: T) -> T
where
    T: Float
{
    let (min, max) = if bound_a <= bound_b {
        (bound_a, bound_b)
    }
    else {
        (bound_b, bound_a)
    };

    value.max(min).min(max)
}

/// Map a value from one range into another, clamping the result to the target range.
pub fn lin_map_clamped<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    clamp(
        lin_map(source_range, target_range, value),
        target_range.0,
        target_range.1
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 10f64), (0f64, 100f64), 5f64), 50f64);
        assert_eq!(lin_map((0f64, 1999f64), (1000f64, 2000f64), 1999f64), 2000f64);
        // Inverted target
        assert_eq!(lin_map((0f64, 10f64), (1500f64, 1000f64), 10f64), 1000f64);
        assert_eq!(lin_map((0f64, 10f64), (1500f64, 1000f64), 2f64), 1400f64);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5f64, 0f64, 1f64), 1f64);
        assert_eq!(clamp(-5f64, 0f64, 1f64), 0f64);
        assert_eq!(clamp(0.5f64, 1f64, 0f64), 0.5f64);
        assert_eq!(clamp(2f64, 1f64, 0f64), 1f64);
    }

    #[test]
    fn test_lin_map_clamped() {
        assert_eq!(lin_map_clamped((0f64, 10f64), (0f64, 100f64), 20f64), 100f64);
        assert_eq!(lin_map_clamped((0f64, 10f64), (1500f64, 1000f64), -3f64), 1500f64);
    }
}
