//! Linear interpolation and nearest-neighbour bracketing over sorted 1-D arrays.
//!
//! Every lookup in the isochrone layer (age, mass, metallicity) reduces to:
//!
//! 1. find the two stored values that bracket the requested one
//! 2. linearly interpolate the tabulated quantity between them
//!
//! Bracketing never indexes past either end of the array. Values outside the
//! array's range are reported as [`BracketError::OutOfRange`] so that callers can
//! turn them into "impossible under this model" instead of guessing.

use thiserror::Error;

/// Two-point linear interpolation.
///
/// Written as `y_lo·(1−t) + y_hi·t` so that `x == x_lo` returns `y_lo` and
/// `x == x_hi` returns `y_hi` exactly. Produces NaN when `x_hi == x_lo`; callers
/// must not pass a degenerate pair.
pub fn linear_interp(x: f64, lo: (f64, f64), hi: (f64, f64)) -> f64 {
    let (x_lo, y_lo) = lo;
    let (x_hi, y_hi) = hi;
    let t = (x - x_lo) / (x_hi - x_lo);
    y_lo * (1.0 - t) + y_hi * t
}

/// A pair of stored values enclosing a requested value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lower: f64,
    pub upper: f64,
    pub lower_index: usize,
    pub upper_index: usize,
}

impl Bracket {
    /// True when the requested value matched a stored value exactly.
    pub fn is_exact(&self) -> bool {
        self.lower_index == self.upper_index
    }

    /// Interpolate `ys` (aligned with the bracketed array) at `x`.
    ///
    /// Returns `None` if either index is outside `ys`.
    pub fn interpolate(&self, x: f64, ys: &[f64]) -> Option<f64> {
        let y_lo = *ys.get(self.lower_index)?;
        if self.is_exact() {
            return Some(y_lo);
        }
        let y_hi = *ys.get(self.upper_index)?;
        Some(linear_interp(x, (self.lower, y_lo), (self.upper, y_hi)))
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum BracketError {
    #[error("cannot bracket a value in an empty array")]
    Empty,
    #[error("cannot bracket non-finite value {0}")]
    NonFinite(f64),
    #[error("value {value} outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

/// Find the stored values that bracket `value` in an ascending array.
///
/// - strictly between two adjacent elements: returns exactly those two
/// - equal to a stored element: returns a degenerate bracket on that element
///   (`lower == upper`, same index)
/// - outside `[sorted[0], sorted[n-1]]`: [`BracketError::OutOfRange`]
///
/// With repeated values the lower bound is the last copy below `value` and the
/// upper bound the first copy above it, so `lower < value < upper` always holds
/// for non-exact brackets.
pub fn find_closest_bracket(value: f64, sorted: &[f64]) -> Result<Bracket, BracketError> {
    if !value.is_finite() {
        return Err(BracketError::NonFinite(value));
    }
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Err(BracketError::Empty);
    };
    if value < min || value > max {
        return Err(BracketError::OutOfRange { value, min, max });
    }

    debug_assert!(
        sorted.windows(2).all(|w| w[0] <= w[1]),
        "find_closest_bracket requires an ascending array"
    );

    // First element >= value. Exists because value <= max.
    let upper_index = sorted.partition_point(|&x| x < value);
    let upper = sorted[upper_index];

    if upper == value {
        return Ok(Bracket {
            lower: upper,
            upper,
            lower_index: upper_index,
            upper_index,
        });
    }

    // upper > value >= min, so upper_index > 0.
    let lower_index = upper_index - 1;
    Ok(Bracket {
        lower: sorted[lower_index],
        upper,
        lower_index,
        upper_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_interp_reproduces_endpoints() {
        let pairs = [(0.1, 0.3, 1.7, -2.2), (8.0, 9.0, 5.0, 4.0), (-1.0, 2.5, 0.1, 0.3)];
        for (x0, x1, y0, y1) in pairs {
            assert_eq!(linear_interp(x0, (x0, y0), (x1, y1)), y0);
            assert_eq!(linear_interp(x1, (x0, y0), (x1, y1)), y1);
        }
    }

    #[test]
    fn linear_interp_midpoint() {
        let y = linear_interp(1.25, (1.0, 4.0), (1.5, 3.0));
        assert_eq!(y, 3.5);
    }

    #[test]
    fn bracket_strictly_between_adjacent_elements() {
        let sorted = [0.1, 0.5, 0.9, 1.4, 2.0, 7.5];
        for i in 0..sorted.len() - 1 {
            for frac in [0.01, 0.3, 0.5, 0.77, 0.99] {
                let v = sorted[i] + frac * (sorted[i + 1] - sorted[i]);
                let b = find_closest_bracket(v, &sorted).unwrap();
                assert_eq!((b.lower, b.upper), (sorted[i], sorted[i + 1]), "value {v}");
                assert_eq!((b.lower_index, b.upper_index), (i, i + 1));
            }
        }
    }

    #[test]
    fn bracket_exact_matches_are_degenerate() {
        let sorted = [8.0, 8.5, 9.0];
        for (i, &v) in sorted.iter().enumerate() {
            let b = find_closest_bracket(v, &sorted).unwrap();
            assert!(b.is_exact());
            assert_eq!(b.lower_index, i);
            assert_eq!(b.lower, v);
        }
    }

    #[test]
    fn bracket_edges_and_errors() {
        let sorted = [1.0, 2.0];
        assert_eq!(
            find_closest_bracket(0.5, &sorted),
            Err(BracketError::OutOfRange {
                value: 0.5,
                min: 1.0,
                max: 2.0
            })
        );
        assert!(matches!(
            find_closest_bracket(2.5, &sorted),
            Err(BracketError::OutOfRange { .. })
        ));
        assert_eq!(find_closest_bracket(1.0, &[]), Err(BracketError::Empty));
        assert!(matches!(
            find_closest_bracket(f64::NAN, &sorted),
            Err(BracketError::NonFinite(_))
        ));

        // Single-element arrays bracket only their own value.
        let one = [3.0];
        assert!(find_closest_bracket(3.0, &one).unwrap().is_exact());
        assert!(find_closest_bracket(3.1, &one).is_err());
    }

    #[test]
    fn bracket_with_repeated_values_skips_duplicates() {
        let sorted = [1.0, 2.0, 2.0, 3.0];
        let b = find_closest_bracket(2.5, &sorted).unwrap();
        assert_eq!((b.lower_index, b.upper_index), (2, 3));
        let b = find_closest_bracket(1.5, &sorted).unwrap();
        assert_eq!((b.lower_index, b.upper_index), (0, 1));
    }

    #[test]
    fn bracket_interpolate_uses_aligned_values() {
        let xs = [0.5, 1.0, 1.5];
        let ys = [5.0, 4.0, 3.0];
        let b = find_closest_bracket(0.75, &xs).unwrap();
        assert_eq!(b.interpolate(0.75, &ys), Some(4.5));
        assert_eq!(b.interpolate(0.75, &ys[..1]), None);
    }
}
