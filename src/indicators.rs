//! Numeric primitives for the breakout decision procedure
//!
//! Population standard deviation (volatility proxy) and rolling-high helpers.

use statrs::statistics::Statistics;

/// Population standard deviation (ddof = 0) of a window of values.
///
/// Returns 0.0 for windows with fewer than two values, where the deviation
/// is degenerate.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    Statistics::population_std_dev(values)
}

/// Highest high over a slice of values.
///
/// Returns None for an empty slice.
pub fn highest(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .fold(None, |max, &v| Some(max.map_or(v, |m: f64| m.max(v))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_population_std_dev_matches_numpy() {
        // numpy.std([1, 2, 3, 4]) == 1.118033988749895
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(
            population_std_dev(&values),
            1.118033988749895,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_population_std_dev_constant_series_is_zero() {
        let values = vec![42.0; 30];
        assert_eq!(population_std_dev(&values), 0.0);
    }

    #[test]
    fn test_population_std_dev_degenerate_windows() {
        assert_eq!(population_std_dev(&[]), 0.0);
        assert_eq!(population_std_dev(&[7.0]), 0.0);
    }

    #[test]
    fn test_highest() {
        assert_eq!(highest(&[1.0, 5.0, 3.0]), Some(5.0));
        assert_eq!(highest(&[]), None);
    }
}
