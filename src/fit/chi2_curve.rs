//! # Chi-squared curve container and shape analysis
//!
//! The [`Chi2Curve`] holds the full chi-squared-vs-redshift sequence a fit
//! produced, ordered by redshift. Beyond storage it exposes the two pieces
//! of shape analysis the rest of the crate needs:
//!
//! * the **global minimum** and a two-sided **Δchi² = 1 uncertainty
//!   interval** around it (linear interpolation between samples, grid
//!   spacing as the floor when the curve never rises by 1 inside the
//!   window), and
//! * **secondary local minima** within a prominence band of the global
//!   minimum — the line-misidentification degeneracies a caller or a human
//!   reviewer disambiguates. These are retained, never silently discarded.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// One sample of the goodness-of-fit curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chi2Point {
    pub z: f64,
    pub chi2: f64,
}

/// Two-sided redshift uncertainty, as absolute bounds around the best fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Ordered chi-squared-vs-redshift curve.
///
/// Invariants: points are sorted by strictly increasing redshift and every
/// chi-squared value is finite and non-negative. Construction through
/// [`Chi2Curve::from_points`] enforces both (duplicate redshifts keep the
/// lower chi-squared).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chi2Curve {
    points: Vec<Chi2Point>,
}

impl Chi2Curve {
    /// Build a curve from unordered samples.
    ///
    /// Non-finite or negative chi-squared samples are dropped; duplicates in
    /// redshift collapse to the lower chi-squared value.
    pub fn from_points(mut points: Vec<Chi2Point>) -> Self {
        points.retain(|p| p.z.is_finite() && p.chi2.is_finite() && p.chi2 >= 0.0);
        points.sort_by_key(|p| OrderedFloat(p.z));
        points.dedup_by(|b, a| {
            if a.z == b.z {
                if b.chi2 < a.chi2 {
                    a.chi2 = b.chi2;
                }
                true
            } else {
                false
            }
        });
        Self { points }
    }

    pub fn points(&self) -> &[Chi2Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the global minimum, or `None` for an empty curve.
    pub fn min_index(&self) -> Option<usize> {
        self.points
            .iter()
            .position_min_by_key(|p| OrderedFloat(p.chi2))
    }

    /// The global-minimum sample itself.
    pub fn global_min(&self) -> Option<Chi2Point> {
        self.min_index().map(|i| self.points[i])
    }

    /// Two-sided Δchi² = 1 interval around the minimum at `min_idx`.
    ///
    /// Walks outward from the minimum until the curve rises one unit above
    /// it, interpolating linearly between the bracketing samples. When a
    /// side never rises by 1 before the curve ends, that bound falls back to
    /// one local grid spacing; `min_spacing` floors that fallback, so even a
    /// single-sample curve reports a non-degenerate interval.
    pub fn interval_at(&self, min_idx: usize, min_spacing: f64) -> ZInterval {
        let best = self.points[min_idx];
        let target = best.chi2 + 1.0;

        let cross = |a: Chi2Point, b: Chi2Point| -> f64 {
            // a is below target, b at-or-above; interpolate in z.
            let t = (target - a.chi2) / (b.chi2 - a.chi2);
            a.z + t * (b.z - a.z)
        };

        let spacing_left = if min_idx > 0 {
            best.z - self.points[min_idx - 1].z
        } else if self.points.len() > 1 {
            self.points[1].z - best.z
        } else {
            0.0
        };
        let spacing_right = if min_idx + 1 < self.points.len() {
            self.points[min_idx + 1].z - best.z
        } else {
            spacing_left
        };
        let spacing_left = if spacing_left > 0.0 {
            spacing_left
        } else {
            min_spacing
        };
        let spacing_right = if spacing_right > 0.0 {
            spacing_right
        } else {
            min_spacing
        };

        let mut lower = best.z - spacing_left;
        for i in (0..min_idx).rev() {
            if self.points[i].chi2 >= target {
                lower = cross(self.points[i + 1], self.points[i]);
                break;
            }
        }

        let mut upper = best.z + spacing_right;
        for i in (min_idx + 1)..self.points.len() {
            if self.points[i].chi2 >= target {
                upper = cross(self.points[i - 1], self.points[i]);
                break;
            }
        }

        ZInterval { lower, upper }
    }

    /// Local minima within `band` of the global minimum.
    ///
    /// Arguments
    /// -----------------
    /// * `band`: Absolute chi-squared offset above the global minimum inside
    ///   which a local minimum is considered competitive.
    /// * `min_separation`: Minimum redshift distance from the global minimum
    ///   (suppresses refinement-grid neighbors of the best point).
    /// * `max_count`: Upper bound on returned minima.
    ///
    /// Return
    /// ----------
    /// * Competitive local minima, sorted by ascending chi-squared, global
    ///   minimum excluded.
    pub fn local_minima(
        &self,
        band: f64,
        min_separation: f64,
        max_count: usize,
    ) -> Vec<Chi2Point> {
        let Some(best_idx) = self.min_index() else {
            return Vec::new();
        };
        let best = self.points[best_idx];
        let ceiling = best.chi2 + band;

        let mut minima: Vec<Chi2Point> = Vec::new();
        for i in 1..self.points.len().saturating_sub(1) {
            let p = self.points[i];
            if i == best_idx || p.chi2 > ceiling {
                continue;
            }
            if (p.z - best.z).abs() < min_separation {
                continue;
            }
            let left = self.points[i - 1].chi2;
            let right = self.points[i + 1].chi2;
            if p.chi2 < left && p.chi2 <= right {
                minima.push(p);
            }
        }

        minima.sort_by_key(|p| OrderedFloat(p.chi2));
        minima.truncate(max_count);
        minima
    }
}

#[cfg(test)]
mod chi2_curve_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve_from(vals: &[(f64, f64)]) -> Chi2Curve {
        Chi2Curve::from_points(vals.iter().map(|&(z, chi2)| Chi2Point { z, chi2 }).collect())
    }

    #[test]
    fn construction_sorts_and_drops_invalid_samples() {
        let c = curve_from(&[(2.0, 5.0), (1.0, 7.0), (1.5, f64::NAN), (3.0, -1.0)]);
        let zs: Vec<f64> = c.points().iter().map(|p| p.z).collect();
        assert_eq!(zs, vec![1.0, 2.0]);
    }

    #[test]
    fn duplicate_redshifts_keep_the_lower_chi2() {
        let c = curve_from(&[(1.0, 5.0), (1.0, 3.0), (2.0, 4.0)]);
        assert_eq!(c.len(), 2);
        assert_eq!(c.points()[0].chi2, 3.0);
    }

    #[test]
    fn interval_interpolates_delta_chi2_one() {
        // V-shaped curve with minimum 0 at z=2, slope 10 per unit z:
        // chi2 crosses 1.0 at z = 2 ± 0.1.
        let c = curve_from(&[(1.0, 10.0), (2.0, 0.0), (3.0, 10.0)]);
        let i = c.min_index().unwrap();
        let itv = c.interval_at(i, 0.01);
        assert_relative_eq!(itv.lower, 1.9, epsilon = 1e-12);
        assert_relative_eq!(itv.upper, 2.1, epsilon = 1e-12);
    }

    #[test]
    fn flat_curve_falls_back_to_grid_spacing() {
        let c = curve_from(&[(1.0, 5.0), (1.1, 5.0), (1.2, 5.0)]);
        let i = c.min_index().unwrap();
        let itv = c.interval_at(i, 0.01);
        assert!(itv.lower < c.points()[i].z);
        assert!(itv.upper > c.points()[i].z);
    }

    #[test]
    fn single_sample_curve_reports_the_floor_not_zero_uncertainty() {
        let c = curve_from(&[(2.0, 3.0)]);
        let itv = c.interval_at(0, 0.01);
        assert_relative_eq!(itv.lower, 1.99, epsilon = 1e-12);
        assert_relative_eq!(itv.upper, 2.01, epsilon = 1e-12);
    }

    #[test]
    fn competitive_secondary_minimum_is_retained() {
        let c = curve_from(&[
            (0.5, 40.0),
            (1.0, 2.0), // global min
            (1.5, 40.0),
            (2.0, 6.0), // secondary, within band 9
            (2.5, 40.0),
        ]);
        let minima = c.local_minima(9.0, 0.1, 5);
        assert_eq!(minima.len(), 1);
        assert_relative_eq!(minima[0].z, 2.0);
    }

    #[test]
    fn uncompetitive_minima_fall_outside_the_band() {
        let c = curve_from(&[
            (0.5, 40.0),
            (1.0, 2.0),
            (1.5, 40.0),
            (2.0, 30.0),
            (2.5, 40.0),
        ]);
        assert!(c.local_minima(9.0, 0.1, 5).is_empty());
    }
}
