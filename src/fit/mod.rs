//! # Redshift fit configuration and results
//!
//! This module defines the [`FitWindow`] search interval, the [`FitParams`]
//! configuration struct and its builder, and the [`FitResult`] record
//! produced by the engine.
//!
//! ## Purpose
//!
//! [`FitParams`] centralizes all tunable parameters used by
//! [`FitEngine::fit`](crate::fit::engine::FitEngine::fit). It allows you to:
//!
//! - Control the coarse grid resolution over the search window,
//! - Tune the refinement pass around the coarse minimum (ratio and span),
//! - Set the prominence band inside which secondary chi-squared minima are
//!   retained (line-misidentification degeneracies),
//! - Cap how many secondary minima a result carries.
//!
//! ## Pipeline overview
//!
//! 1. **Coarse pass** – the window is discretized at `coarse_step`; every
//!    grid redshift is scored against the template set.
//! 2. **Refinement pass** – a finer grid (`coarse_step / refine_ratio`)
//!    spanning `refine_span_steps` coarse steps on each side of the coarse
//!    minimum localizes the global minimum and reduces line-confusion
//!    aliasing.
//! 3. **Selection** – the merged curve's global minimum becomes the best
//!    redshift; the two-sided uncertainty comes from the Δchi² = 1
//!    crossings around it; secondary minima within `minima_band` of the
//!    global minimum are kept on the result.
//!
//! ## Example
//!
//! ```rust,no_run
//! use specz::fit::FitParams;
//!
//! let params = FitParams::builder()
//!     .coarse_step(0.005)
//!     .refine_ratio(20)
//!     .minima_band(12.0)
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## See also
//!
//! * [`FitEngine`](crate::fit::engine::FitEngine) – grid search entry point.
//! * [`Chi2Curve`](crate::fit::chi2_curve::Chi2Curve) – curve container and
//!   minima/uncertainty analysis.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_Z_MAX, DEFAULT_Z_MIN};
use crate::specz_errors::SpeczError;

pub mod chi2_curve;
pub mod engine;

pub use chi2_curve::{Chi2Curve, Chi2Point, ZInterval};
pub use engine::FitEngine;

/// Closed redshift search interval `[z_min, z_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitWindow {
    z_min: f64,
    z_max: f64,
}

impl FitWindow {
    /// Validate and build a window.
    ///
    /// Return
    /// ----------
    /// * The window, or [`SpeczError::InvalidWindow`] unless both bounds are
    ///   finite and `z_min < z_max`.
    pub fn new(z_min: f64, z_max: f64) -> Result<Self, SpeczError> {
        if !z_min.is_finite() || !z_max.is_finite() || z_min >= z_max {
            return Err(SpeczError::InvalidWindow { z_min, z_max });
        }
        Ok(Self { z_min, z_max })
    }

    /// The default wide window used when no prior is available.
    pub fn default_wide() -> Self {
        Self {
            z_min: DEFAULT_Z_MIN,
            z_max: DEFAULT_Z_MAX,
        }
    }

    pub fn z_min(&self) -> f64 {
        self.z_min
    }

    pub fn z_max(&self) -> f64 {
        self.z_max
    }

    pub fn width(&self) -> f64 {
        self.z_max - self.z_min
    }

    /// Inclusive containment test.
    pub fn contains(&self, z: f64) -> bool {
        z >= self.z_min && z <= self.z_max
    }
}

/// Configuration parameters controlling [`FitEngine::fit`](crate::fit::engine::FitEngine::fit).
///
/// Built through [`FitParams::builder`]; `build()` validates every field so
/// an engine never runs with a degenerate grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    /// Redshift spacing of the coarse search grid.
    pub coarse_step: f64,
    /// Refinement grid is `coarse_step / refine_ratio` fine.
    pub refine_ratio: u32,
    /// Half-width of the refinement region, in coarse steps.
    pub refine_span_steps: f64,
    /// Secondary minima within this chi-squared offset of the global
    /// minimum are retained on the result.
    pub minima_band: f64,
    /// Upper bound on retained secondary minima.
    pub max_secondary: usize,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            coarse_step: 0.01,
            refine_ratio: 10,
            refine_span_steps: 3.0,
            minima_band: 9.0,
            max_secondary: 5,
        }
    }
}

impl FitParams {
    pub fn builder() -> FitParamsBuilder {
        FitParamsBuilder::default()
    }
}

/// Builder for [`FitParams`], with validation at `build()` time.
#[derive(Debug, Clone, Default)]
pub struct FitParamsBuilder {
    params: FitParams,
}

impl FitParamsBuilder {
    pub fn coarse_step(mut self, step: f64) -> Self {
        self.params.coarse_step = step;
        self
    }

    pub fn refine_ratio(mut self, ratio: u32) -> Self {
        self.params.refine_ratio = ratio;
        self
    }

    pub fn refine_span_steps(mut self, steps: f64) -> Self {
        self.params.refine_span_steps = steps;
        self
    }

    pub fn minima_band(mut self, band: f64) -> Self {
        self.params.minima_band = band;
        self
    }

    pub fn max_secondary(mut self, n: usize) -> Self {
        self.params.max_secondary = n;
        self
    }

    /// Validate and produce the final parameter set.
    pub fn build(self) -> Result<FitParams, SpeczError> {
        let p = self.params;
        if !(p.coarse_step.is_finite() && p.coarse_step > 0.0) {
            return Err(SpeczError::InvalidFitParams(format!(
                "coarse_step must be finite and > 0 (got {})",
                p.coarse_step
            )));
        }
        if p.refine_ratio == 0 {
            return Err(SpeczError::InvalidFitParams(
                "refine_ratio must be >= 1".into(),
            ));
        }
        if !(p.refine_span_steps.is_finite() && p.refine_span_steps > 0.0) {
            return Err(SpeczError::InvalidFitParams(format!(
                "refine_span_steps must be finite and > 0 (got {})",
                p.refine_span_steps
            )));
        }
        if !(p.minima_band.is_finite() && p.minima_band >= 0.0) {
            return Err(SpeczError::InvalidFitParams(format!(
                "minima_band must be finite and >= 0 (got {})",
                p.minima_band
            )));
        }
        Ok(p)
    }
}

/// Outcome of one redshift fit: immutable once produced.
///
/// A refit never mutates an existing result; the metadata store appends the
/// new result and stamps `version` monotonically per object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit redshift: the global chi-squared minimum inside `window`.
    pub z: f64,
    /// Two-sided uncertainty interval around `z`.
    pub z_interval: ZInterval,
    /// Chi-squared value at the minimum.
    pub chi2_min: f64,
    /// Name of the template that achieved the minimum.
    pub best_template: String,
    /// The window that was searched (provenance for window-restricted fits).
    pub window: FitWindow,
    /// Full chi-squared-vs-redshift curve, ordered by redshift.
    pub curve: Chi2Curve,
    /// Local minima within the prominence band, best first, global minimum
    /// excluded.
    pub secondary_minima: Vec<Chi2Point>,
    /// Monotonically increasing per-object fit version (stamped on save).
    pub version: u32,
    /// UTC timestamp of the fit.
    pub fitted_at: String,
}
