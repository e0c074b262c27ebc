//! # Redshift grid-search engine
//!
//! Runs the coarse-to-fine chi-squared search over a [`FitWindow`] for one
//! [`SpectrumRecord`] against a [`TemplateSet`], producing a [`FitResult`].
//!
//! ## Overview
//! -----------------
//! The engine owns the **search and bookkeeping loop** only; the
//! per-(redshift, template) statistic is an external capability behind the
//! [`FitStatistic`] trait. At each grid redshift the engine takes the
//! minimum statistic across the template set, remembers which template won,
//! merges the coarse and refinement passes into one curve, and derives the
//! best fit, its Δchi² = 1 interval, and any competitive secondary minima.
//!
//! ## Error Semantics
//! -----------------
//! * [`SpeczError::InvalidWindow`] never originates here: windows are
//!   validated at construction.
//! * [`SpeczError::NumericalFailure`] – the statistic produced no finite
//!   value anywhere in the window (reported, never retried internally).
//!
//! Re-fitting with a narrower, human-supplied window is a first-class
//! operation: the caller simply passes the override window and persists the
//! superseding result.

use hifitime::Epoch;

use crate::fit::chi2_curve::{Chi2Curve, Chi2Point};
use crate::fit::{FitParams, FitResult, FitWindow};
use crate::spectrum::SpectrumRecord;
use crate::specz_errors::SpeczError;
use crate::templates::{FitStatistic, TemplateSet, WeightedChi2};

/// Grid-search engine, generic over the goodness-of-fit statistic.
#[derive(Debug, Clone)]
pub struct FitEngine<S = WeightedChi2> {
    params: FitParams,
    statistic: S,
}

impl FitEngine<WeightedChi2> {
    /// Engine with the built-in weighted chi-squared statistic.
    pub fn new(params: FitParams) -> Self {
        Self {
            params,
            statistic: WeightedChi2,
        }
    }
}

impl Default for FitEngine<WeightedChi2> {
    fn default() -> Self {
        Self::new(FitParams::default())
    }
}

impl<S: FitStatistic> FitEngine<S> {
    /// Engine with a caller-supplied statistic.
    pub fn with_statistic(params: FitParams, statistic: S) -> Self {
        Self { params, statistic }
    }

    pub fn params(&self) -> &FitParams {
        &self.params
    }

    /// Search `window` for the best-fitting redshift.
    ///
    /// Arguments
    /// -----------------
    /// * `spectrum`: The object's 1D spectrum record.
    /// * `window`: Closed search interval (validated at construction).
    /// * `templates`: Read-only template library.
    ///
    /// Return
    /// ----------
    /// * A [`FitResult`] whose best redshift is the global minimum of the
    ///   merged coarse + refined curve, or
    ///   [`SpeczError::NumericalFailure`] when no grid point evaluates to a
    ///   finite chi-squared.
    ///
    /// See also
    /// ------------
    /// * [`Chi2Curve::local_minima`] – retention of degenerate minima.
    /// * [`Chi2Curve::interval_at`] – uncertainty derivation.
    pub fn fit(
        &self,
        spectrum: &SpectrumRecord,
        window: FitWindow,
        templates: &TemplateSet,
    ) -> Result<FitResult, SpeczError> {
        if templates.is_empty() {
            return Err(SpeczError::NumericalFailure(
                "template set is empty".into(),
            ));
        }

        // Coarse pass over the whole window.
        let coarse_grid = grid(window.z_min(), window.z_max(), self.params.coarse_step);
        let mut samples = self.evaluate(spectrum, templates, &coarse_grid);

        let coarse_best = samples
            .iter()
            .min_by(|a, b| a.point.chi2.total_cmp(&b.point.chi2))
            .map(|s| s.point.z)
            .ok_or_else(|| {
                SpeczError::NumericalFailure(format!(
                    "no finite chi-squared in [{}, {}] for object {}",
                    window.z_min(),
                    window.z_max(),
                    spectrum.id
                ))
            })?;

        // Refinement pass around the coarse minimum.
        let span = self.params.refine_span_steps * self.params.coarse_step;
        let fine_step = self.params.coarse_step / f64::from(self.params.refine_ratio);
        let lo = (coarse_best - span).max(window.z_min());
        let hi = (coarse_best + span).min(window.z_max());
        let fine_grid = grid(lo, hi, fine_step);
        samples.extend(self.evaluate(spectrum, templates, &fine_grid));

        // Merge into one curve; recover the winning template at the global
        // minimum from the sample list (the curve itself drops that tag).
        let curve =
            Chi2Curve::from_points(samples.iter().map(|s| s.point).collect());
        let min_idx = curve.min_index().ok_or_else(|| {
            SpeczError::NumericalFailure("merged chi-squared curve is empty".into())
        })?;
        let best = curve.points()[min_idx];
        let best_template = samples
            .iter()
            .filter(|s| s.point.z == best.z)
            .min_by(|a, b| a.point.chi2.total_cmp(&b.point.chi2))
            .map(|s| templates.templates()[s.template].name.clone())
            .unwrap_or_default();

        let z_interval = curve.interval_at(min_idx, self.params.coarse_step);
        let secondary_minima = curve.local_minima(
            self.params.minima_band,
            self.params.coarse_step,
            self.params.max_secondary,
        );

        let fitted_at = Epoch::now()
            .map_err(|e| SpeczError::TimeError(e.to_string()))?
            .to_string();

        Ok(FitResult {
            z: best.z,
            z_interval,
            chi2_min: best.chi2,
            best_template,
            window,
            curve,
            secondary_minima,
            version: 1,
            fitted_at,
        })
    }

    /// Score every grid redshift, keeping the best template per point.
    /// Redshifts where no template evaluates finitely are skipped.
    fn evaluate(
        &self,
        spectrum: &SpectrumRecord,
        templates: &TemplateSet,
        zs: &[f64],
    ) -> Vec<ScoredPoint> {
        let mut out = Vec::with_capacity(zs.len());
        for &z in zs {
            let mut best: Option<(f64, usize)> = None;
            for (i, template) in templates.templates().iter().enumerate() {
                let chi2 = self.statistic.chi2(spectrum, template, z);
                if !chi2.is_finite() {
                    continue;
                }
                match best {
                    Some((b, _)) if b <= chi2 => {}
                    _ => best = Some((chi2, i)),
                }
            }
            if let Some((chi2, template)) = best {
                out.push(ScoredPoint {
                    point: Chi2Point { z, chi2 },
                    template,
                });
            }
        }
        out
    }
}

struct ScoredPoint {
    point: Chi2Point,
    template: usize,
}

/// Inclusive grid from `lo` to `hi` with spacing `step`; `hi` is always the
/// final point so window bounds are searched exactly.
fn grid(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    let n = ((hi - lo) / step).floor() as usize;
    let mut zs: Vec<f64> = (0..=n).map(|i| lo + i as f64 * step).collect();
    match zs.last() {
        Some(&last) if hi - last > step * 1e-9 => zs.push(hi),
        None => zs.push(hi),
        _ => {}
    }
    zs
}
