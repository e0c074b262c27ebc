//! # Template library and goodness-of-fit statistic
//!
//! Read-only model spectra compared against observed data at trial
//! redshifts, plus the pluggable chi-squared statistic the fit engine
//! evaluates per (template, redshift) pair.
//!
//! ## Overview
//! -----------------
//! * [`Template`] – a continuum shape (power law, optional spectral break)
//!   decorated with Gaussian emission-line complexes at rest wavelengths.
//! * [`TemplateSet`] – an immutable, shareable collection;
//!   [`TemplateSet::builtin`] covers the common NIRSpec prism cases
//!   (Lyman-break emitter, [OII]/[OIII]+Hβ complex, Hα complex,
//!   Balmer-break continuum).
//! * [`FitStatistic`] – the per-redshift statistic contract. The built-in
//!   [`WeightedChi2`] scales each template by a weighted linear
//!   least-squares amplitude + offset solve and returns the error-weighted
//!   chi-squared of the residuals.
//!
//! ## Units & Conventions
//! -----------------
//! * Rest-frame line and break wavelengths are **Angstroms**.
//! * Observed wavelengths are **microns**; a rest feature lands at
//!   `rest_A * (1 + z) * 1e-4` microns.
//! * Samples with non-finite flux or non-positive/non-finite error are
//!   treated as masked and excluded from the statistic.
//!
//! ## Contract for implementors
//! -----------------
//! [`FitStatistic::chi2`] returns a plain `f64`. Finite values must be
//! non-negative; `NaN` signals "not evaluable at this redshift" (for
//! example, no template feature falls inside the observed coverage). The
//! engine filters non-finite values and reports
//! [`NumericalFailure`](crate::specz_errors::SpeczError::NumericalFailure)
//! only when the entire window is non-finite.

use nalgebra::{Matrix2, Vector2};

use crate::spectrum::SpectrumRecord;

/// Conversion from rest-frame Angstroms to observed microns at redshift z.
const ANGSTROM_TO_MICRON: f64 = 1e-4;

/// Pivot wavelength for the power-law continuum, microns.
const CONTINUUM_PIVOT_UM: f64 = 2.0;

/// Flux suppression factor applied blueward of a spectral break.
const BREAK_SUPPRESSION: f64 = 0.05;

/// One rest-frame spectral line of a template.
#[derive(Debug, Clone, Copy)]
pub struct SpectralLine {
    /// Rest wavelength, Angstroms.
    pub rest_wavelength: f64,
    /// Relative peak strength within the template (dimensionless).
    pub strength: f64,
}

/// A model spectrum: power-law continuum, optional break, Gaussian lines.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub lines: Vec<SpectralLine>,
    /// Power-law index of the continuum in F(λ) ∝ (λ / pivot)^slope.
    pub continuum_slope: f64,
    /// Rest wavelength of a spectral break (Angstroms); flux blueward of it
    /// is suppressed. `None` for pure power-law continua.
    pub break_wavelength: Option<f64>,
    /// Fractional Gaussian line width σ/λ (velocity broadening).
    pub line_sigma: f64,
}

impl Template {
    /// Evaluate the template on an observed wavelength grid at trial `z`.
    ///
    /// Arguments
    /// -----------------
    /// * `wavelength_um`: Observed-frame wavelengths, microns.
    /// * `z`: Trial redshift.
    /// * `out`: Output buffer, same length as `wavelength_um`.
    pub fn eval(&self, wavelength_um: &[f64], z: f64, out: &mut [f64]) {
        debug_assert_eq!(wavelength_um.len(), out.len());
        let zp1 = 1.0 + z;
        let break_um = self
            .break_wavelength
            .map(|b| b * ANGSTROM_TO_MICRON * zp1);

        for (m, &w) in out.iter_mut().zip(wavelength_um) {
            let mut value = (w / CONTINUUM_PIVOT_UM).powf(self.continuum_slope);
            if let Some(b) = break_um {
                if w < b {
                    value *= BREAK_SUPPRESSION;
                }
            }
            for line in &self.lines {
                let center = line.rest_wavelength * ANGSTROM_TO_MICRON * zp1;
                let sigma = self.line_sigma * center;
                let d = (w - center) / sigma;
                if d.abs() < 6.0 {
                    value += line.strength * (-0.5 * d * d).exp();
                }
            }
            *m = value;
        }
    }

    /// True when at least one line or the break falls inside `[lo, hi]`
    /// (observed microns) at redshift `z`. Pure continua always qualify.
    pub fn covers(&self, lo: f64, hi: f64, z: f64) -> bool {
        if self.lines.is_empty() && self.break_wavelength.is_none() {
            return true;
        }
        let zp1 = 1.0 + z;
        let in_range = |rest_a: f64| {
            let w = rest_a * ANGSTROM_TO_MICRON * zp1;
            w >= lo && w <= hi
        };
        self.lines.iter().any(|l| in_range(l.rest_wavelength))
            || self.break_wavelength.is_some_and(in_range)
    }
}

/// Immutable library of candidate templates.
///
/// Shared across sessions via `Arc`; never mutated by the fitting core.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: Vec<Template>,
}

impl TemplateSet {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Built-in set covering the common NIRSpec prism identifications.
    pub fn builtin() -> Self {
        let line = |rest_wavelength: f64, strength: f64| SpectralLine {
            rest_wavelength,
            strength,
        };
        Self::new(vec![
            Template {
                name: "lyman_break_emitter".into(),
                lines: vec![line(1215.67, 1.0)],
                continuum_slope: -1.0,
                break_wavelength: Some(1215.67),
                line_sigma: 0.004,
            },
            Template {
                name: "oii_oiii_hbeta".into(),
                lines: vec![
                    line(3727.09, 0.6),
                    line(4862.69, 0.35),
                    line(4960.30, 0.33),
                    line(5008.24, 1.0),
                ],
                continuum_slope: -0.5,
                break_wavelength: None,
                line_sigma: 0.004,
            },
            Template {
                name: "halpha_complex".into(),
                lines: vec![
                    line(6564.61, 1.0),
                    line(6585.28, 0.3),
                    line(6718.29, 0.1),
                    line(6732.67, 0.1),
                ],
                continuum_slope: -0.5,
                break_wavelength: None,
                line_sigma: 0.004,
            },
            Template {
                name: "balmer_break".into(),
                lines: vec![],
                continuum_slope: -1.0,
                break_wavelength: Some(3645.07),
                line_sigma: 0.004,
            },
        ])
    }
}

/// Per-(redshift, template) goodness-of-fit statistic.
///
/// The fitting mathematics behind the statistic is deliberately opaque to
/// the engine: the engine only orchestrates the search loop over the values
/// this trait produces.
pub trait FitStatistic {
    /// Chi-squared of `template` against `spectrum` at trial redshift `z`.
    ///
    /// Finite return values are non-negative; `NaN` means the statistic is
    /// not evaluable at this redshift.
    fn chi2(&self, spectrum: &SpectrumRecord, template: &Template, z: f64) -> f64;
}

/// Error-weighted chi-squared with a linear amplitude + offset solve.
///
/// For each trial redshift the template is evaluated on the observed grid,
/// then the best scaling `a * model + b` is found by weighted least squares
/// (2×2 normal equations, solved with nalgebra). Negative amplitudes are
/// clamped to zero so an emission template cannot masquerade as absorption.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedChi2;

impl FitStatistic for WeightedChi2 {
    fn chi2(&self, spectrum: &SpectrumRecord, template: &Template, z: f64) -> f64 {
        let Some((lo, hi)) = spectrum.coverage() else {
            return f64::NAN;
        };
        if !template.covers(lo, hi, z) {
            return f64::NAN;
        }

        let mut model = vec![0.0; spectrum.len()];
        template.eval(&spectrum.wavelength, z, &mut model);

        // Weighted normal equations for (a, b) in flux ≈ a*model + b.
        let mut s_mm = 0.0;
        let mut s_m = 0.0;
        let mut s_w = 0.0;
        let mut s_mf = 0.0;
        let mut s_f = 0.0;
        let mut n_valid = 0usize;
        for i in 0..spectrum.len() {
            let f = spectrum.flux[i];
            let e = spectrum.flux_err[i];
            let m = model[i];
            if !f.is_finite() || !e.is_finite() || e <= 0.0 || !m.is_finite() {
                continue;
            }
            let w = 1.0 / (e * e);
            s_mm += w * m * m;
            s_m += w * m;
            s_w += w;
            s_mf += w * m * f;
            s_f += w * f;
            n_valid += 1;
        }
        if n_valid < 3 {
            return f64::NAN;
        }

        let a_mat = Matrix2::new(s_mm, s_m, s_m, s_w);
        let rhs = Vector2::new(s_mf, s_f);
        let (a, b) = match a_mat.lu().solve(&rhs) {
            Some(sol) => (sol[0], sol[1]),
            None => return f64::NAN,
        };
        let (a, b) = if a >= 0.0 {
            (a, b)
        } else {
            // Amplitude clamped: fall back to the weighted-mean offset.
            (0.0, s_f / s_w)
        };

        let mut chi2 = 0.0;
        for i in 0..spectrum.len() {
            let f = spectrum.flux[i];
            let e = spectrum.flux_err[i];
            let m = model[i];
            if !f.is_finite() || !e.is_finite() || e <= 0.0 || !m.is_finite() {
                continue;
            }
            let r = (f - (a * m + b)) / e;
            chi2 += r * r;
        }
        chi2
    }
}

#[cfg(test)]
mod template_tests {
    use super::*;
    use crate::spectrum::ObjectId;

    fn flat_spectrum() -> SpectrumRecord {
        let wavelength: Vec<f64> = (0..200).map(|i| 0.6 + i as f64 * 0.02).collect();
        let flux = vec![1.0; wavelength.len()];
        let flux_err = vec![0.1; wavelength.len()];
        SpectrumRecord {
            id: ObjectId::new(1, 1),
            wavelength,
            flux,
            flux_err,
            s2d_path: None,
            ra: None,
            dec: None,
        }
    }

    #[test]
    fn line_lands_at_redshifted_wavelength() {
        let t = Template {
            name: "one_line".into(),
            lines: vec![SpectralLine {
                rest_wavelength: 5008.24,
                strength: 1.0,
            }],
            continuum_slope: 0.0,
            break_wavelength: None,
            line_sigma: 0.004,
        };
        let z = 2.0;
        let center = 5008.24 * 1e-4 * (1.0 + z);
        let grid = [center - 0.2, center, center + 0.2];
        let mut out = [0.0; 3];
        t.eval(&grid, z, &mut out);
        assert!(out[1] > out[0] && out[1] > out[2]);
    }

    #[test]
    fn statistic_is_finite_and_nonnegative_on_valid_data() {
        let s = flat_spectrum();
        let set = TemplateSet::builtin();
        let chi2 = WeightedChi2.chi2(&s, &set.templates()[1], 0.5);
        assert!(chi2.is_finite());
        assert!(chi2 >= 0.0);
    }

    #[test]
    fn statistic_is_nan_when_all_samples_masked() {
        let mut s = flat_spectrum();
        for e in s.flux_err.iter_mut() {
            *e = f64::NAN;
        }
        let set = TemplateSet::builtin();
        assert!(WeightedChi2.chi2(&s, &set.templates()[1], 0.5).is_nan());
    }

    #[test]
    fn coverage_gate_rejects_out_of_range_lines() {
        let t = Template {
            name: "halpha_only".into(),
            lines: vec![SpectralLine {
                rest_wavelength: 6564.61,
                strength: 1.0,
            }],
            continuum_slope: 0.0,
            break_wavelength: None,
            line_sigma: 0.004,
        };
        // At z=9 Halpha sits at 6.6 µm, outside a 0.6-4.6 µm grid.
        assert!(!t.covers(0.6, 4.6, 9.0));
        assert!(t.covers(0.6, 4.6, 2.0));
    }
}
