//! Shared helpers for integration tests: synthetic NIRSpec-like spectra
//! written to scratch directories.

use std::fmt::Write as _;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use specz::{ObjectId, TemplateSet};

/// Observed wavelength grid of the synthetic prism spectra, microns.
pub const GRID_LO_UM: f64 = 0.6;
pub const GRID_HI_UM: f64 = 5.3;
pub const GRID_STEP_UM: f64 = 0.005;

pub const FLUX_ERR: f64 = 0.05;

pub fn wavelength_grid() -> Vec<f64> {
    let n = ((GRID_HI_UM - GRID_LO_UM) / GRID_STEP_UM) as usize;
    (0..=n).map(|i| GRID_LO_UM + i as f64 * GRID_STEP_UM).collect()
}

pub fn spectrum_file_name(obs: u32, source: u64) -> String {
    format!("jwtest-o{obs:03}_s{source:05}_nirspec_prism-clear_o1d.csv")
}

fn write_csv(
    dir: &Utf8Path,
    obs: u32,
    source: u64,
    wavelength: &[f64],
    flux: &[f64],
) -> ObjectId {
    let mut body = String::from("# ra = 150.11916\n# dec = 2.20583\nwavelength,flux,flux_err\n");
    for (w, f) in wavelength.iter().zip(flux) {
        writeln!(body, "{w},{f},{FLUX_ERR}").unwrap();
    }
    let path = dir.join(spectrum_file_name(obs, source));
    fs::write(path, body).unwrap();
    ObjectId::new(obs, source)
}

/// Spectrum generated from one of the built-in templates at `z_true`, so
/// the engine has an exactly representable global minimum there.
pub fn write_template_spectrum(
    dir: &Utf8Path,
    obs: u32,
    source: u64,
    template_idx: usize,
    z_true: f64,
    amplitude: f64,
    offset: f64,
) -> ObjectId {
    let wavelength = wavelength_grid();
    let set = TemplateSet::builtin();
    let mut model = vec![0.0; wavelength.len()];
    set.templates()[template_idx].eval(&wavelength, z_true, &mut model);
    let flux: Vec<f64> = model.iter().map(|m| offset + amplitude * m).collect();
    write_csv(dir, obs, source, &wavelength, &flux)
}

/// Flat continuum plus a single Gaussian emission line of unknown identity.
pub fn write_line_spectrum(
    dir: &Utf8Path,
    obs: u32,
    source: u64,
    rest_angstrom: f64,
    z_true: f64,
    amplitude: f64,
) -> ObjectId {
    let wavelength = wavelength_grid();
    let center = rest_angstrom * 1e-4 * (1.0 + z_true);
    let sigma = 0.004 * center;
    let flux: Vec<f64> = wavelength
        .iter()
        .map(|&w| {
            let d = (w - center) / sigma;
            1.0 + amplitude * (-0.5 * d * d).exp()
        })
        .collect();
    write_csv(dir, obs, source, &wavelength, &flux)
}

/// A file that exists and names the right suffix but violates the format.
pub fn write_corrupt_spectrum(dir: &Utf8Path, obs: u32, source: u64) -> ObjectId {
    let path = dir.join(spectrum_file_name(obs, source));
    fs::write(path, "wavelength,flux\n1.0,2.0\n").unwrap();
    ObjectId::new(obs, source)
}

/// Scratch directory as a Utf8PathBuf (panics on non-UTF-8 temp paths).
pub fn scratch_dir(tmp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap()
}
