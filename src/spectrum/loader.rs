//! # 1D spectrum loader and directory index
//!
//! Utilities to enumerate a directory of extracted NIRSpec spectra and to
//! parse one object's 1D spectrum file into a [`SpectrumRecord`].
//!
//! ## Overview
//! -----------------
//! This module provides:
//! - [`DirectoryIndex`] – a scan of one directory mapping each [`ObjectId`]
//!   to its 1D spectrum path, in deterministic identifier order.
//! - [`DirectoryIndex::load_spectrum`] – a pure read that materializes the
//!   in-memory record, resolving the paired 2D file and any header
//!   coordinates along the way.
//!
//! ## File Format
//! -----------------
//! A 1D spectrum file is delimited text with a header row naming at least
//! `wavelength`, `flux`, and `flux_err` columns. Leading comment lines of
//! the form `# key = value` may carry source coordinates (`ra`, `dec`).
//! Wavelengths must parse as finite, strictly increasing floats; flux and
//! error samples may be non-finite (masked pixels).
//!
//! ## Error Handling
//! -----------------
//! * [`SpeczError::SpectrumNotFound`] – no file in the index matches the
//!   requested identifier.
//! * [`SpeczError::CorruptSpectrum`] – the file exists but required columns
//!   are missing or the arrays violate the structural expectations above.
//! * [`SpeczError::DuplicateObject`] – two files in one directory map to the
//!   same identifier (the naming convention guarantees this never happens
//!   for well-formed archives; we refuse to guess which file wins).
//!
//! Files whose names do not follow the 1D naming convention are skipped with
//! a logged warning rather than failing the scan.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use log::warn;

use crate::constants::{
    SpectrumPathMap, FIT_ARTIFACT_SUFFIX, SPECTRUM_1D_SUFFIX, SPECTRUM_2D_SUFFIX,
};
use crate::spectrum::{ObjectId, SpectrumRecord};
use crate::specz_errors::SpeczError;

/// Index of one directory of extracted spectra.
///
/// Holds the identifier → 1D-path mapping plus a sorted identifier list so
/// navigation and batch runs see the same reproducible order.
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    root: Utf8PathBuf,
    paths: SpectrumPathMap,
    order: Vec<ObjectId>,
}

impl DirectoryIndex {
    /// Scan `root` for 1D spectrum files and build the index.
    ///
    /// Arguments
    /// -----------------
    /// * `root`: Directory containing the extracted spectra.
    ///
    /// Return
    /// ----------
    /// * The populated index, or an error when the directory cannot be read
    ///   or two files map to the same [`ObjectId`].
    pub fn scan(root: &Utf8Path) -> Result<Self, SpeczError> {
        let mut paths = SpectrumPathMap::default();

        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.ends_with(SPECTRUM_1D_SUFFIX) {
                continue;
            }
            let id = match ObjectId::from_file_name(name) {
                Ok(id) => id,
                Err(_) => {
                    warn!("skipping 1D file without parseable identifier: {name}");
                    continue;
                }
            };
            let path = root.join(name);
            if let Some(prev) = paths.insert(id, path.clone()) {
                return Err(SpeczError::DuplicateObject {
                    id,
                    first: prev.into_string(),
                    second: path.into_string(),
                });
            }
        }

        let mut order: Vec<ObjectId> = paths.keys().copied().collect();
        order.sort_unstable();

        Ok(Self {
            root: root.to_owned(),
            paths,
            order,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// All indexed identifiers, in sorted order.
    pub fn ids(&self) -> &[ObjectId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.paths.contains_key(&id)
    }

    /// Path of the 1D spectrum file for `id`, if indexed.
    pub fn spectrum_path(&self, id: ObjectId) -> Option<&Utf8Path> {
        self.paths.get(&id).map(Utf8PathBuf::as_path)
    }

    /// Path where the fit artifact for `id` lives (whether or not it exists
    /// on disk yet): the 1D file name with its extension replaced.
    pub fn artifact_path(&self, id: ObjectId) -> Option<Utf8PathBuf> {
        self.paths
            .get(&id)
            .map(|p| swap_suffix(p, SPECTRUM_1D_SUFFIX, FIT_ARTIFACT_SUFFIX))
    }

    /// Read and parse the 1D spectrum for `id` into a [`SpectrumRecord`].
    ///
    /// Pure read: no files are created or modified. A missing 2D pairing is
    /// not an error; the `s2d_path` field is simply left empty.
    ///
    /// Arguments
    /// -----------------
    /// * `id`: The object to materialize.
    ///
    /// Return
    /// ----------
    /// * A fully populated record, [`SpeczError::SpectrumNotFound`] when the
    ///   identifier is not indexed, or [`SpeczError::CorruptSpectrum`] when
    ///   the file violates the format contract.
    pub fn load_spectrum(&self, id: ObjectId) -> Result<SpectrumRecord, SpeczError> {
        let path = self
            .spectrum_path(id)
            .ok_or(SpeczError::SpectrumNotFound(id))?;
        let raw = fs::read_to_string(path)?;

        let (ra, dec) = parse_header_coordinates(&raw);
        let (wavelength, flux, flux_err) = parse_columns(path, &raw)?;

        let s2d = swap_suffix(path, SPECTRUM_1D_SUFFIX, SPECTRUM_2D_SUFFIX);
        let s2d_path = s2d.is_file().then_some(s2d);

        Ok(SpectrumRecord {
            id,
            wavelength,
            flux,
            flux_err,
            s2d_path,
            ra,
            dec,
        })
    }
}

/// Replace a known trailing suffix of `path` (file name included).
fn swap_suffix(path: &Utf8Path, from: &str, to: &str) -> Utf8PathBuf {
    let s = path.as_str();
    match s.strip_suffix(from) {
        Some(stem) => Utf8PathBuf::from(format!("{stem}{to}")),
        None => path.to_owned(),
    }
}

/// Extract optional `ra`/`dec` values from leading `# key = value` lines.
fn parse_header_coordinates(raw: &str) -> (Option<f64>, Option<f64>) {
    let mut ra = None;
    let mut dec = None;
    for line in raw.lines() {
        let Some(rest) = line.strip_prefix('#') else {
            break;
        };
        if let Some((key, value)) = rest.split_once('=') {
            let value = value.trim().parse::<f64>().ok();
            match key.trim() {
                "ra" => ra = value,
                "dec" => dec = value,
                _ => {}
            }
        }
    }
    (ra, dec)
}

fn corrupt(path: &Utf8Path, reason: impl Into<String>) -> SpeczError {
    SpeczError::CorruptSpectrum {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Parse the delimited body into (wavelength, flux, flux_err) arrays.
fn parse_columns(
    path: &Utf8Path,
    raw: &str,
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>), SpeczError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| corrupt(path, format!("unreadable header row: {e}")))?
        .clone();

    let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(i_wave), Some(i_flux), Some(i_err)) =
        (col("wavelength"), col("flux"), col("flux_err"))
    else {
        return Err(corrupt(
            path,
            "missing required columns (wavelength, flux, flux_err)",
        ));
    };

    let mut wavelength = Vec::new();
    let mut flux = Vec::new();
    let mut flux_err = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| corrupt(path, format!("unreadable row: {e}")))?;
        let field = |i: usize| -> Result<f64, SpeczError> {
            let s = record
                .get(i)
                .ok_or_else(|| corrupt(path, format!("row {} too short", record.position().map_or(0, |p| p.line()))))?;
            if s.is_empty() {
                // Empty cells are masked samples.
                return Ok(f64::NAN);
            }
            s.parse::<f64>()
                .map_err(|_| corrupt(path, format!("non-numeric value {s:?}")))
        };

        let w = field(i_wave)?;
        if !w.is_finite() {
            return Err(corrupt(path, "non-finite wavelength sample"));
        }
        if let Some(&prev) = wavelength.last() {
            if w <= prev {
                return Err(corrupt(path, "wavelength array is not strictly increasing"));
            }
        }
        wavelength.push(w);
        flux.push(field(i_flux)?);
        flux_err.push(field(i_err)?);
    }

    if wavelength.len() < 2 {
        return Err(corrupt(path, "spectrum has fewer than two samples"));
    }

    Ok((wavelength, flux, flux_err))
}

#[cfg(test)]
mod loader_tests {
    use super::*;

    #[test]
    fn header_coordinates_are_optional() {
        let raw = "# ra = 150.1\n# dec = 2.2\nwavelength,flux,flux_err\n1.0,1.0,0.1\n";
        assert_eq!(parse_header_coordinates(raw), (Some(150.1), Some(2.2)));
        assert_eq!(
            parse_header_coordinates("wavelength,flux,flux_err\n"),
            (None, None)
        );
    }

    #[test]
    fn suffix_swap_targets_the_file_name_tail() {
        let p = Utf8Path::new("/data/jw-o001_s00002_o1d.csv");
        assert_eq!(
            swap_suffix(p, SPECTRUM_1D_SUFFIX, SPECTRUM_2D_SUFFIX).as_str(),
            "/data/jw-o001_s00002_s2d.csv"
        );
        assert_eq!(
            swap_suffix(p, SPECTRUM_1D_SUFFIX, FIT_ARTIFACT_SUFFIX).as_str(),
            "/data/jw-o001_s00002_o1d.zfit.yaml"
        );
    }

    #[test]
    fn non_monotonic_wavelength_is_corrupt() {
        let raw = "wavelength,flux,flux_err\n2.0,1.0,0.1\n1.0,1.0,0.1\n";
        let err = parse_columns(Utf8Path::new("x_o1d.csv"), raw).unwrap_err();
        assert!(matches!(err, SpeczError::CorruptSpectrum { .. }));
    }

    #[test]
    fn masked_samples_parse_as_nan() {
        let raw = "wavelength,flux,flux_err\n1.0,,0.1\n2.0,nan,0.1\n";
        let (w, f, e) = parse_columns(Utf8Path::new("x_o1d.csv"), raw).unwrap();
        assert_eq!(w, vec![1.0, 2.0]);
        assert!(f[0].is_nan() && f[1].is_nan());
        assert_eq!(e, vec![0.1, 0.1]);
    }
}
