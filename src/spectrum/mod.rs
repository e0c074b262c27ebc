//! # Spectra: identifiers and in-memory records
//!
//! Core data types for extracted NIRSpec spectra. The central type is
//! [`SpectrumRecord`], the immutable in-memory form of one object's 1D
//! spectrum, keyed by an [`ObjectId`] extracted from the file name.
//!
//! Modules
//! -----------------
//! * [`loader`](crate::spectrum::loader) – Directory scanning and 1D spectrum
//!   file parsing ([`DirectoryIndex`](crate::spectrum::loader::DirectoryIndex)).
//!
//! Identifier Convention
//! -----------------
//! Extracted 1D spectra are named like
//! `jw02756001001-o001_s00123_nirspec_prism-clear_o1d.csv`: the observation
//! id follows `-o` and the source id follows `_s`. Both are extracted with a
//! single anchored regex; extraction is deterministic, and two files mapping
//! to the same identifier within one directory is an indexing error.

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::specz_errors::SpeczError;

pub mod loader;

static ID_FROM_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-o(\d+)_s(\d+)[^/]*_o1d\.csv$").expect("identifier regex"));

static ID_FROM_STR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^o(\d+)_s(\d+)$").expect("identifier regex"));

/// Stable key associating a 1D spectrum, its 2D counterpart, its fit
/// artifact, and its quality metadata.
///
/// The pair `(obs, source)` mirrors the observation and source ids embedded
/// in NIRSpec MSA file names. Ordering is lexicographic on `(obs, source)`,
/// which makes directory iteration order reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Observation id (the `oNNN` file-name component).
    pub obs: u32,
    /// Source id within the observation (the `sNNNNN` component).
    pub source: u64,
}

impl ObjectId {
    pub fn new(obs: u32, source: u64) -> Self {
        Self { obs, source }
    }

    /// Extract an identifier from a 1D spectrum file name.
    ///
    /// Arguments
    /// -----------------
    /// * `file_name`: The bare file name (not a full path) of a candidate
    ///   1D spectrum file.
    ///
    /// Return
    /// ----------
    /// * The extracted [`ObjectId`], or [`SpeczError::InvalidObjectId`] when
    ///   the name does not follow the `-oNNN_sNNNNN..._o1d.csv` convention.
    pub fn from_file_name(file_name: &str) -> Result<Self, SpeczError> {
        let caps = ID_FROM_FILENAME
            .captures(file_name)
            .ok_or_else(|| SpeczError::InvalidObjectId(file_name.to_string()))?;
        let obs = caps[1]
            .parse::<u32>()
            .map_err(|_| SpeczError::InvalidObjectId(file_name.to_string()))?;
        let source = caps[2]
            .parse::<u64>()
            .map_err(|_| SpeczError::InvalidObjectId(file_name.to_string()))?;
        Ok(Self { obs, source })
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{:03}_s{:05}", self.obs, self.source)
    }
}

impl FromStr for ObjectId {
    type Err = SpeczError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ID_FROM_STR
            .captures(s)
            .ok_or_else(|| SpeczError::InvalidObjectId(s.to_string()))?;
        let obs = caps[1]
            .parse::<u32>()
            .map_err(|_| SpeczError::InvalidObjectId(s.to_string()))?;
        let source = caps[2]
            .parse::<u64>()
            .map_err(|_| SpeczError::InvalidObjectId(s.to_string()))?;
        Ok(Self { obs, source })
    }
}

/// Immutable in-memory form of one object's extracted 1D spectrum.
///
/// Wavelengths are observed-frame **microns**, strictly increasing. Flux and
/// flux error share the wavelength length; individual samples may be
/// non-finite (masked detector pixels) and are ignored by the fit statistic.
/// The optional 2D pairing is recorded as a path only and never parsed here.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRecord {
    pub id: ObjectId,
    /// Observed wavelength grid, microns.
    pub wavelength: Vec<f64>,
    /// Calibrated flux density per wavelength sample.
    pub flux: Vec<f64>,
    /// 1-sigma flux uncertainty per sample.
    pub flux_err: Vec<f64>,
    /// Path of the paired 2D spectrum file, when present on disk.
    pub s2d_path: Option<Utf8PathBuf>,
    /// Source right ascension, degrees, when the file header carries it.
    pub ra: Option<f64>,
    /// Source declination, degrees, when the file header carries it.
    pub dec: Option<f64>,
}

impl SpectrumRecord {
    /// Number of wavelength samples.
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Observed wavelength coverage `[min, max]` in microns.
    pub fn coverage(&self) -> Option<(f64, f64)> {
        match (self.wavelength.first(), self.wavelength.last()) {
            (Some(&lo), Some(&hi)) => Some((lo, hi)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod object_id_tests {
    use super::*;

    #[test]
    fn extracts_ids_from_nirspec_file_name() {
        let id = ObjectId::from_file_name(
            "jw02756001001-o001_s00123_nirspec_prism-clear_o1d.csv",
        )
        .unwrap();
        assert_eq!(id, ObjectId::new(1, 123));
    }

    #[test]
    fn rejects_names_without_identifier_components() {
        assert!(ObjectId::from_file_name("random_table.csv").is_err());
        assert!(ObjectId::from_file_name("jw02756-o001_s00123_s2d.csv").is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let id = ObjectId::new(12, 4567);
        let shown = id.to_string();
        assert_eq!(shown, "o012_s04567");
        assert_eq!(shown.parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn ordering_is_obs_then_source() {
        let mut ids = vec![
            ObjectId::new(2, 1),
            ObjectId::new(1, 99),
            ObjectId::new(1, 5),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                ObjectId::new(1, 5),
                ObjectId::new(1, 99),
                ObjectId::new(2, 1)
            ]
        );
    }
}
