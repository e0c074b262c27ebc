//! # Guess table: externally supplied redshift priors
//!
//! Loads a delimited table of per-object redshift priors (spec-z or photo-z
//! from an earlier catalog) and seeds tight search windows around them.
//!
//! ## Column identification
//! -----------------
//! The table must carry a header row. Columns are identified by matching
//! header names (case-insensitive) against a small recognized-name set:
//!
//! * observation id – `obsid`, `obs_id`, `obs`
//! * source id – `objid`, `obj_id`, `source_id`, `srcid`, `id`
//! * redshift – spectroscopic names first (`specz`, `spec_z`, `zspec`,
//!   `z_spec`), then photometric (`photoz`, `photo_z`, `zphot`, `z_phot`),
//!   then generic (`z`, `redshift`)
//!
//! The matched redshift column also decides the entry's [`GuessKind`] tag.
//! When no identifier or no redshift column can be identified the load
//! fails with [`SpeczError::MalformedTable`]; explicit column selection is
//! available through [`GuessTable::load_with_columns`].
//!
//! ## Row semantics
//! -----------------
//! * Lookup is by **exact identifier match** only.
//! * A duplicated identifier keeps the **first occurrence**; later rows are
//!   reported as a non-fatal logged warning.
//! * Rows whose id or redshift cells do not parse are skipped with a
//!   warning, not errors: one bad catalog row must not reject the upload.
//! * Entries for objects absent from the directory are simply never looked
//!   up — unmatched guesses are ignored, not errors.

use std::collections::HashMap;
use std::fs::File;

use ahash::RandomState;
use camino::Utf8Path;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::constants::{
    GUESS_LOWER_FACTOR, GUESS_UPPER_FACTOR, MIN_GUESS_WINDOW_WIDTH,
};
use crate::fit::FitWindow;
use crate::spectrum::ObjectId;
use crate::specz_errors::SpeczError;

const OBS_COLUMNS: &[&str] = &["obsid", "obs_id", "obs"];
const SOURCE_COLUMNS: &[&str] = &["objid", "obj_id", "source_id", "srcid", "id"];
const SPECZ_COLUMNS: &[&str] = &["specz", "spec_z", "zspec", "z_spec"];
const PHOTOZ_COLUMNS: &[&str] = &["photoz", "photo_z", "zphot", "z_phot"];
const GENERIC_Z_COLUMNS: &[&str] = &["z", "redshift"];

/// Provenance tag of a redshift prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuessKind {
    Spectroscopic,
    Photometric,
}

/// One per-object redshift prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuessEntry {
    pub z: f64,
    pub kind: GuessKind,
}

impl GuessEntry {
    /// Tight search window around this prior: `[0.95 z, 1.05 z]`, clamped to
    /// non-negative redshift and widened to a minimum searchable width for
    /// priors near zero.
    pub fn window(&self) -> FitWindow {
        let lo = (self.z * GUESS_LOWER_FACTOR).max(0.0);
        let hi = (self.z * GUESS_UPPER_FACTOR).max(lo + MIN_GUESS_WINDOW_WIDTH);
        FitWindow::new(lo, hi).expect("guess window construction is total")
    }
}

/// Explicit column selection, bypassing header-name matching.
#[derive(Debug, Clone)]
pub struct GuessColumns {
    pub obs: String,
    pub source: String,
    pub redshift: String,
    pub kind: GuessKind,
}

/// Read-only mapping from object identifier to its redshift prior.
#[derive(Debug, Clone, Default)]
pub struct GuessTable {
    entries: HashMap<ObjectId, GuessEntry, RandomState>,
}

impl GuessTable {
    /// Load a guess table, identifying columns from the header row.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: Delimited table with at least one identifier pair and one
    ///   redshift-like column.
    ///
    /// Return
    /// ----------
    /// * The table, or [`SpeczError::MalformedTable`] when the required
    ///   columns cannot be identified.
    pub fn load(path: &Utf8Path) -> Result<Self, SpeczError> {
        let mut reader = csv::Reader::from_reader(File::open(path)?);
        let headers = reader.headers()?.clone();

        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };

        let i_obs = find(OBS_COLUMNS).ok_or_else(|| {
            SpeczError::MalformedTable("no observation-id column recognized".into())
        })?;
        let i_source = find(SOURCE_COLUMNS).ok_or_else(|| {
            SpeczError::MalformedTable("no source-id column recognized".into())
        })?;
        let (i_z, kind) = find(SPECZ_COLUMNS)
            .map(|i| (i, GuessKind::Spectroscopic))
            .or_else(|| find(PHOTOZ_COLUMNS).map(|i| (i, GuessKind::Photometric)))
            .or_else(|| find(GENERIC_Z_COLUMNS).map(|i| (i, GuessKind::Spectroscopic)))
            .ok_or_else(|| {
                SpeczError::MalformedTable("no redshift column recognized".into())
            })?;

        Self::collect(&mut reader, i_obs, i_source, i_z, kind)
    }

    /// Load with explicitly named columns instead of header sniffing.
    pub fn load_with_columns(
        path: &Utf8Path,
        columns: &GuessColumns,
    ) -> Result<Self, SpeczError> {
        let mut reader = csv::Reader::from_reader(File::open(path)?);
        let headers = reader.headers()?.clone();

        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    SpeczError::MalformedTable(format!("column {name:?} not present"))
                })
        };
        let i_obs = find(&columns.obs)?;
        let i_source = find(&columns.source)?;
        let i_z = find(&columns.redshift)?;

        Self::collect(&mut reader, i_obs, i_source, i_z, columns.kind)
    }

    fn collect(
        reader: &mut csv::Reader<File>,
        i_obs: usize,
        i_source: usize,
        i_z: usize,
        kind: GuessKind,
    ) -> Result<Self, SpeczError> {
        let mut entries: HashMap<ObjectId, GuessEntry, RandomState> = HashMap::default();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let cell = |i: usize| record.get(i).unwrap_or("").trim();

            let (Ok(obs), Ok(source)) =
                (cell(i_obs).parse::<u32>(), cell(i_source).parse::<u64>())
            else {
                warn!("guess table row {}: unparseable identifier, skipped", row + 2);
                continue;
            };
            let Ok(z) = cell(i_z).parse::<f64>() else {
                warn!("guess table row {}: unparseable redshift, skipped", row + 2);
                continue;
            };
            if !z.is_finite() || z < 0.0 {
                warn!("guess table row {}: non-physical redshift {z}, skipped", row + 2);
                continue;
            }

            let id = ObjectId::new(obs, source);
            if entries.contains_key(&id) {
                warn!("guess table: duplicate identifier {id}, keeping first occurrence");
                continue;
            }
            entries.insert(id, GuessEntry { z, kind });
        }

        Ok(Self { entries })
    }

    /// Exact-match lookup by object identifier.
    pub fn get(&self, id: ObjectId) -> Option<&GuessEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod guess_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn window_brackets_the_prior() {
        let e = GuessEntry {
            z: 2.1,
            kind: GuessKind::Spectroscopic,
        };
        let w = e.window();
        assert_relative_eq!(w.z_min(), 2.1 * 0.95, epsilon = 1e-12);
        assert_relative_eq!(w.z_max(), 2.1 * 1.05, epsilon = 1e-12);
        assert!(w.contains(2.1));
    }

    #[test]
    fn near_zero_prior_still_yields_a_searchable_window() {
        let e = GuessEntry {
            z: 0.0,
            kind: GuessKind::Photometric,
        };
        let w = e.window();
        assert_relative_eq!(w.z_min(), 0.0);
        assert!(w.width() >= MIN_GUESS_WINDOW_WIDTH);
    }
}
