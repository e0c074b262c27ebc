//! # Constants and type definitions for specz
//!
//! This module centralizes the **search-window defaults**, **file-naming
//! conventions**, and **common type aliases** used throughout the `specz`
//! library.
//!
//! ## Overview
//!
//! - Default redshift search window and guess-seeding factors
//! - File suffixes tying a 1D spectrum to its 2D pairing and fit artifact
//! - Map aliases backed by `ahash::RandomState` for predictable performance
//!
//! These definitions are used by all main modules, including the spectrum
//! loader, the fit engine, and the batch controller.

use std::collections::HashMap;

use ahash::RandomState;
use camino::Utf8PathBuf;

use crate::fit::FitResult;
use crate::spectrum::ObjectId;

// -------------------------------------------------------------------------------------------------
// Redshift search defaults
// -------------------------------------------------------------------------------------------------

/// Lower bound of the default (wide) redshift search window
pub const DEFAULT_Z_MIN: f64 = 0.0;

/// Upper bound of the default (wide) redshift search window
pub const DEFAULT_Z_MAX: f64 = 10.0;

/// Lower factor applied to a guess-table prior when seeding a tight window
pub const GUESS_LOWER_FACTOR: f64 = 0.95;

/// Upper factor applied to a guess-table prior when seeding a tight window
pub const GUESS_UPPER_FACTOR: f64 = 1.05;

/// Minimum width of a guess-seeded window, so priors near z = 0 still
/// produce a searchable interval
pub const MIN_GUESS_WINDOW_WIDTH: f64 = 0.1;

// -------------------------------------------------------------------------------------------------
// File-naming conventions
// -------------------------------------------------------------------------------------------------

/// Suffix identifying an extracted 1D spectrum file
pub const SPECTRUM_1D_SUFFIX: &str = "_o1d.csv";

/// Suffix of the paired 2D spectrum file (same stem as the 1D file)
pub const SPECTRUM_2D_SUFFIX: &str = "_s2d.csv";

/// Suffix of the per-object fit artifact, replacing the 1D file extension
pub const FIT_ARTIFACT_SUFFIX: &str = "_o1d.zfit.yaml";

// -------------------------------------------------------------------------------------------------
// Container aliases
// -------------------------------------------------------------------------------------------------

/// Map from object identifier to its 1D spectrum path within one directory
pub type SpectrumPathMap = HashMap<ObjectId, Utf8PathBuf, RandomState>;

/// Per-session memoization of computed fit results
pub type FitCache = HashMap<ObjectId, FitResult, RandomState>;
