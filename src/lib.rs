//! # specz: redshift fitting and fit-state management for NIRSpec MSA spectra
//!
//! `specz` is the non-visual core of a redshift review workflow for
//! JWST/NIRSpec multi-object spectroscopy: it searches a redshift window for
//! the best-fitting template solution, keeps the full chi-squared curve and
//! its degenerate minima inspectable, persists fit history and human quality
//! judgments in per-object YAML artifacts, and drives unattended batch
//! re-fitting across a directory while isolating per-object failures.
//!
//! The crate exposes plain structured values only — no plotting, imagery,
//! or widget code — so any presentation layer can drive it identically
//! through [`Session`](crate::session::Session).

pub mod batch;
pub mod constants;
pub mod fit;
pub mod guess;
pub mod metadata;
pub mod session;
pub mod spectrum;
pub mod specz_errors;
pub mod templates;

pub use batch::{BatchOutcome, BatchParams, BatchRunRecord, SkipPolicy};
pub use fit::{Chi2Curve, Chi2Point, FitEngine, FitParams, FitResult, FitWindow, ZInterval};
pub use guess::{GuessColumns, GuessEntry, GuessKind, GuessTable};
pub use metadata::{FitArtifact, MetadataStore, QualityMetadata, ZConfidence};
pub use session::{ObjectState, Session};
pub use spectrum::loader::DirectoryIndex;
pub use spectrum::{ObjectId, SpectrumRecord};
pub use specz_errors::SpeczError;
pub use templates::{FitStatistic, SpectralLine, Template, TemplateSet, WeightedChi2};
