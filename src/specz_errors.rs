use thiserror::Error;

use crate::spectrum::ObjectId;

/// Crate-wide error type.
///
/// Every fallible operation in the library surfaces one of these variants.
/// Within a batch run, per-object errors are caught at the object boundary
/// and recorded as outcomes instead of propagating.
#[derive(Error, Debug)]
pub enum SpeczError {
    #[error("No 1D spectrum found for object {0}")]
    SpectrumNotFound(ObjectId),

    #[error("Corrupt spectrum file {path}: {reason}")]
    CorruptSpectrum { path: String, reason: String },

    #[error("No fit record for object {0}")]
    RecordNotFound(ObjectId),

    #[error("Invalid redshift window: [{z_min}, {z_max}] (need finite z_min < z_max)")]
    InvalidWindow { z_min: f64, z_max: f64 },

    #[error("Numerical failure during fit: {0}")]
    NumericalFailure(String),

    #[error("Malformed guess table: {0}")]
    MalformedTable(String),

    #[error("Duplicate object identifier {id} in directory ({first} vs {second})")]
    DuplicateObject {
        id: ObjectId,
        first: String,
        second: String,
    },

    #[error("Cannot parse object identifier from: {0}")]
    InvalidObjectId(String),

    #[error("Invalid fit parameters: {0}")]
    InvalidFitParams(String),

    #[error("Invalid confidence grade: {0} (expected 1..=4)")]
    InvalidConfidenceGrade(u8),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("YAML artifact error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Time source error: {0}")]
    TimeError(String),
}
