//! # Metadata store: durable fit artifacts and quality judgments
//!
//! One YAML artifact per object, living next to its 1D spectrum
//! (`<stem>_o1d.zfit.yaml`), holds the **full ordered fit history** plus the
//! optional human quality judgment. This module owns every read and write of
//! those artifacts.
//!
//! ## Persistence contract
//! -----------------
//! * **Atomic saves** – the complete artifact is serialized to a temporary
//!   file in the same directory and renamed over the target, so an
//!   interrupted write leaves either the prior artifact or the new one,
//!   never a half-written record.
//! * **Supersede, never overwrite** – a refit appends a new [`FitResult`]
//!   with the next monotonically increasing version; prior fits remain
//!   reconstructable via [`MetadataStore::history`].
//! * **Exact round-trip** – a saved record read back compares field-for-field
//!   equal, chi-squared curve included.
//! * Writes to different objects touch different files and never interfere;
//!   same-object write ordering is the caller's concern (last write wins,
//!   carrying its own timestamp).
//!
//! ## Quality judgments
//! -----------------
//! [`QualityMetadata`] is created lazily on the first human judgment and is
//! never auto-deleted. The confidence flag serializes as the 1–4 integer
//! grade under the `z_conf` key, matching artifacts written by the original
//! review tooling.

use std::fmt;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Epoch;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::fit::FitResult;
use crate::spectrum::loader::DirectoryIndex;
use crate::spectrum::ObjectId;
use crate::specz_errors::SpeczError;

/// Categorical confidence in a redshift assignment.
///
/// Ordering is by increasing confidence; the numeric grade (1–4) is the
/// on-disk form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ZConfidence {
    Rejected,
    Insecure,
    Probable,
    Secure,
}

impl ZConfidence {
    /// The 1–4 integer grade used in artifacts.
    pub fn grade(self) -> u8 {
        match self {
            ZConfidence::Rejected => 1,
            ZConfidence::Insecure => 2,
            ZConfidence::Probable => 3,
            ZConfidence::Secure => 4,
        }
    }
}

impl TryFrom<u8> for ZConfidence {
    type Error = SpeczError;

    fn try_from(grade: u8) -> Result<Self, Self::Error> {
        match grade {
            1 => Ok(ZConfidence::Rejected),
            2 => Ok(ZConfidence::Insecure),
            3 => Ok(ZConfidence::Probable),
            4 => Ok(ZConfidence::Secure),
            other => Err(SpeczError::InvalidConfidenceGrade(other)),
        }
    }
}

impl From<ZConfidence> for u8 {
    fn from(c: ZConfidence) -> Self {
        c.grade()
    }
}

impl fmt::Display for ZConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ZConfidence::Rejected => "rejected",
            ZConfidence::Insecure => "insecure",
            ZConfidence::Probable => "probable",
            ZConfidence::Secure => "secure",
        };
        write!(f, "{name}")
    }
}

/// Human quality judgment of one fit version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetadata {
    #[serde(rename = "z_conf")]
    pub flag: ZConfidence,
    pub comment: String,
    /// Version of the [`FitResult`] this judgment refers to.
    pub judged_version: u32,
    pub updated_at: String,
}

/// On-disk artifact: one object's complete fit history plus judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitArtifact {
    pub object_id: ObjectId,
    /// Fit history, oldest first; the last entry is the current fit.
    pub fits: Vec<FitResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityMetadata>,
}

impl FitArtifact {
    fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            fits: Vec::new(),
            quality: None,
        }
    }

    /// The current (latest) fit, if any.
    pub fn latest(&self) -> Option<&FitResult> {
        self.fits.last()
    }
}

/// Durable record of fits and judgments, one YAML file per object.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    index: Arc<DirectoryIndex>,
}

impl MetadataStore {
    pub fn new(index: Arc<DirectoryIndex>) -> Self {
        Self { index }
    }

    fn artifact_path(&self, id: ObjectId) -> Result<Utf8PathBuf, SpeczError> {
        self.index
            .artifact_path(id)
            .ok_or(SpeczError::SpectrumNotFound(id))
    }

    /// Read the full artifact for `id`, or `None` when no artifact exists.
    pub fn read_artifact(&self, id: ObjectId) -> Result<Option<FitArtifact>, SpeczError> {
        let path = self.artifact_path(id)?;
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(serde_yaml::from_str(&raw)?))
    }

    /// Persist a new fit for `id`, superseding (not overwriting) any prior
    /// fits.
    ///
    /// The stored copy is stamped with the next per-object version and
    /// returned; callers should cache the returned value, not their input.
    ///
    /// Arguments
    /// -----------------
    /// * `id`: The object the fit belongs to.
    /// * `fit`: The engine's result (its `version` field is overwritten).
    ///
    /// Return
    /// ----------
    /// * The versioned, persisted [`FitResult`].
    pub fn save(&self, id: ObjectId, mut fit: FitResult) -> Result<FitResult, SpeczError> {
        let path = self.artifact_path(id)?;
        let mut artifact = self.read_or_recover(id, &path)?;

        fit.version = artifact.latest().map_or(1, |prev| prev.version + 1);
        artifact.fits.push(fit.clone());
        write_atomic(&path, &artifact)?;
        Ok(fit)
    }

    /// Existing artifact, or a fresh one when none exists **or the file on
    /// disk is unreadable**. Like [`MetadataStore::has_fit`], an unreadable
    /// artifact must not make the object unfittable forever: the corrupt
    /// file is set aside (renamed to `<artifact>.corrupt`) and a new history
    /// starts at version 1.
    fn read_or_recover(&self, id: ObjectId, path: &Utf8Path) -> Result<FitArtifact, SpeczError> {
        match self.read_artifact(id) {
            Ok(Some(artifact)) => Ok(artifact),
            Ok(None) => Ok(FitArtifact::new(id)),
            Err(SpeczError::SpectrumNotFound(_)) => Err(SpeczError::SpectrumNotFound(id)),
            Err(e) => {
                warn!("unreadable fit artifact for {id}, starting a fresh history: {e}");
                let aside = Utf8PathBuf::from(format!("{path}.corrupt"));
                if let Err(rename_err) = fs::rename(path, &aside) {
                    warn!("could not set aside corrupt artifact {path}: {rename_err}");
                }
                Ok(FitArtifact::new(id))
            }
        }
    }

    /// Load the latest fit and any quality judgment for `id`.
    ///
    /// Return
    /// ----------
    /// * `(latest FitResult, Option<QualityMetadata>)`, or
    ///   [`SpeczError::RecordNotFound`] when no fit has ever been saved.
    pub fn load(
        &self,
        id: ObjectId,
    ) -> Result<(FitResult, Option<QualityMetadata>), SpeczError> {
        let artifact = self
            .read_artifact(id)?
            .ok_or(SpeczError::RecordNotFound(id))?;
        let latest = artifact
            .latest()
            .cloned()
            .ok_or(SpeczError::RecordNotFound(id))?;
        Ok((latest, artifact.quality))
    }

    /// Full fit history for `id`, oldest first.
    pub fn history(&self, id: ObjectId) -> Result<Vec<FitResult>, SpeczError> {
        let artifact = self
            .read_artifact(id)?
            .ok_or(SpeczError::RecordNotFound(id))?;
        Ok(artifact.fits)
    }

    /// Record a human quality judgment against the latest fit.
    ///
    /// Creates the quality block lazily on first judgment; requires at least
    /// one persisted fit to judge.
    pub fn set_quality(
        &self,
        id: ObjectId,
        flag: ZConfidence,
        comment: &str,
    ) -> Result<QualityMetadata, SpeczError> {
        let path = self.artifact_path(id)?;
        let mut artifact = self
            .read_artifact(id)?
            .ok_or(SpeczError::RecordNotFound(id))?;
        let judged_version = artifact
            .latest()
            .map(|f| f.version)
            .ok_or(SpeczError::RecordNotFound(id))?;

        let quality = QualityMetadata {
            flag,
            comment: comment.to_string(),
            judged_version,
            updated_at: utc_now_string()?,
        };
        artifact.quality = Some(quality.clone());
        write_atomic(&path, &artifact)?;
        Ok(quality)
    }

    /// The stored quality judgment, if any fit artifact exists.
    pub fn quality(&self, id: ObjectId) -> Result<Option<QualityMetadata>, SpeczError> {
        Ok(self.read_artifact(id)?.and_then(|a| a.quality))
    }

    /// Whether a prior fit exists for `id`.
    ///
    /// Unreadable artifacts count as "no fit" (logged): a batch run must be
    /// able to re-fit past a corrupt artifact rather than skip the object
    /// forever.
    pub fn has_fit(&self, id: ObjectId) -> bool {
        match self.read_artifact(id) {
            Ok(Some(artifact)) => !artifact.fits.is_empty(),
            Ok(None) => false,
            Err(e) => {
                warn!("unreadable fit artifact for {id}: {e}");
                false
            }
        }
    }
}

/// Serialize the artifact to a sibling temp file, then rename into place.
fn write_atomic(path: &Utf8Path, artifact: &FitArtifact) -> Result<(), SpeczError> {
    let yaml = serde_yaml::to_string(artifact)?;
    let tmp = Utf8PathBuf::from(format!("{path}.tmp"));
    fs::write(&tmp, yaml)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn utc_now_string() -> Result<String, SpeczError> {
    Ok(Epoch::now()
        .map_err(|e| SpeczError::TimeError(e.to_string()))?
        .to_string())
}

#[cfg(test)]
mod confidence_tests {
    use super::*;

    #[test]
    fn grades_round_trip() {
        for grade in 1..=4u8 {
            let c = ZConfidence::try_from(grade).unwrap();
            assert_eq!(c.grade(), grade);
        }
        assert!(ZConfidence::try_from(0).is_err());
        assert!(ZConfidence::try_from(5).is_err());
    }

    #[test]
    fn ordering_follows_confidence() {
        assert!(ZConfidence::Rejected < ZConfidence::Insecure);
        assert!(ZConfidence::Probable < ZConfidence::Secure);
    }
}
