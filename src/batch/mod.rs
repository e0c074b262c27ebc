//! # Batch re-fitting over a directory of objects
//!
//! Run the redshift fit over **every object** in a [`DirectoryIndex`] that
//! still lacks a satisfactory fit, collect **per-object outcomes**, and
//! return a [`BatchRunRecord`] for reporting.
//!
//! ## Overview
//! -----------------
//! Objects are processed **sequentially in identifier order**, which keeps
//! runs reproducible and resumable. For each object the controller:
//!
//! 1. consults the skip policy against the metadata store,
//! 2. loads the 1D spectrum,
//! 3. derives the search window from the guess table entry when one matches
//!    (a tight window around the prior) or the configured wide window
//!    otherwise,
//! 4. invokes the fit engine and persists the result.
//!
//! ## Error Semantics
//! -----------------
//! Failures are **per-object**: a load, fit, or persistence error for one
//! object is caught at the object boundary, recorded as
//! [`BatchOutcome::FitFailed`] with an error summary, and processing
//! continues. A batch run never aborts because one object is malformed.
//! The record always contains one outcome per considered object.
//!
//! ## Execution Modes
//! -----------------
//! ### Progress UI (feature: `progress`)
//! When compiled with the `progress` feature, [`run_batch`] renders a live
//! progress bar (via `indicatif`) showing throughput, ETA, and the
//! identifier currently being fit.
//!
//! ### Cooperative cancellation
//! [`run_batch_with_cancel`] periodically calls a user-provided
//! `should_cancel()` closure based on **wall-clock intervals** (not
//! iteration counts): the in-flight object finishes, no further object
//! starts, and the record is marked cancelled.
//!
//! The record is ephemeral — it is returned to the caller and never
//! persisted.

use std::fmt;
use std::time::{Duration, Instant};

use crate::fit::{FitEngine, FitWindow};
use crate::guess::GuessTable;
use crate::metadata::{MetadataStore, ZConfidence};
use crate::spectrum::loader::DirectoryIndex;
use crate::spectrum::ObjectId;
use crate::templates::{FitStatistic, TemplateSet};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

/// Minimum wall-clock interval between cancellation polls.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// When an object with a prior fit is skipped rather than re-fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipPolicy {
    /// Skip whenever any fit result exists, judged or not (default:
    /// "missing" means no fit at all).
    #[default]
    ExistingFit,
    /// Skip only when a judgment at or above this confidence exists;
    /// unjudged or lower-confidence objects are re-fit.
    MinConfidence(ZConfidence),
    /// Re-fit everything.
    Never,
}

/// Batch run configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchParams {
    /// Window used when no guess-table prior matches an object.
    pub window: FitWindow,
    pub skip: SkipPolicy,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self {
            window: FitWindow::default_wide(),
            skip: SkipPolicy::ExistingFit,
        }
    }
}

/// Outcome of one object within a batch run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    FitSucceeded { z: f64, version: u32 },
    FitFailed { summary: String },
    SkippedAlreadyFit,
}

/// Ephemeral record of one batch invocation.
#[derive(Debug, Clone, Default)]
pub struct BatchRunRecord {
    outcomes: Vec<(ObjectId, BatchOutcome)>,
    cancelled: bool,
}

impl BatchRunRecord {
    /// Per-object outcomes, in processing (identifier) order.
    pub fn outcomes(&self) -> &[(ObjectId, BatchOutcome)] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::FitSucceeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::FitFailed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::SkippedAlreadyFit))
    }

    /// True when the run stopped early through cooperative cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn count(&self, pred: impl Fn(&BatchOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

impl fmt::Display for BatchRunRecord {
    /// Compact by default; pretty multi-line when using the alternate flag (`{:#}`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Batch run — summary")?;
            writeln!(f, "-------------------")?;
            writeln!(f, "objects   : {}", self.len())?;
            writeln!(f, "succeeded : {}", self.succeeded())?;
            writeln!(f, "failed    : {}", self.failed())?;
            writeln!(f, "skipped   : {}", self.skipped())?;
            write!(f, "cancelled : {}", self.cancelled)
        } else {
            write!(
                f,
                "objects={}, succeeded={}, failed={}, skipped={}, cancelled={}",
                self.len(),
                self.succeeded(),
                self.failed(),
                self.skipped(),
                self.cancelled
            )
        }
    }
}

/// Fit every object in the index that the skip policy lets through.
///
/// Arguments
/// -----------------
/// * `index`: Directory index providing identifier order and spectra.
/// * `store`: Metadata store consulted for skips and used for persistence.
/// * `engine`: Configured fit engine.
/// * `templates`: Read-only template library.
/// * `guess`: Optional table of redshift priors seeding tight windows.
/// * `params`: Skip policy and default window.
///
/// Return
/// ----------
/// * The [`BatchRunRecord`] with one outcome per object.
pub fn run_batch<S: FitStatistic>(
    index: &DirectoryIndex,
    store: &MetadataStore,
    engine: &FitEngine<S>,
    templates: &TemplateSet,
    guess: Option<&GuessTable>,
    params: &BatchParams,
) -> BatchRunRecord {
    run_batch_with_cancel(index, store, engine, templates, guess, params, || false)
}

/// Cooperative-cancellation variant of [`run_batch`].
///
/// `should_cancel()` is polled on a wall-clock interval between objects;
/// the in-flight object always completes.
#[cfg(not(feature = "progress"))]
pub fn run_batch_with_cancel<S: FitStatistic, F>(
    index: &DirectoryIndex,
    store: &MetadataStore,
    engine: &FitEngine<S>,
    templates: &TemplateSet,
    guess: Option<&GuessTable>,
    params: &BatchParams,
    mut should_cancel: F,
) -> BatchRunRecord
where
    F: FnMut() -> bool,
{
    let mut record = BatchRunRecord::default();
    let mut last_poll = Instant::now();

    for &id in index.ids() {
        if last_poll.elapsed() >= POLL_INTERVAL {
            if should_cancel() {
                record.cancelled = true;
                break;
            }
            last_poll = Instant::now();
        }

        let outcome = process_object(index, store, engine, templates, guess, params, id);
        record.outcomes.push((id, outcome));
    }

    record
}

#[cfg(feature = "progress")]
pub fn run_batch_with_cancel<S: FitStatistic, F>(
    index: &DirectoryIndex,
    store: &MetadataStore,
    engine: &FitEngine<S>,
    templates: &TemplateSet,
    guess: Option<&GuessTable>,
    params: &BatchParams,
    mut should_cancel: F,
) -> BatchRunRecord
where
    F: FnMut() -> bool,
{
    let total = index.len() as u64;
    let pb = ProgressBar::new(total.max(1));
    pb.set_style(
        ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
        )
        .expect("indicatif template"),
    );
    pb.enable_steady_tick(Duration::from_millis(200));

    let mut record = BatchRunRecord::default();
    let mut last_poll = Instant::now();

    for &id in index.ids() {
        if last_poll.elapsed() >= POLL_INTERVAL {
            if should_cancel() {
                record.cancelled = true;
                pb.set_message("Interrupted");
                break;
            }
            last_poll = Instant::now();
        }

        pb.set_message(id.to_string());

        let outcome = process_object(index, store, engine, templates, guess, params, id);
        record.outcomes.push((id, outcome));

        pb.inc(1);
    }

    pb.disable_steady_tick();
    pb.finish_and_clear();
    record
}

/// One object, with every failure caught at this boundary.
fn process_object<S: FitStatistic>(
    index: &DirectoryIndex,
    store: &MetadataStore,
    engine: &FitEngine<S>,
    templates: &TemplateSet,
    guess: Option<&GuessTable>,
    params: &BatchParams,
    id: ObjectId,
) -> BatchOutcome {
    if should_skip(store, params.skip, id) {
        return BatchOutcome::SkippedAlreadyFit;
    }

    let window = guess
        .and_then(|g| g.get(id))
        .map(|entry| entry.window())
        .unwrap_or(params.window);

    let attempt = || -> Result<BatchOutcome, crate::specz_errors::SpeczError> {
        let spectrum = index.load_spectrum(id)?;
        let fit = engine.fit(&spectrum, window, templates)?;
        let stored = store.save(id, fit)?;
        Ok(BatchOutcome::FitSucceeded {
            z: stored.z,
            version: stored.version,
        })
    };

    match attempt() {
        Ok(outcome) => outcome,
        Err(e) => BatchOutcome::FitFailed {
            summary: e.to_string(),
        },
    }
}

fn should_skip(store: &MetadataStore, policy: SkipPolicy, id: ObjectId) -> bool {
    match policy {
        SkipPolicy::Never => false,
        SkipPolicy::ExistingFit => store.has_fit(id),
        SkipPolicy::MinConfidence(threshold) => {
            if !store.has_fit(id) {
                return false;
            }
            match store.quality(id) {
                Ok(Some(q)) => q.flag >= threshold,
                // Unjudged or unreadable: the fit is not yet satisfactory.
                _ => false,
            }
        }
    }
}
