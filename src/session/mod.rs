//! # Session: navigation state and per-session fit cache
//!
//! This module defines the [`Session`] struct, the central façade that wires
//! together:
//!
//! 1. **Directory index** ([`DirectoryIndex`]) — identifier order and
//!    spectrum paths for one directory of objects.
//! 2. **Metadata store** — durable fit artifacts and quality judgments.
//! 3. **Fit engine and template set** — shared, read-only fitting
//!    machinery.
//! 4. **Navigation state** — current position plus an unbounded in-memory
//!    cache of fit results computed or loaded this session, so re-visiting
//!    an object never re-invokes the engine.
//!
//! Sessions are plain values: two sessions over the same directory do not
//! interfere through globals, which keeps concurrent sessions and tests
//! independent. The cache is discarded wholesale when the session drops.
//!
//! ## Cache invalidation
//! -----------------
//! * [`Session::refit`] overwrites the object's cache entry with the new
//!   result **before** returning, so any subsequent read observes the
//!   superseding fit.
//! * A batch run evicts the cache entries of every object it re-fit; the
//!   next [`Session::load_object`] re-reads the store.
//!
//! ## Typical usage
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use specz::fit::FitWindow;
//! use specz::session::Session;
//!
//! let mut session = Session::open(Utf8Path::new("/data/prism"))?;
//! if let Some(id) = session.next() {
//!     let state = session.load_object(id)?;
//!     println!("{} has {} samples", id, state.spectrum.len());
//!     let refit = session.refit(id, FitWindow::new(1.8, 2.4)?)?;
//!     println!("z = {:.4} (v{})", refit.z, refit.version);
//! }
//! # Ok::<(), specz::specz_errors::SpeczError>(())
//! ```

use std::sync::Arc;

use camino::Utf8Path;

use crate::batch::{self, BatchOutcome, BatchParams, BatchRunRecord};
use crate::constants::FitCache;
use crate::fit::{FitEngine, FitParams, FitResult, FitWindow};
use crate::guess::GuessTable;
use crate::metadata::{MetadataStore, QualityMetadata, ZConfidence};
use crate::spectrum::loader::DirectoryIndex;
use crate::spectrum::{ObjectId, SpectrumRecord};
use crate::specz_errors::SpeczError;
use crate::templates::{FitStatistic, TemplateSet, WeightedChi2};

/// Everything the presentation layer needs to display one object.
#[derive(Debug, Clone)]
pub struct ObjectState {
    pub spectrum: SpectrumRecord,
    /// Latest fit, from the session cache or the store; `None` when the
    /// object has never been fit.
    pub fit: Option<FitResult>,
    pub quality: Option<QualityMetadata>,
}

/// Interactive session over one directory of objects.
#[derive(Debug)]
pub struct Session<S = WeightedChi2> {
    index: Arc<DirectoryIndex>,
    store: MetadataStore,
    engine: FitEngine<S>,
    templates: Arc<TemplateSet>,
    position: Option<usize>,
    cache: FitCache,
}

impl Session<WeightedChi2> {
    /// Open a session with default fit parameters, the built-in template
    /// set, and the built-in statistic.
    pub fn open(root: &Utf8Path) -> Result<Self, SpeczError> {
        Self::with_config(root, FitParams::default(), TemplateSet::builtin())
    }

    /// Open a session with explicit fit parameters and templates.
    pub fn with_config(
        root: &Utf8Path,
        params: FitParams,
        templates: TemplateSet,
    ) -> Result<Self, SpeczError> {
        let index = Arc::new(DirectoryIndex::scan(root)?);
        Ok(Self {
            store: MetadataStore::new(Arc::clone(&index)),
            engine: FitEngine::new(params),
            templates: Arc::new(templates),
            index,
            position: None,
            cache: FitCache::default(),
        })
    }
}

impl<S: FitStatistic> Session<S> {
    /// Session with a caller-supplied goodness-of-fit statistic.
    pub fn with_statistic(
        root: &Utf8Path,
        params: FitParams,
        templates: TemplateSet,
        statistic: S,
    ) -> Result<Self, SpeczError> {
        let index = Arc::new(DirectoryIndex::scan(root)?);
        Ok(Self {
            store: MetadataStore::new(Arc::clone(&index)),
            engine: FitEngine::with_statistic(params, statistic),
            templates: Arc::new(templates),
            index,
            position: None,
            cache: FitCache::default(),
        })
    }

    pub fn index(&self) -> &DirectoryIndex {
        &self.index
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// All identifiers, in navigation order.
    pub fn ids(&self) -> &[ObjectId] {
        self.index.ids()
    }

    /// Identifier at the current navigation position.
    pub fn current(&self) -> Option<ObjectId> {
        self.position.map(|i| self.index.ids()[i])
    }

    /// Advance to the next object; `None` at the end of the list (position
    /// is left unchanged).
    pub fn next(&mut self) -> Option<ObjectId> {
        let ids = self.index.ids();
        let candidate = match self.position {
            None if ids.is_empty() => return None,
            None => 0,
            Some(i) if i + 1 < ids.len() => i + 1,
            Some(_) => return None,
        };
        self.position = Some(candidate);
        Some(ids[candidate])
    }

    /// Step back to the previous object; `None` at the start of the list.
    pub fn previous(&mut self) -> Option<ObjectId> {
        match self.position {
            Some(i) if i > 0 => {
                self.position = Some(i - 1);
                Some(self.index.ids()[i - 1])
            }
            _ => None,
        }
    }

    /// Jump directly to an identifier.
    pub fn jump_to(&mut self, id: ObjectId) -> Result<(), SpeczError> {
        let pos = self
            .index
            .ids()
            .binary_search(&id)
            .map_err(|_| SpeczError::SpectrumNotFound(id))?;
        self.position = Some(pos);
        Ok(())
    }

    /// Materialize one object: spectrum plus latest fit and judgment.
    ///
    /// Fit results come from the session cache when present; a store hit is
    /// cached for subsequent reads. Moves the navigation position to `id`.
    pub fn load_object(&mut self, id: ObjectId) -> Result<ObjectState, SpeczError> {
        self.jump_to(id)?;
        let spectrum = self.index.load_spectrum(id)?;

        let fit = match self.cache.get(&id) {
            Some(hit) => Some(hit.clone()),
            None => match self.store.load(id) {
                Ok((fit, _)) => {
                    self.cache.insert(id, fit.clone());
                    Some(fit)
                }
                Err(SpeczError::RecordNotFound(_)) => None,
                Err(e) => return Err(e),
            },
        };
        let quality = self.store.quality(id)?;

        Ok(ObjectState {
            spectrum,
            fit,
            quality,
        })
    }

    /// Re-fit `id` over a caller-supplied window, superseding any prior fit.
    ///
    /// The new result is persisted and installed in the cache before this
    /// method returns, so no subsequent read can observe the stale fit.
    pub fn refit(&mut self, id: ObjectId, window: FitWindow) -> Result<FitResult, SpeczError> {
        let spectrum = self.index.load_spectrum(id)?;
        let fit = self.engine.fit(&spectrum, window, &self.templates)?;
        let stored = self.store.save(id, fit)?;
        self.cache.insert(id, stored.clone());
        Ok(stored)
    }

    /// Record a human quality judgment for `id`'s latest fit.
    pub fn set_quality(
        &mut self,
        id: ObjectId,
        flag: ZConfidence,
        comment: &str,
    ) -> Result<QualityMetadata, SpeczError> {
        self.store.set_quality(id, flag, comment)
    }

    /// Fit result currently memoized for `id`, if any.
    pub fn cached_fit(&self, id: ObjectId) -> Option<&FitResult> {
        self.cache.get(&id)
    }

    /// Run an unattended batch over this session's directory.
    ///
    /// Cache entries of every object the batch re-fit are evicted, so later
    /// reads observe the superseding results.
    pub fn run_batch(
        &mut self,
        guess: Option<&GuessTable>,
        params: &BatchParams,
    ) -> BatchRunRecord {
        self.run_batch_with_cancel(guess, params, || false)
    }

    /// Batch with cooperative cancellation between objects.
    pub fn run_batch_with_cancel<F>(
        &mut self,
        guess: Option<&GuessTable>,
        params: &BatchParams,
        should_cancel: F,
    ) -> BatchRunRecord
    where
        F: FnMut() -> bool,
    {
        let record = batch::run_batch_with_cancel(
            &self.index,
            &self.store,
            &self.engine,
            &self.templates,
            guess,
            params,
            should_cancel,
        );
        for (id, outcome) in record.outcomes() {
            if matches!(outcome, BatchOutcome::FitSucceeded { .. }) {
                self.cache.remove(id);
            }
        }
        record
    }
}
