use std::fs;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use specz::{
    batch, BatchOutcome, BatchParams, DirectoryIndex, FitEngine, FitParams, FitStatistic,
    FitWindow, GuessTable, MetadataStore, ObjectId, SkipPolicy, SpectrumRecord, Template,
    TemplateSet, ZConfidence,
};

mod common;
use common::{scratch_dir, write_corrupt_spectrum, write_template_spectrum};

fn setup(
    dir: &camino::Utf8Path,
) -> (Arc<DirectoryIndex>, MetadataStore, FitEngine, TemplateSet) {
    let index = Arc::new(DirectoryIndex::scan(dir).unwrap());
    let store = MetadataStore::new(Arc::clone(&index));
    (index, store, FitEngine::default(), TemplateSet::builtin())
}

#[test]
fn batch_attempts_exactly_the_unfit_objects() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = scratch_dir(&tmp);
    let fitted = write_template_spectrum(&dir, 1, 1, 1, 1.2, 4.0, 0.5);
    write_template_spectrum(&dir, 1, 2, 1, 2.1, 4.0, 0.5);
    write_template_spectrum(&dir, 1, 3, 2, 1.0, 4.0, 0.5);

    let (index, store, engine, templates) = setup(&dir);

    // Pre-fit one object so the default skip policy leaves it alone.
    let spectrum = index.load_spectrum(fitted).unwrap();
    let prior = engine
        .fit(&spectrum, FitWindow::new(0.8, 1.6).unwrap(), &templates)
        .unwrap();
    store.save(fitted, prior).unwrap();

    let record = batch::run_batch(
        &index,
        &store,
        &engine,
        &templates,
        None,
        &BatchParams::default(),
    );

    // N objects in, N outcomes out: skipped + attempted == N.
    assert_eq!(record.len(), 3);
    assert_eq!(record.skipped(), 1);
    assert_eq!(record.succeeded(), 2);
    assert_eq!(record.failed(), 0);
    assert_eq!(
        record.succeeded() + record.failed() + record.skipped(),
        record.len()
    );
    assert!(!record.was_cancelled());

    // Outcomes are reported in identifier order.
    let ids: Vec<ObjectId> = record.outcomes().iter().map(|(id, _)| *id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn one_corrupt_spectrum_fails_alone_without_aborting_the_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = scratch_dir(&tmp);
    write_template_spectrum(&dir, 1, 1, 1, 1.2, 4.0, 0.5);
    let corrupt = write_corrupt_spectrum(&dir, 1, 2);
    write_template_spectrum(&dir, 1, 3, 1, 2.1, 4.0, 0.5);

    let (index, store, engine, templates) = setup(&dir);
    let record = batch::run_batch(
        &index,
        &store,
        &engine,
        &templates,
        None,
        &BatchParams::default(),
    );

    assert_eq!(record.len(), 3);
    assert_eq!(record.failed(), 1);
    assert_eq!(record.succeeded(), 2);
    let (failed_id, outcome) = record
        .outcomes()
        .iter()
        .find(|(_, o)| matches!(o, BatchOutcome::FitFailed { .. }))
        .unwrap();
    assert_eq!(*failed_id, corrupt);
    if let BatchOutcome::FitFailed { summary } = outcome {
        assert!(!summary.is_empty());
    }
    // The failure left no artifact behind.
    assert!(!store.has_fit(corrupt));
}

#[test]
fn guess_entry_seeds_a_tight_window_and_unmatched_entries_are_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = scratch_dir(&tmp);
    let seeded = write_template_spectrum(&dir, 1, 1, 1, 2.1, 4.0, 0.5);
    let unseeded = write_template_spectrum(&dir, 1, 2, 1, 2.1, 4.0, 0.5);

    // Prior for object (1,1) plus an entry for an object that does not
    // exist in the directory at all.
    let table_path = Utf8PathBuf::from_path_buf(tmp.path().join("guesses.csv")).unwrap();
    fs::write(&table_path, "obsid,objid,specz\n1,1,2.1\n9,999,4.2\n").unwrap();
    let guesses = GuessTable::load(&table_path).unwrap();

    let (index, store, engine, templates) = setup(&dir);
    let record = batch::run_batch(
        &index,
        &store,
        &engine,
        &templates,
        Some(&guesses),
        &BatchParams::default(),
    );
    assert_eq!(record.len(), 2);
    assert_eq!(record.succeeded(), 2);

    // The seeded object was searched around the prior, not the wide window.
    let (fit, _) = store.load(seeded).unwrap();
    assert_eq!(fit.window, guesses.get(seeded).unwrap().window());
    // The unseeded object got the default wide window.
    let (fit, _) = store.load(unseeded).unwrap();
    assert_eq!(fit.window, FitWindow::default_wide());
}

#[test]
fn object_with_an_unreadable_artifact_is_refit_successfully() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = scratch_dir(&tmp);
    let id = write_template_spectrum(&dir, 1, 1, 1, 2.1, 4.0, 0.5);

    let (index, store, engine, templates) = setup(&dir);
    let artifact = index.artifact_path(id).unwrap();
    fs::write(&artifact, ":: not yaml ::{{{").unwrap();

    let record = batch::run_batch(
        &index,
        &store,
        &engine,
        &templates,
        None,
        &BatchParams::default(),
    );
    assert_eq!(record.succeeded(), 1);
    assert_eq!(record.failed(), 0);
    assert_eq!(store.load(id).unwrap().0.version, 1);

    // A second run now skips the recovered object instead of retrying.
    let record = batch::run_batch(
        &index,
        &store,
        &engine,
        &templates,
        None,
        &BatchParams::default(),
    );
    assert_eq!(record.skipped(), 1);
}

#[test]
fn min_confidence_policy_refits_unjudged_and_low_confidence_objects() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = scratch_dir(&tmp);
    let secure = write_template_spectrum(&dir, 1, 1, 1, 1.2, 4.0, 0.5);
    let insecure = write_template_spectrum(&dir, 1, 2, 1, 1.2, 4.0, 0.5);
    let unjudged = write_template_spectrum(&dir, 1, 3, 1, 1.2, 4.0, 0.5);

    let (index, store, engine, templates) = setup(&dir);
    let window = FitWindow::new(0.8, 1.6).unwrap();
    for id in [secure, insecure, unjudged] {
        let spectrum = index.load_spectrum(id).unwrap();
        let fit = engine.fit(&spectrum, window, &templates).unwrap();
        store.save(id, fit).unwrap();
    }
    store.set_quality(secure, ZConfidence::Secure, "").unwrap();
    store.set_quality(insecure, ZConfidence::Insecure, "").unwrap();

    let params = BatchParams {
        skip: SkipPolicy::MinConfidence(ZConfidence::Probable),
        ..BatchParams::default()
    };
    let record = batch::run_batch(&index, &store, &engine, &templates, None, &params);

    assert_eq!(record.skipped(), 1);
    assert_eq!(record.succeeded(), 2);
    assert_eq!(store.load(secure).unwrap().0.version, 1);
    assert_eq!(store.load(insecure).unwrap().0.version, 2);
    assert_eq!(store.load(unjudged).unwrap().0.version, 2);
}

/// Statistic that stalls long enough for the wall-clock cancellation poll
/// to trigger between objects.
#[derive(Clone, Copy)]
struct SlowConstant;

impl FitStatistic for SlowConstant {
    fn chi2(&self, _spectrum: &SpectrumRecord, _template: &Template, _z: f64) -> f64 {
        std::thread::sleep(Duration::from_millis(10));
        1.0
    }
}

#[test]
fn cancellation_finishes_the_in_flight_object_then_stops() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = scratch_dir(&tmp);
    for source in 1..=3 {
        write_template_spectrum(&dir, 1, source, 1, 1.2, 4.0, 0.5);
    }

    let index = Arc::new(DirectoryIndex::scan(&dir).unwrap());
    let store = MetadataStore::new(Arc::clone(&index));
    // Coarse two-point grid so each object takes a handful of slow
    // statistic calls (tens of milliseconds), exceeding the poll interval.
    let params = FitParams::builder().coarse_step(0.5).build().unwrap();
    let engine = FitEngine::with_statistic(params, SlowConstant);
    let templates = TemplateSet::new(vec![TemplateSet::builtin().templates()[1].clone()]);

    let batch_params = BatchParams {
        window: FitWindow::new(0.0, 1.0).unwrap(),
        ..BatchParams::default()
    };
    let record = batch::run_batch_with_cancel(
        &index,
        &store,
        &engine,
        &templates,
        None,
        &batch_params,
        || true,
    );

    assert!(record.was_cancelled());
    assert!(record.len() >= 1, "the in-flight object completes");
    assert!(record.len() < 3, "no further object starts after the poll");
}
