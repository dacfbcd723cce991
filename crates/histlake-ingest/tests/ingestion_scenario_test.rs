//! End-to-end ingestion scenarios
//!
//! A data directory holds `a.csv` and `b.zip` (with `inner/b.csv` and a
//! traversal entry `../evil.csv`). The same targets are then ingested again
//! unchanged, and once more with force.

mod common;

use common::{files_under, write_export, write_zip, CountingWriter, EXPORT_2023_01};
use histlake_common::{Scope, Slot};
use histlake_ingest::sandbox;
use histlake_ingest::{
    CandidateFile, FileCollector, FileOutcome, HistorianCsvReader, IngestionLedger,
    IngestionPipeline, Orchestrator, RunOutcome,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn scope() -> Scope {
    Scope::new("P1", "M1", "S1").unwrap()
}

fn seed(data: &Path) {
    write_export(&data.join("a.csv"));
    write_zip(
        &data.join("b.zip"),
        &[("inner/b.csv", EXPORT_2023_01), ("../evil.csv", EXPORT_2023_01)],
    );
}

fn run(ledger: &IngestionLedger, writer: &CountingWriter, data: &Path, force: bool) -> RunOutcome {
    let pipeline = IngestionPipeline::new(ledger, HistorianCsvReader::new(), writer.clone(), scope());
    Orchestrator::new(FileCollector::default(), pipeline)
        .process_targets(&[data], force)
        .unwrap()
}

fn counts(outcome: &RunOutcome) -> (usize, usize, usize) {
    let summary = outcome.summary().expect("run should have found work");
    (summary.processed, summary.skipped, summary.failed)
}

#[test]
fn test_first_run_processes_loose_and_archived_files() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    seed(&data);
    let ledger = IngestionLedger::open(dir.path().join("history.db")).unwrap();
    let writer = CountingWriter::new(dir.path().join("lake"));

    let outcome = run(&ledger, &writer, &data, false);

    assert_eq!(counts(&outcome), (2, 0, 0));
    assert_eq!(writer.calls(), 2);
    assert_eq!(ledger.counts().unwrap().processed_files, 2);
    assert!(ledger.is_processed(&Slot::new("a.csv", scope())).unwrap());
    assert!(ledger.is_processed(&Slot::new("b.csv", scope())).unwrap());

    // b.csv landed in the sandbox, evil.csv nowhere
    assert!(data.join("__extracted_csvs__/inner/b.csv").exists());
    assert_eq!(
        files_under(dir.path())
            .into_iter()
            .filter(|p| p.ends_with("evil.csv"))
            .count(),
        0
    );

    let archived = ledger
        .processed_record(&Slot::new("b.csv", scope()))
        .unwrap()
        .unwrap();
    let data_abs = std::path::absolute(&data).unwrap();
    assert_eq!(archived.source_archive, Some(data_abs.join("b.zip")));
    assert_eq!(archived.row_count, Some(2));
    assert_eq!(
        archived.output_paths,
        vec![dir.path().join("lake/P1/M1/S1/2023/01/b.parquet")]
    );
}

#[test]
fn test_traversal_entry_is_refused_by_the_sandbox() {
    assert_eq!(sandbox::admit("../evil.csv"), None);
    assert_eq!(sandbox::admit("inner/b.csv"), Some(PathBuf::from("inner/b.csv")));
}

fn column_names(path: &Path) -> Vec<String> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap()).unwrap();
    builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

#[test]
fn test_same_file_name_under_two_data_sources_keeps_both_outputs() {
    let dir = TempDir::new().unwrap();
    let ledger = IngestionLedger::open(dir.path().join("history.db")).unwrap();
    let writer = CountingWriter::new(dir.path().join("lake"));

    let historian = dir.path().join("historian/a.csv");
    write_export(&historian);
    let lab = dir.path().join("lab/a.csv");
    std::fs::create_dir_all(lab.parent().unwrap()).unwrap();
    std::fs::write(&lab, "Datetime,X9\n2023-01-05 08:00:00,4.2\n").unwrap();

    for (path, data_source) in [(&historian, "pi"), (&lab, "lab")] {
        let scope = Scope::new("P1", "M1", data_source).unwrap();
        let pipeline = IngestionPipeline::new(&ledger, HistorianCsvReader::new(), writer.clone(), scope);
        let summary = pipeline.process(&[CandidateFile::direct(path)], false).unwrap();
        assert_eq!(summary.processed, 1);
    }

    let record = |data_source: &str| {
        let slot = Slot::new("a.csv", Scope::new("P1", "M1", data_source).unwrap());
        ledger.processed_record(&slot).unwrap().unwrap()
    };
    let historian_record = record("pi");
    let lab_record = record("lab");

    assert_ne!(historian_record.output_paths, lab_record.output_paths);
    assert_eq!(
        column_names(&historian_record.output_paths[0]),
        vec!["Datetime", "TAG001", "TAG002"]
    );
    assert_eq!(column_names(&lab_record.output_paths[0]), vec!["Datetime", "X9"]);
}

#[test]
fn test_concurrent_runs_on_one_database_convert_a_file_once() {
    const WORKERS: usize = 4;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("history.db");
    let csv = dir.path().join("data/a.csv");
    write_export(&csv);
    let writer = CountingWriter::new(dir.path().join("lake"));
    let candidate = CandidateFile::direct(&csv);
    let start = Barrier::new(WORKERS);

    let summaries: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                s.spawn(|| {
                    let ledger = IngestionLedger::open(&db).unwrap();
                    let pipeline =
                        IngestionPipeline::new(&ledger, HistorianCsvReader::new(), writer.clone(), scope());
                    start.wait();
                    pipeline.process(std::slice::from_ref(&candidate), false).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(writer.calls(), 1);
    assert_eq!(summaries.iter().map(|s| s.processed).sum::<usize>(), 1);
    assert_eq!(summaries.iter().map(|s| s.skipped).sum::<usize>(), WORKERS - 1);
    assert!(summaries.iter().all(|s| s.failed == 0));

    let ledger = IngestionLedger::open(&db).unwrap();
    assert_eq!(ledger.counts().unwrap().processed_files, 1);
}

#[test]
fn test_rerun_skips_everything() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    seed(&data);
    let ledger = IngestionLedger::open(dir.path().join("history.db")).unwrap();
    let writer = CountingWriter::new(dir.path().join("lake"));

    run(&ledger, &writer, &data, false);
    let rerun = run(&ledger, &writer, &data, false);

    assert_eq!(counts(&rerun), (0, 2, 0));
    assert_eq!(writer.calls(), 2);
    assert!(rerun
        .summary()
        .unwrap()
        .files
        .iter()
        .all(|f| f.outcome == FileOutcome::Skipped));
}

#[test]
fn test_forced_rerun_reprocesses_and_refreshes_timestamps() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    seed(&data);
    let ledger = IngestionLedger::open(dir.path().join("history.db")).unwrap();
    let writer = CountingWriter::new(dir.path().join("lake"));

    run(&ledger, &writer, &data, false);
    let before = ledger.processed_files(&scope()).unwrap();
    std::thread::sleep(Duration::from_millis(5));

    let forced = run(&ledger, &writer, &data, true);
    let after = ledger.processed_files(&scope()).unwrap();

    assert_eq!(counts(&forced), (2, 0, 0));
    assert_eq!(writer.calls(), 4);
    assert_eq!(ledger.counts().unwrap().processed_files, 2);
    assert_eq!(before.len(), after.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.slot, new.slot);
        assert!(new.processed_at > old.processed_at);
    }
}

#[test]
fn test_history_survives_reopening_the_ledger() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let db = dir.path().join("history.db");
    seed(&data);
    let writer = CountingWriter::new(dir.path().join("lake"));

    let ledger = IngestionLedger::open(&db).unwrap();
    run(&ledger, &writer, &data, false);
    ledger.close().unwrap();

    let reopened = IngestionLedger::open(&db).unwrap();
    assert_eq!(counts(&run(&reopened, &writer, &data, false)), (0, 2, 0));
}

#[test]
fn test_header_registration_is_shared_across_files_of_a_scope() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    seed(&data);
    let ledger = IngestionLedger::open_in_memory().unwrap();
    let writer = CountingWriter::new(dir.path().join("lake"));

    let outcome = run(&ledger, &writer, &data, false);

    // Both files carry the same header: only the first one registers new IDs
    let new_ids: Vec<Vec<String>> = outcome
        .summary()
        .unwrap()
        .files
        .iter()
        .map(|f| match &f.outcome {
            FileOutcome::Processed { new_param_ids, .. } => new_param_ids.clone(),
            other => panic!("unexpected outcome {other:?}"),
        })
        .collect();
    assert_eq!(new_ids.iter().map(Vec::len).sum::<usize>(), 2);

    let counts = ledger.counts().unwrap();
    assert_eq!(counts.param_master, 2);
    assert_eq!(counts.parameter_ids, 2);
    assert_eq!(
        ledger.parameter_name("TAG002").unwrap().unwrap().name_en,
        "Reactor temp"
    );
}

#[test]
fn test_broken_file_does_not_stop_the_batch() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    seed(&data);
    std::fs::write(data.join("broken.csv"), "Datetime,T1,T1\n").unwrap();
    let ledger = IngestionLedger::open_in_memory().unwrap();
    let writer = CountingWriter::new(dir.path().join("lake"));

    let outcome = run(&ledger, &writer, &data, false);

    assert_eq!(counts(&outcome), (2, 0, 1));
    assert!(outcome.has_failures());
    assert!(!ledger
        .is_processed(&Slot::new("broken.csv", scope()))
        .unwrap());

    // Fixing the file makes it eligible again
    write_export(&data.join("broken.csv"));
    assert_eq!(counts(&run(&ledger, &writer, &data, false)), (1, 2, 0));
}

#[test]
fn test_no_work_found() {
    let dir = TempDir::new().unwrap();
    let empty = dir.path().join("empty");
    std::fs::create_dir(&empty).unwrap();
    let ledger = IngestionLedger::open_in_memory().unwrap();
    let writer = CountingWriter::new(dir.path().join("lake"));

    assert!(matches!(run(&ledger, &writer, &empty, false), RunOutcome::NoWorkFound { .. }));

    let pipeline = IngestionPipeline::new(&ledger, HistorianCsvReader::new(), writer.clone(), scope());
    let outcome = Orchestrator::new(FileCollector::default(), pipeline)
        .process_targets::<PathBuf>(&[], false)
        .unwrap();
    assert!(matches!(outcome, RunOutcome::NoWorkFound { .. }));
    assert_eq!(writer.calls(), 0);
}
