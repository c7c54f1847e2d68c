//! Application integration tests

use crate::common::{Workspace, finalizer, generate_test_data, normal, store_with};
use mixin_engine::payload::{ChecksumAlgorithm, EditError, PayloadBuilder};
use mixin_engine::{
    CancellationToken, FailureCause, FailureLog, ModuleApplier, ModuleContext, ModuleId,
    ModuleStatus, NullSink, PlanEntry, RunOptions, RunOutcome, plan, run_plan,
};
use pretty_assertions::assert_eq;
use test_case::test_case;

#[test]
fn test_conflicting_mixin_is_reported_and_skipped() {
    let ws = Workspace::new();
    ws.add_baseline("data/table.bin", &[1, 2, 3, 4, 5, 6, 7, 8]);

    let first = normal("first", "data/table.bin");
    let second = normal("second", "data/table.bin");
    let third = normal("third", "data/table.bin");

    // second expects the bytes first already changed
    let store = store_with(&[
        (&first, PayloadBuilder::new().write_checked(2, &[3, 4], &[0xAA, 0xBB])),
        (&second, PayloadBuilder::new().write_checked(3, &[4], &[0xCC])),
        (&third, PayloadBuilder::new().write_checked(7, &[8], &[0xDD])),
    ]);

    let report = plan(&[&first, &second, &third], &store);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    let log = FailureLog::new();
    let run = run_plan(
        &report.plan,
        &applier,
        &ws.output_dir(),
        &RunOptions::new().sequential(),
        &log,
    )
    .unwrap();

    assert_eq!(
        ws.output("data/table.bin").unwrap(),
        [1, 2, 0xAA, 0xBB, 5, 6, 7, 0xDD]
    );
    assert_eq!(run.outcome(), RunOutcome::PartialSuccess);
    assert_eq!(log.len(), 1);

    let failure = &log.snapshot()[0];
    assert_eq!(failure.mixin.as_ref().unwrap().as_str(), "second");
    assert!(matches!(
        failure.cause,
        FailureCause::Edit(EditError::PreimageMismatch { offset: 3, .. })
    ));
}

#[test]
fn test_oversized_bsdiff_fails_alone_on_worker_pool() {
    let ws = Workspace::new();
    ws.add_baseline("m.bin", &[0u8; 8]);
    ws.add_baseline("other.bin", &[0u8; 4]);

    // Header declares a 1 TiB result with empty blocks
    let mut stream = b"BSDIFF40".to_vec();
    stream.extend_from_slice(&0u64.to_le_bytes());
    stream.extend_from_slice(&0u64.to_le_bytes());
    stream.extend_from_slice(&(1u64 << 40).to_le_bytes());

    let bad = normal("bad", "m.bin");
    let good = normal("good", "m.bin");
    let other = normal("other", "other.bin");
    let store = store_with(&[
        (&bad, PayloadBuilder::new().bsdiff(&stream)),
        (&good, PayloadBuilder::new().write(0, b"OK")),
        (&other, PayloadBuilder::new().write(0, b"ZZ")),
    ]);

    let report = plan(&[&bad, &good, &other], &store);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    let log = FailureLog::new();
    let run = run_plan(
        &report.plan,
        &applier,
        &ws.output_dir(),
        &RunOptions::new().workers(2),
        &log,
    )
    .unwrap();

    assert_eq!(log.len(), 1);
    let failure = &log.snapshot()[0];
    assert_eq!(failure.mixin.as_ref().unwrap().as_str(), "bad");
    assert!(matches!(
        failure.cause,
        FailureCause::Edit(EditError::InvalidStream { .. })
    ));

    assert_eq!(ws.output("m.bin").unwrap(), b"OK\0\0\0\0\0\0");
    assert_eq!(ws.output("other.bin").unwrap(), b"ZZ\0\0");
    assert_eq!(run.outcome(), RunOutcome::PartialSuccess);
}

#[test]
fn test_finalizer_repairs_checksum_after_edits() {
    let ws = Workspace::new();
    let mut module = vec![0u8; 4];
    module.extend_from_slice(b"payload-bytes");
    ws.add_baseline("bank.bin", &module);

    let edit = normal("edit", "bank.bin");
    let grow = normal("grow", "bank.bin");
    let fix = finalizer("fix", "bank.bin");

    let store = store_with(&[
        (&edit, PayloadBuilder::new().write_checked(4, b"p", b"P")),
        (&grow, PayloadBuilder::new().insert(17, b"-extra")),
        (
            &fix,
            PayloadBuilder::finalizer().checksum(ChecksumAlgorithm::Crc32, 4, u64::MAX, 0),
        ),
    ]);

    // Finalizer selected first still runs last
    let report = plan(&[&fix, &edit, &grow], &store);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    let run = run_plan(
        &report.plan,
        &applier,
        &ws.output_dir(),
        &RunOptions::new(),
        &FailureLog::new(),
    )
    .unwrap();
    assert!(run.is_fully_successful());

    let out = ws.output("bank.bin").unwrap();
    assert_eq!(&out[4..], b"Payload-bytes-extra");
    assert_eq!(&out[..4], &crc32fast::hash(b"Payload-bytes-extra").to_le_bytes());
}

#[test]
fn test_insert_and_delete_shift_later_edits() {
    let ws = Workspace::new();
    ws.add_baseline("m.bin", b"HEADERbody");

    let strip = normal("strip", "m.bin");
    let tag = normal("tag", "m.bin");
    let store = store_with(&[
        (&strip, PayloadBuilder::new().delete_checked(0, b"HEADER")),
        (&tag, PayloadBuilder::new().insert(0, b"v2:")),
    ]);

    let report = plan(&[&strip, &tag], &store);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    run_plan(
        &report.plan,
        &applier,
        &ws.output_dir(),
        &RunOptions::new().sequential(),
        &FailureLog::new(),
    )
    .unwrap();

    assert_eq!(ws.output("m.bin").unwrap(), b"v2:body");
}

#[test]
fn test_whole_module_replacement_requires_matching_base() {
    let ws = Workspace::new();
    let original = generate_test_data(512);
    ws.add_baseline("a.bin", &original);
    ws.add_baseline("b.bin", &original[..100]);

    let good = normal("good", "a.bin");
    let stale = normal("stale", "b.bin");
    let replacement = generate_test_data(64);
    let store = store_with(&[
        (&good, PayloadBuilder::new().replace(&original, &replacement)),
        (&stale, PayloadBuilder::new().replace(&original, &replacement)),
    ]);

    let report = plan(&[&good, &stale], &store);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    let run = run_plan(
        &report.plan,
        &applier,
        &ws.output_dir(),
        &RunOptions::new(),
        &FailureLog::new(),
    )
    .unwrap();

    assert_eq!(ws.output("a.bin").unwrap(), replacement);
    // The stale mixin failed but its module is still written unchanged
    assert_eq!(ws.output("b.bin").unwrap(), &original[..100]);
    assert_eq!(run.failures.len(), 1);
    assert!(matches!(
        run.failures[0].cause,
        FailureCause::Edit(EditError::BaseMismatch { .. })
    ));
}

#[test]
fn test_missing_baseline_fails_only_its_module() {
    let ws = Workspace::new();
    ws.add_baseline("present.bin", &[0; 8]);

    let ok = normal("ok", "present.bin");
    let orphan = normal("orphan", "absent.bin");
    let store = store_with(&[
        (&ok, PayloadBuilder::new().fill(0, 4, 0xFF)),
        (&orphan, PayloadBuilder::new().fill(0, 4, 0xFF)),
    ]);

    let report = plan(&[&ok, &orphan], &store);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    let run = run_plan(
        &report.plan,
        &applier,
        &ws.output_dir(),
        &RunOptions::new().workers(2),
        &FailureLog::new(),
    )
    .unwrap();

    assert_eq!(ws.output("present.bin").unwrap(), [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
    assert!(ws.output("absent.bin").is_none());

    let errors: Vec<_> = run.module_errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].module().as_str(), "absent.bin");
    assert_eq!(run.outcome(), RunOutcome::PartialSuccess);
    assert!(run.failed_mixins().iter().any(|id| id.as_str() == "orphan"));
}

#[test]
fn test_context_routes_output_to_subdirectory() {
    let ws = Workspace::new();
    ws.add_baseline("DLC/MP1/Default.sfar", &[0; 4]);

    let a = normal("a", "DLC\\MP1\\Default.sfar");
    let store = store_with(&[(&a, PayloadBuilder::new().write(0, b"SFAR"))]);
    let report = plan(&[&a], &store);

    let options = RunOptions::new()
        .sequential()
        .context("DLC/MP1/Default.sfar", ModuleContext::new("Resurgence").with_output_subdir("MP1"));
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    let run = run_plan(&report.plan, &applier, &ws.output_dir(), &options, &FailureLog::new())
        .unwrap();

    let expected = ws
        .output_dir()
        .join("MP1")
        .join("DLC")
        .join("MP1")
        .join("Default.sfar");
    let output = run.written().next().unwrap();
    assert_eq!(output.path, expected);
    assert_eq!(std::fs::read(expected).unwrap(), b"SFAR");
    assert_eq!(ws.output_file_count(), 1);
}

#[test]
fn test_module_with_no_surviving_mixin_is_still_written() {
    let ws = Workspace::new();
    ws.add_baseline("m.bin", &[9, 9]);

    let bad = normal("bad", "m.bin");
    let store = store_with(&[(&bad, PayloadBuilder::new().write(10, &[1]))]);
    let report = plan(&[&bad], &store);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    let run = run_plan(
        &report.plan,
        &applier,
        &ws.output_dir(),
        &RunOptions::new().sequential(),
        &FailureLog::new(),
    )
    .unwrap();

    assert!(matches!(run.modules[0].status, ModuleStatus::Written(_)));
    assert_eq!(ws.output("m.bin").unwrap(), [9, 9]);
    assert_eq!(run.outcome(), RunOutcome::Failed);
}

#[test]
fn test_empty_mixin_list_copies_baseline() {
    let ws = Workspace::new();
    let module = generate_test_data(1000);
    ws.add_baseline("plain/copy.bin", &module);

    let store = store_with(&[]);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    let entry = PlanEntry::new(ModuleId::new("plain/copy.bin"), Vec::new());

    let output = applier
        .apply_to_module(
            &entry,
            &ws.output_dir(),
            None,
            &CancellationToken::new(),
            &NullSink,
        )
        .unwrap();

    assert!(output.applied.is_empty());
    assert!(output.failures.is_empty());
    assert_eq!(ws.output("plain/copy.bin").unwrap(), module);
}

#[test_case(ChecksumAlgorithm::Crc32 ; "crc32")]
#[test_case(ChecksumAlgorithm::Adler32 ; "adler32")]
fn test_checksum_finalizer_covers_whole_body(algorithm: ChecksumAlgorithm) {
    let ws = Workspace::new();
    let body = generate_test_data(300);
    let mut module = vec![0u8; 8];
    module.extend_from_slice(&body);
    ws.add_baseline("sum.bin", &module);

    let fix = finalizer("fix", "sum.bin");
    let store = store_with(&[(
        &fix,
        PayloadBuilder::finalizer()
            .length_field(0, 4)
            .checksum(algorithm, 8, u64::MAX, 4),
    )]);

    let report = plan(&[&fix], &store);
    let baseline = ws.baseline();
    let applier = ModuleApplier::new(&store, &baseline);
    run_plan(
        &report.plan,
        &applier,
        &ws.output_dir(),
        &RunOptions::new().sequential(),
        &FailureLog::new(),
    )
    .unwrap();

    let out = ws.output("sum.bin").unwrap();
    assert_eq!(&out[..4], &308u32.to_le_bytes());
    assert_eq!(&out[4..8], &algorithm.compute(&body).to_le_bytes());
}
