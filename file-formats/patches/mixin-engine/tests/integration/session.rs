//! Session lifecycle tests

use crate::common::Workspace;
use mixin_engine::payload::PayloadBuilder;
use mixin_engine::{
    Error, FailureCause, FailureLog, MixinId, RunOptions, RunOutcome, Selection, Session,
};
use pretty_assertions::assert_eq;

const MANIFEST: &str = r#"
version: 1
mixins:
  - id: shields
    name: mixin.shields
    target: DLC/MP1/Default.sfar
    payload: shields.mxpt
  - id: ammo
    target: DLC/MP1/Default.sfar
    requires: [shields]
    payload: ammo.mxpt
  - id: toc
    target: DLC/MP1/Default.sfar
    finalizer: true
    payload: toc.mxpt
  - id: music
    target: Audio/music.bnk
    payload: music.mxpt
  - id: corrupt
    target: Audio/music.bnk
    payload: corrupt.mxpt
"#;

fn populated() -> Workspace {
    let ws = Workspace::new();
    ws.add_baseline("DLC/MP1/Default.sfar", &[0; 16]);
    ws.add_baseline("Audio/music.bnk", b"BKHD....");

    ws.add_payload("shields.mxpt", PayloadBuilder::new().write(8, &[1, 1]));
    ws.add_payload("ammo.mxpt", PayloadBuilder::new().write_checked(9, &[1], &[2]));
    ws.add_payload("toc.mxpt", PayloadBuilder::finalizer().length_field(0, 4));
    ws.add_payload("music.mxpt", PayloadBuilder::new().write_checked(0, b"BKHD", b"bkhd"));
    ws.add_raw_payload("corrupt.mxpt", b"definitely not a payload");
    ws
}

#[test]
fn test_full_session_run() {
    let ws = populated();
    let manifest = ws.write_manifest(MANIFEST);

    let session = Session::start(&manifest, &ws.payloads(), Selection::All).unwrap();
    assert_eq!(session.catalog().len(), 5);
    assert_eq!(session.store().len(), 4);
    assert!(session.load_report().is_failed(&MixinId::new("corrupt")));

    let log = FailureLog::new();
    let report = session
        .run(&ws.baseline(), &ws.output_dir(), &RunOptions::new(), &log)
        .unwrap();

    let sfar = ws.output("DLC/MP1/Default.sfar").unwrap();
    assert_eq!(&sfar[..4], &16u32.to_le_bytes());
    assert_eq!(&sfar[8..10], &[1, 2]);
    assert_eq!(ws.output("Audio/music.bnk").unwrap(), b"bkhd....");

    // The corrupt payload is reported exactly once
    assert_eq!(report.failures.len(), 1);
    assert_eq!(log.len(), 1);
    assert!(matches!(report.failures[0].cause, FailureCause::PayloadLoad(_)));
    assert_eq!(report.attempted, 5);
    assert_eq!(report.applied_count(), 4);
    assert_eq!(report.outcome(), RunOutcome::PartialSuccess);

    assert_eq!(session.end(), 4);
}

#[test]
fn test_selection_order_is_application_order() {
    let ws = populated();
    let manifest = ws.write_manifest(MANIFEST);

    // ammo before shields violates its prerequisite
    let session = Session::start(
        &manifest,
        &ws.payloads(),
        Selection::only(["ammo", "shields", "toc"]),
    )
    .unwrap();

    let planned = session.plan();
    assert_eq!(planned.failures.len(), 1);
    assert!(matches!(
        &planned.failures[0].cause,
        FailureCause::PrerequisiteOrder { prerequisite } if prerequisite.as_str() == "shields"
    ));
    assert_eq!(planned.plan.entries()[0].ids(), ["shields", "toc"]);
}

#[test]
fn test_unknown_selection_fails_session() {
    let ws = populated();
    let manifest = ws.write_manifest(MANIFEST);

    let result = Session::start(&manifest, &ws.payloads(), Selection::only(["shields", "nope"]));
    assert!(matches!(result, Err(Error::UnknownMixin(id)) if id == "nope"));
}

#[test]
fn test_missing_manifest_fails_session() {
    let ws = populated();
    let manifest = mixin_engine::ManifestFile::new(ws.dir.path().join("absent.json"));
    assert!(Session::start(&manifest, &ws.payloads(), Selection::All).is_err());
}

#[test]
fn test_missing_payload_directory_fails_session() {
    let ws = populated();
    let manifest = ws.write_manifest(MANIFEST);
    let source = mixin_engine::DirectoryPayloadSource::new(ws.dir.path().join("nowhere"));
    assert!(matches!(
        Session::start(&manifest, &source, Selection::All),
        Err(Error::PayloadSource(_))
    ));
}

#[test]
fn test_md5_mismatch_is_a_load_failure() {
    let ws = populated();
    let manifest = ws.write_manifest(
        r#"
version: 1
mixins:
  - id: music
    target: Audio/music.bnk
    payload: music.mxpt
    payload_md5: 00000000000000000000000000000000
"#,
    );

    let session = Session::start(&manifest, &ws.payloads(), Selection::All).unwrap();
    assert!(session.store().is_empty());
    assert_eq!(session.load_report().failures.len(), 1);

    let report = session
        .run(
            &ws.baseline(),
            &ws.output_dir(),
            &RunOptions::new().sequential(),
            &FailureLog::new(),
        )
        .unwrap();
    assert!(report.modules.is_empty());
    assert_eq!(report.outcome(), RunOutcome::Failed);
    assert_eq!(ws.output_file_count(), 0);
}
