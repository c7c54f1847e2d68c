//! End-to-end runs resembling a real mod install

use crate::common::{Workspace, generate_test_data};
use mixin_engine::payload::{ChecksumAlgorithm, PayloadBuilder};
use mixin_engine::{
    FailureLog, ModuleContext, ModuleResult, RunOptions, RunOutcome, Selection, Session,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

/// BSDIFF40 stream with 12-byte control records
fn bsdiff_stream(ctrl: &[(u32, u32, u32)], diff: &[u8], extra: &[u8], new_size: u64) -> Vec<u8> {
    let mut stream = b"BSDIFF40".to_vec();
    stream.extend_from_slice(&((ctrl.len() * 12) as u64).to_le_bytes());
    stream.extend_from_slice(&(diff.len() as u64).to_le_bytes());
    stream.extend_from_slice(&new_size.to_le_bytes());
    for (add, mov, seek) in ctrl {
        stream.extend_from_slice(&add.to_le_bytes());
        stream.extend_from_slice(&mov.to_le_bytes());
        stream.extend_from_slice(&seek.to_le_bytes());
    }
    stream.extend_from_slice(diff);
    stream.extend_from_slice(extra);
    stream
}

fn manifest(modules: usize) -> String {
    let mut yaml = String::from("version: 1\nmixins:\n");
    for i in 0..modules {
        yaml.push_str(&format!(
            "  - id: tweak-{i}\n    target: Movies/part{i}/data.bin\n    payload: tweak-{i}.mxpt\n"
        ));
        yaml.push_str(&format!(
            "  - id: crc-{i}\n    target: Movies/part{i}/data.bin\n    ordering: finalizer\n    payload: crc.mxpt\n"
        ));
    }
    yaml
}

fn install(modules: usize) -> Workspace {
    let _ = env_logger::builder().is_test(true).try_init();
    let ws = Workspace::new();
    for i in 0..modules {
        let mut data = vec![0u8; 4];
        data.extend(generate_test_data(256 + i));
        ws.add_baseline(&format!("Movies/part{i}/data.bin"), &data);
        ws.add_payload(
            &format!("tweak-{i}.mxpt"),
            PayloadBuilder::new().fill(16, 8, i as u8).insert(4, b"MOD!"),
        );
    }
    ws.add_payload(
        "crc.mxpt",
        PayloadBuilder::finalizer()
            .align(16, 0)
            .checksum(ChecksumAlgorithm::Crc32, 4, u64::MAX, 0),
    );
    ws
}

#[test]
fn test_parallel_and_sequential_runs_match() {
    let modules = 12;
    let ws = install(modules);
    let manifest = ws.write_manifest(&manifest(modules));
    let session = Session::start(&manifest, &ws.payloads(), Selection::All).unwrap();

    let sequential_dir = ws.dir.path().join("seq");
    let report = session
        .run(
            &ws.baseline(),
            &sequential_dir,
            &RunOptions::new().sequential(),
            &FailureLog::new(),
        )
        .unwrap();
    assert_eq!(report.outcome(), RunOutcome::Success);

    let report = session
        .run(
            &ws.baseline(),
            &ws.output_dir(),
            &RunOptions::new().workers(4),
            &FailureLog::new(),
        )
        .unwrap();
    assert_eq!(report.outcome(), RunOutcome::Success);
    assert_eq!(report.written().count(), modules);

    for i in 0..modules {
        let module = format!("Movies/part{i}/data.bin");
        let parallel = ws.output(&module).unwrap();
        let sequential = std::fs::read(
            sequential_dir
                .join("Movies")
                .join(format!("part{i}"))
                .join("data.bin"),
        )
        .unwrap();
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.len() % 16, 0);
        assert_eq!(&parallel[4..8], b"MOD!");
    }
}

#[test]
fn test_bsdiff_mixin_followed_by_edit() {
    let ws = Workspace::new();
    let old = b"Hello World".to_vec();
    ws.add_baseline("text.bin", &old);

    // "Hello" kept via zero diff bytes, then " Rust!" from the extra block
    let stream = bsdiff_stream(&[(5, 6, 6)], &[0; 5], b" Rust!", 11);
    ws.add_payload("diff.mxpt", PayloadBuilder::new().bsdiff(&stream));
    ws.add_payload(
        "shout.mxpt",
        PayloadBuilder::new().write_checked(0, b"Hello", b"HELLO"),
    );
    let manifest = ws.write_json_manifest(
        r#"{"version":1,"mixins":[
            {"id":"diff","target":"text.bin","payload":"diff.mxpt"},
            {"id":"shout","target":"text.bin","payload":"shout.mxpt","requires":["diff"]}
        ]}"#,
    );

    let session = Session::start(&manifest, &ws.payloads(), Selection::All).unwrap();
    let report = session
        .run(
            &ws.baseline(),
            &ws.output_dir(),
            &RunOptions::new().sequential(),
            &FailureLog::new(),
        )
        .unwrap();

    assert!(report.is_fully_successful());
    assert_eq!(ws.output("text.bin").unwrap(), b"HELLO Rust!");
}

#[test]
fn test_progress_reports_every_module_once() {
    let modules = 6;
    let ws = install(modules);
    let manifest = ws.write_manifest(&manifest(modules));
    let session = Session::start(&manifest, &ws.payloads(), Selection::All).unwrap();

    let seen = Mutex::new(Vec::new());
    let options = RunOptions::new()
        .workers(3)
        .context("Movies/part0/data.bin", ModuleContext::new("Intro"));
    let report = session
        .run_with_progress(
            &ws.baseline(),
            &ws.output_dir(),
            &options,
            &FailureLog::new(),
            &|result: &ModuleResult| seen.lock().push(result.module.to_string()),
        )
        .unwrap();

    let mut seen = seen.into_inner();
    seen.sort();
    let mut expected: Vec<_> = report.modules.iter().map(|r| r.module.to_string()).collect();
    expected.sort();
    assert_eq!(seen, expected);
    assert_eq!(seen.len(), modules);
}
