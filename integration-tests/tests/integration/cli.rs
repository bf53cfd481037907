// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use covgen_metadata::{CovgenExitCode, LineCoverageSummary};
use covgen_runner::export::{JsonCoverageExporter, JunitStatusExporter};
use indoc::formatdoc;
use integration_tests::{
    covgen_cli::{CovgenCli, CovgenOutput},
    worker_script::{Behavior, WorkerScript},
};
use pretty_assertions::assert_eq;

/// Writes `.config/covgen.toml` pointing at the fake worker, optionally leaving the program out.
fn write_config(worker: &FakeWorker, with_program: bool) {
    let program = if with_program {
        format!("program = '{FAKE_WORKER}'")
    } else {
        String::new()
    };
    let config = formatdoc! {"
        [worker]
        {program}
        args = ['{script}']
        class-path = ['classes']
        connect-timeout = '2s'
        exit-timeout = '1s'
        grace-period = '200ms'

        [export]
        dir = 'out'
        formats = ['json', 'junit']
        ",
        script = worker.script_path(),
    };
    let config_dir = worker.dir().join(".config");
    std::fs::create_dir_all(&config_dir).expect("config dir created");
    std::fs::write(config_dir.join("covgen.toml"), config).expect("config written");
}

fn run_covgen(root: &Utf8Path, tests: &[&str]) -> CovgenOutput {
    let mut cli = CovgenCli::new(COVGEN);
    cli.args(["run", "--workspace-root", root.as_str()]);
    for test in tests {
        cli.args(["--test", test]);
    }
    cli.unchecked(true).output()
}

#[test]
fn run_exports_every_format() {
    let worker = FakeWorker::new(WorkerScript {
        stderr_lines: vec!["hello from the worker".to_owned()],
        ..WorkerScript::default()
            .with_result("a.FooTest.one", true, &[("a.Foo", 3)])
            .with_result("a.FooTest.two", true, &[("a.Foo", 3), ("a.Foo", 4)])
    });
    write_config(&worker, true);

    let output = run_covgen(worker.dir(), &["a.FooTest.one", "a.FooTest.two"]);
    assert_eq!(output.exit_status.code(), Some(CovgenExitCode::OK), "{output}");

    let stderr = output.stderr_as_str();
    assert!(stderr.contains("worker: hello from the worker"), "{output}");
    assert!(stderr.contains("gathered coverage for 2 tests"), "{output}");

    let out = worker.dir().join("out");
    let json = std::fs::read_to_string(out.join(JsonCoverageExporter::FILE_NAME))
        .expect("json export written");
    let summary = LineCoverageSummary::parse_json(json).expect("json export parses");
    assert_eq!(summary.format_version, LineCoverageSummary::FORMAT_VERSION);
    assert_eq!(
        summary
            .tests_for_line("a.Foo", 3)
            .map(|tests| tests.len()),
        Some(2)
    );
    assert!(out.join(JunitStatusExporter::FILE_NAME).is_file());

    let received = worker.received();
    assert_eq!(
        received.class_path.as_deref(),
        Some(worker.dir().join("classes").as_str())
    );
}

#[test]
fn failing_tests_exit_with_build_unsuitable() {
    let worker = FakeWorker::new(
        WorkerScript::default()
            .with_result("a.FooTest.one", true, &[("a.Foo", 3)])
            .with_result("a.FooTest.two", false, &[("a.Foo", 4)]),
    );
    write_config(&worker, true);

    let output = run_covgen(worker.dir(), &["a.FooTest.one", "a.FooTest.two"]);
    assert_eq!(
        output.exit_status.code(),
        Some(CovgenExitCode::BUILD_UNSUITABLE),
        "{output}"
    );
    let stderr = output.stderr_as_str();
    assert!(stderr.contains("a.FooTest.two"), "{output}");
    assert!(stderr.contains("failing-tests"), "{output}");
    assert!(
        worker
            .dir()
            .join("out")
            .join(JsonCoverageExporter::FILE_NAME)
            .is_file(),
        "coverage is exported even though a test failed"
    );
}

#[test]
fn missing_program_is_a_setup_error() {
    let worker = FakeWorker::new(WorkerScript::default());
    write_config(&worker, false);

    let output = run_covgen(worker.dir(), &["a.FooTest.one"]);
    assert_eq!(
        output.exit_status.code(),
        Some(CovgenExitCode::SETUP_ERROR),
        "{output}"
    );
}

#[test]
fn worker_failure_exits_with_worker_failed() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::ExitCode { code: 2 },
        ..WorkerScript::default()
    });
    write_config(&worker, true);

    let output = run_covgen(worker.dir(), &["a.FooTest.one"]);
    assert_eq!(
        output.exit_status.code(),
        Some(CovgenExitCode::WORKER_FAILED),
        "{output}"
    );
    assert!(!worker.dir().join("out").exists(), "{output}");
}
