// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use covgen_metadata::{ClassLine, ClassName, TestIdentifier};
use covgen_runner::{
    errors::{CoverageError, ProcessLaunchError, ProtocolError, WorkerAbortedError},
    generator::CoverageGenerator,
    help::Help,
    options::{CoverageOptionsBuilder, WorkerTimeouts},
};
use integration_tests::worker_script::{Behavior, Corruption, ResultOrder, WorkerScript};
use maplit::btreemap;
use pretty_assertions::assert_eq;
use std::{collections::BTreeMap, sync::Arc, thread, time::Duration};
use test_case::test_case;

fn two_tests() -> WorkerScript {
    WorkerScript::default()
        .with_result("T1", true, &[("A", 10), ("A", 11)])
        .with_result("T2", true, &[("A", 11), ("B", 5)])
}

fn ids(names: &[&str]) -> Vec<TestIdentifier> {
    names.iter().copied().map(TestIdentifier::new).collect()
}

#[test]
fn two_passing_tests() {
    let worker = FakeWorker::new(two_tests());
    let data = worker.run_default(&["T1", "T2"]).expect("run succeeds");

    assert!(data.all_tests_green());
    let map: BTreeMap<_, _> = [("A", 10), ("A", 11), ("B", 5)]
        .into_iter()
        .map(|(class, line)| ((class, line), data.tests_for_line(&ClassLine::new(class, line))))
        .collect();
    assert_eq!(
        map,
        btreemap! {
            ("A", 10) => ids(&["T1"]),
            ("A", 11) => ids(&["T1", "T2"]),
            ("B", 5) => ids(&["T2"]),
        }
    );

    insta::assert_snapshot!(worker.exported_json().trim_end(), @r#"
    {
      "format-version": 1,
      "lines": [
        {
          "class": "A",
          "line": 10,
          "tests": [
            "T1"
          ]
        },
        {
          "class": "A",
          "line": 11,
          "tests": [
            "T1",
            "T2"
          ]
        },
        {
          "class": "B",
          "line": 5,
          "tests": [
            "T2"
          ]
        }
      ],
      "tests": [
        {
          "name": "T1",
          "passed": true
        },
        {
          "name": "T2",
          "passed": true
        }
      ]
    }
    "#);
    assert_worker_gone(&worker);
}

#[test]
fn export_is_independent_of_arrival_order() {
    let tests = ["T1", "T2", "T3", "T4"];
    let script = two_tests()
        .with_result("T3", true, &[("B", 5), ("C", 1)])
        .with_result("T4", true, &[("A", 10)]);

    let in_order = FakeWorker::new(script.clone());
    in_order.run_default(&tests).expect("run succeeds");

    let reversed = FakeWorker::new(WorkerScript {
        order: ResultOrder::Reversed,
        ..script
    });
    reversed.run_default(&tests).expect("run succeeds");

    assert_eq!(in_order.exported_json(), reversed.exported_json());
}

#[test]
fn failing_test_makes_the_build_unsuitable() {
    let worker = FakeWorker::new(
        WorkerScript::default()
            .with_result("T1", true, &[("A", 1)])
            .with_result("T2", false, &[("A", 2)]),
    );
    let err = worker
        .run_default(&["T1", "T2"])
        .expect_err("a test failed");

    assert!(!err.is_fatal());
    let CoverageError::BuildUnsuitable(err) = err else {
        panic!("expected build unsuitable, found {err:?}");
    };
    assert_eq!(err.help(), Help::FailingTests);
    assert_eq!(err.failing_tests(), ids(&["T2"]).as_slice());
    assert!(!err.coverage().all_tests_green());
    assert_eq!(err.coverage().covered_lines(&ClassName::new("A")), vec![1, 2]);

    // The snapshot is still exported for inspection.
    assert!(worker.exported_json().contains(r#""passed": false"#));
    assert_worker_gone(&worker);
}

#[test]
fn filters_and_options_reach_the_worker() {
    let worker = FakeWorker::new(two_tests());
    let coverage = CoverageOptionsBuilder::new()
        .add_filters(["T1", "T3*"])
        .set_max_dependency_distance(Some(3))
        .build()
        .expect("options are valid");
    let data = worker
        .run(&["T1", "T2", "T3a"], coverage, &worker.export_dir())
        .expect("run succeeds");
    assert_eq!(data.test_count(), 2);

    let received = worker.received();
    assert_eq!(received.arguments.tests, ids(&["T1", "T3a"]));
    assert_eq!(received.arguments.max_dependency_distance, Some(3));
    assert_eq!(received.agent, None);

    let class_path = received.class_path.expect("class path was set");
    let elements: Vec<_> = std::env::split_paths(&class_path).collect();
    assert_eq!(
        elements,
        [
            worker.dir().join("classes").into_std_path_buf(),
            worker.dir().join("lib.jar").into_std_path_buf(),
        ]
    );
}

#[test]
fn truncated_final_result_is_a_protocol_error() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::TruncateFinal,
        ..two_tests()
    });
    let err = worker
        .run_default(&["T1", "T2"])
        .expect_err("stream was truncated");
    assert!(
        matches!(err, CoverageError::Protocol(ProtocolError::Truncated { .. })),
        "{err:?}"
    );
    assert!(err.is_fatal());
    assert!(
        !worker.export_dir().exists(),
        "nothing is exported from a broken run"
    );
    assert_worker_gone(&worker);
}

#[test]
fn worker_crash_mid_stream() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::CrashAfter {
            results: 1,
            exit_code: 3,
        },
        ..two_tests()
    });
    let err = worker
        .run_default(&["T1", "T2"])
        .expect_err("worker crashed");
    match err {
        CoverageError::WorkerAborted(WorkerAbortedError::UnexpectedExit {
            status,
            stderr_tail,
        }) => {
            assert_eq!(status.code(), Some(3));
            assert!(
                stderr_tail.contains("fake worker crashing after 1 results"),
                "{stderr_tail}"
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_worker_gone(&worker);
}

#[test]
fn nonzero_exit_after_clean_close() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::ExitCode { code: 2 },
        ..two_tests()
    });
    let err = worker.run_default(&["T1", "T2"]).expect_err("worker failed");
    assert!(
        matches!(
            err,
            CoverageError::WorkerAborted(WorkerAbortedError::UnexpectedExit { .. })
        ),
        "{err:?}"
    );
    assert_worker_gone(&worker);
}

#[test]
fn worker_that_never_connects_is_terminated() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::NeverConnect,
        stderr_lines: vec!["waiting forever".to_owned()],
        ..WorkerScript::default()
    });
    let err = worker.run_default(&["T1"]).expect_err("worker never connects");
    assert!(
        matches!(
            err,
            CoverageError::ProcessLaunch(ProcessLaunchError::ConnectTimeout { .. })
        ),
        "{err:?}"
    );
    assert_worker_gone(&worker);
}

#[test]
fn worker_that_never_exits_is_terminated() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::HangAfterClose,
        ..two_tests()
    });
    let err = worker.run_default(&["T1", "T2"]).expect_err("worker hangs");
    assert!(
        matches!(
            err,
            CoverageError::WorkerAborted(WorkerAbortedError::ExitTimeout { .. })
        ),
        "{err:?}"
    );
    assert_worker_gone(&worker);
}

#[test]
fn worker_exiting_early_with_success_is_missing_results() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::CrashAfter {
            results: 1,
            exit_code: 0,
        },
        ..two_tests()
    });
    let err = worker
        .run_default(&["T1", "T2"])
        .expect_err("T2 never reported a result");
    match &err {
        CoverageError::WorkerAborted(WorkerAbortedError::MissingResults { missing }) => {
            assert_eq!(missing, &ids(&["T2"]));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_fatal());
    assert!(
        !worker.export_dir().exists(),
        "incomplete coverage is not exported"
    );
    assert_worker_gone(&worker);
}

#[test_case(Corruption::BadMagic ; "bad magic")]
#[test_case(Corruption::MalformedPayload ; "malformed payload")]
fn corrupt_frame_is_a_protocol_error(corruption: Corruption) {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::CorruptFrame { corruption },
        ..two_tests()
    });
    let err = worker
        .run_default(&["T1", "T2"])
        .expect_err("the second frame is corrupt");
    let expected = match (corruption, &err) {
        (Corruption::BadMagic, CoverageError::Protocol(ProtocolError::BadMagic { found })) => {
            *found == 0xDEAD
        }
        (Corruption::MalformedPayload, CoverageError::Protocol(error)) => {
            matches!(error, ProtocolError::Malformed { .. })
        }
        _ => false,
    };
    assert!(expected, "unexpected error for {corruption:?}: {err:?}");
    assert!(err.is_fatal());
    assert!(
        !worker.export_dir().exists(),
        "nothing is exported from a broken run"
    );
    assert_worker_gone(&worker);
}

#[test]
fn worker_stalling_mid_stream_times_out() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::StallAfter { results: 1 },
        ..two_tests()
    });
    let timeouts = WorkerTimeouts {
        run: Duration::from_secs(1),
        ..fast_timeouts()
    };
    let mut generator = worker.generator(
        &["T1", "T2"],
        default_coverage(),
        timeouts,
        &worker.export_dir(),
    );

    let err = generator.calculate_coverage().expect_err("worker stalls");
    assert!(
        matches!(
            err,
            CoverageError::WorkerAborted(WorkerAbortedError::RunTimeout { timeout })
                if timeout == Duration::from_secs(1)
        ),
        "{err:?}"
    );
    assert!(!worker.export_dir().exists());
    assert_worker_gone(&worker);
}

#[test]
fn cancelling_mid_stream_terminates_the_worker() {
    let worker = Arc::new(FakeWorker::new(WorkerScript {
        behavior: Behavior::StallAfter { results: 1 },
        ..two_tests()
    }));
    let timeouts = WorkerTimeouts {
        run: Duration::from_secs(60),
        ..fast_timeouts()
    };
    let mut generator = worker.generator(
        &["T1", "T2"],
        default_coverage(),
        timeouts,
        &worker.export_dir(),
    );

    let cancel = generator.cancel_handle();
    let canceller = thread::spawn({
        let worker = worker.clone();
        move || {
            worker.wait_until_received(Duration::from_secs(10));
            // Give the first result time to arrive.
            thread::sleep(Duration::from_millis(200));
            cancel.cancel();
        }
    });

    let err = generator.calculate_coverage().expect_err("run is cancelled");
    canceller.join().expect("canceller thread finished");
    assert!(
        matches!(err, CoverageError::WorkerAborted(WorkerAbortedError::Cancelled)),
        "{err:?}"
    );
    assert!(!worker.export_dir().exists());
    assert_worker_gone(&worker);
}

#[cfg(unix)]
#[test]
fn processes_left_behind_by_a_successful_worker_are_killed() {
    let worker = FakeWorker::new(WorkerScript {
        orphan_pid_file: Some("orphan.pid".into()),
        ..two_tests()
    });
    worker.run_default(&["T1", "T2"]).expect("run succeeds");

    let orphan: u32 = std::fs::read_to_string(worker.dir().join("orphan.pid"))
        .expect("worker wrote the orphan's pid")
        .trim()
        .parse()
        .expect("pid is a number");
    assert_process_exits(orphan, Duration::from_secs(5));
    assert_worker_gone(&worker);
}

#[test]
fn cancelling_a_run_terminates_the_worker() {
    let worker = FakeWorker::new(WorkerScript {
        behavior: Behavior::NeverConnect,
        ..WorkerScript::default()
    });
    let timeouts = WorkerTimeouts {
        connect: Duration::from_secs(60),
        ..fast_timeouts()
    };
    let mut generator =
        worker.generator(&["T1"], default_coverage(), timeouts, &worker.export_dir());

    let cancel = generator.cancel_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        cancel.cancel();
    });

    let err = generator.calculate_coverage().expect_err("run is cancelled");
    canceller.join().expect("canceller thread finished");
    assert!(
        matches!(err, CoverageError::WorkerAborted(WorkerAbortedError::Cancelled)),
        "{err:?}"
    );
    assert_worker_gone(&worker);
}
