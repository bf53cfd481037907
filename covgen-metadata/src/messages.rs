// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messages exchanged between the coverage controller and a worker process.
//!
//! The controller sends exactly one [`WorkerArguments`] message once the worker connects. The
//! worker then sends one [`CoverageResult`] per executed test and closes the connection.

use crate::{ClassLine, TestIdentifier};
use serde::{Deserialize, Serialize};

/// The single message sent from the controller to a worker at the start of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerArguments {
    /// The filtered list of tests the worker should execute.
    pub tests: Vec<TestIdentifier>,

    /// The maximum dependency distance between a test and the code it may cover.
    ///
    /// This is threaded through for downstream analysis and is not interpreted by the
    /// controller.
    #[serde(default)]
    pub max_dependency_distance: Option<u32>,

    /// Whether the worker should produce verbose output.
    #[serde(default)]
    pub verbose: bool,
}

/// The coverage gathered while executing a single test.
///
/// Produced exactly once per test by the worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoverageResult {
    /// The test that was executed.
    pub test: TestIdentifier,

    /// How long the test took to run, in milliseconds.
    pub duration_ms: u64,

    /// Whether the test passed.
    pub passed: bool,

    /// The lines executed while the test ran.
    ///
    /// This is a set: order is irrelevant and duplicates carry no meaning.
    #[serde(default)]
    pub covered_lines: Vec<ClassLine>,
}

impl CoverageResult {
    /// Creates a new `CoverageResult`.
    pub fn new(
        test: impl Into<TestIdentifier>,
        duration_ms: u64,
        passed: bool,
        covered_lines: impl IntoIterator<Item = ClassLine>,
    ) -> Self {
        Self {
            test: test.into(),
            duration_ms,
            passed,
            covered_lines: covered_lines.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(
        r#"{"tests": ["T1", "T2"]}"#,
        WorkerArguments { tests: vec!["T1".into(), "T2".into()], max_dependency_distance: None, verbose: false }
        ; "optional fields default"
    )]
    #[test_case(
        r#"{"tests": [], "max-dependency-distance": 3, "verbose": true}"#,
        WorkerArguments { tests: vec![], max_dependency_distance: Some(3), verbose: true }
        ; "all fields"
    )]
    fn worker_arguments_parse(input: &str, expected: WorkerArguments) {
        let parsed: WorkerArguments = serde_json::from_str(input).expect("input is valid");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn coverage_result_parses_kebab_case() {
        let input = r#"{
            "test": "T1",
            "duration-ms": 12,
            "passed": true,
            "covered-lines": [{"class": "A", "line": 10}]
        }"#;
        let parsed: CoverageResult = serde_json::from_str(input).expect("input is valid");
        assert_eq!(
            parsed,
            CoverageResult::new("T1", 12, true, [ClassLine::new("A", 10)])
        );
    }
}
