// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::code_source::CodeSource;
use covgen_metadata::{
    ClassLine, ClassName, CoverageResult, CoveredLineSummary, LineCoverageSummary, TestIdentifier,
    TestStatusSummary,
};
use itertools::Itertools;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

/// The outcome of a single test across every result reported for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestStatus {
    /// True if every result reported for the test passed.
    pub passed: bool,

    /// The total time reported for the test.
    pub duration: Duration,
}

/// Line coverage gathered during a single run.
///
/// Maps each covered `(class, line)` to the set of tests covering it, and records the pass/fail
/// outcome of every observed test. Until [`all_tests_green`](Self::all_tests_green) has been
/// checked, the data must not be treated as a complete result.
#[derive(Debug)]
pub struct CoverageData {
    code: Arc<dyn CodeSource>,
    line_coverage: HashMap<ClassName, HashMap<u32, HashSet<TestIdentifier>>>,
    tests: HashMap<TestIdentifier, TestStatus>,
}

impl CoverageData {
    /// Creates empty coverage data for a run over the given code source.
    pub fn new(code: Arc<dyn CodeSource>) -> Self {
        Self {
            code,
            line_coverage: HashMap::new(),
            tests: HashMap::new(),
        }
    }

    /// Folds a single result into the coverage map.
    ///
    /// Coverage is only ever added. If the same test is reported more than once its coverage is
    /// merged, and it is considered failing if any report failed.
    pub fn apply(&mut self, result: CoverageResult) {
        let CoverageResult {
            test,
            duration_ms,
            passed,
            covered_lines,
        } = result;

        for ClassLine { class, line } in covered_lines {
            self.line_coverage
                .entry(class)
                .or_default()
                .entry(line)
                .or_default()
                .insert(test.clone());
        }

        let duration = Duration::from_millis(duration_ms);
        self.tests
            .entry(test)
            .and_modify(|status| {
                status.passed &= passed;
                status.duration += duration;
            })
            .or_insert(TestStatus { passed, duration });
    }

    /// Returns true if every observed test passed.
    pub fn all_tests_green(&self) -> bool {
        self.tests.values().all(|status| status.passed)
    }

    /// Returns the failing tests, sorted by identifier.
    pub fn failing_tests(&self) -> Vec<TestIdentifier> {
        self.tests
            .iter()
            .filter(|(_, status)| !status.passed)
            .map(|(test, _)| test.clone())
            .sorted()
            .collect()
    }

    /// Returns the tests covering a line, sorted by identifier.
    pub fn tests_for_line(&self, line: &ClassLine) -> Vec<TestIdentifier> {
        self.line_coverage
            .get(&line.class)
            .and_then(|lines| lines.get(&line.line))
            .map(|tests| tests.iter().cloned().sorted().collect())
            .unwrap_or_default()
    }

    /// Returns the tests covering any line of a class, sorted by identifier.
    pub fn tests_for_class(&self, class: &ClassName) -> Vec<TestIdentifier> {
        self.line_coverage
            .get(class)
            .map(|lines| lines.values().flatten().unique().cloned().sorted().collect())
            .unwrap_or_default()
    }

    /// Returns the covered lines of a class in ascending order.
    pub fn covered_lines(&self, class: &ClassName) -> Vec<u32> {
        self.line_coverage
            .get(class)
            .map(|lines| lines.keys().copied().sorted().collect())
            .unwrap_or_default()
    }

    /// Returns every class with at least one covered line, sorted by name.
    pub fn covered_classes(&self) -> Vec<ClassName> {
        self.line_coverage.keys().cloned().sorted().collect()
    }

    /// Returns the covered classes that are code under test rather than test code.
    pub fn production_classes(&self) -> Vec<ClassName> {
        self.line_coverage
            .keys()
            .filter(|class| !self.code.is_test_class(class))
            .cloned()
            .sorted()
            .collect()
    }

    /// Returns the number of observed tests.
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Returns the status of a test, if it was observed.
    pub fn test_status(&self, test: &TestIdentifier) -> Option<TestStatus> {
        self.tests.get(test).copied()
    }

    /// Returns the time reported for a test, if it was observed.
    pub fn test_duration(&self, test: &TestIdentifier) -> Option<Duration> {
        self.test_status(test).map(|status| status.duration)
    }

    /// Returns the code source this run was over.
    pub fn code_source(&self) -> &dyn CodeSource {
        &*self.code
    }

    /// Produces the canonical export view of this data.
    ///
    /// Lines are ordered by class then line, and each line's covering tests by identifier, so
    /// the view depends only on which results were applied, never on the order they arrived in.
    pub fn create_line_coverage(&self) -> LineCoverageSummary {
        let lines = self
            .line_coverage
            .iter()
            .flat_map(|(class, lines)| {
                lines.iter().map(move |(line, tests)| CoveredLineSummary {
                    class: class.clone(),
                    line: *line,
                    tests: tests.iter().cloned().sorted().collect(),
                })
            })
            .sorted_by(|a, b| (&a.class, a.line).cmp(&(&b.class, b.line)))
            .collect();

        let tests = self
            .tests
            .iter()
            .map(|(name, status)| TestStatusSummary {
                name: name.clone(),
                passed: status.passed,
            })
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect();

        LineCoverageSummary {
            format_version: LineCoverageSummary::FORMAT_VERSION,
            lines,
            tests,
        }
    }
}
