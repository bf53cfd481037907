// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{ClassName, TestIdentifier};
use serde::{Deserialize, Serialize};

/// The exported view of a coverage run: one record per covered line, listing its covering
/// tests, plus the pass/fail status of every observed test.
///
/// Lines are sorted by class then line number, covering tests and test statuses are sorted by
/// test identifier. Two runs over unchanged input therefore serialize to identical bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LineCoverageSummary {
    /// The version of this format.
    pub format_version: u32,

    /// Covered lines, in canonical order.
    pub lines: Vec<CoveredLineSummary>,

    /// Test statuses, in canonical order.
    pub tests: Vec<TestStatusSummary>,
}

impl LineCoverageSummary {
    /// The current format version.
    pub const FORMAT_VERSION: u32 = 1;

    /// Parses a summary from its JSON representation.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }

    /// Returns the covering tests for the given line, if it was covered.
    pub fn tests_for_line(&self, class: &str, line: u32) -> Option<&[TestIdentifier]> {
        self.lines
            .iter()
            .find(|l| l.class.as_str() == class && l.line == line)
            .map(|l| l.tests.as_slice())
    }
}

/// A single covered line and the tests that cover it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoveredLineSummary {
    /// The class containing the line.
    pub class: ClassName,

    /// The line number.
    pub line: u32,

    /// The tests covering this line, sorted by identifier.
    pub tests: Vec<TestIdentifier>,
}

/// The pass/fail status of a single test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestStatusSummary {
    /// The test.
    pub name: TestIdentifier,

    /// Whether the test passed.
    pub passed: bool,
}
