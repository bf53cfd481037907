// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exporting coverage snapshots.
//!
//! Exporters receive the canonical [`LineCoverageSummary`] of a run, so two runs over unchanged
//! input produce byte-identical artifacts.

use crate::errors::ExportError;
use camino::{Utf8Path, Utf8PathBuf};
use covgen_metadata::LineCoverageSummary;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use serde::Deserialize;
use std::{fmt, io::Write};
use tracing::debug;

/// A sink for coverage snapshots.
pub trait CoverageExporter: fmt::Debug + Send {
    /// Records the snapshot of a run.
    ///
    /// Each call to [`CoverageGenerator::calculate_coverage`] is a separate run. It records
    /// exactly one snapshot if every test reported a result, even if some failed, and none
    /// otherwise. An exporter reused across runs is called once per run and sees each snapshot
    /// in turn.
    ///
    /// [`CoverageGenerator::calculate_coverage`]: crate::generator::CoverageGenerator::calculate_coverage
    fn record_coverage(&mut self, summary: &LineCoverageSummary) -> Result<(), ExportError>;
}

/// A format coverage can be exported in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    /// One record per covered line, in `linecoverage.json`.
    Json,

    /// Per-test pass/fail status as a JUnit report, in `test-status.xml`.
    Junit,
}

/// Discards every snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCoverageExporter;

impl CoverageExporter for NullCoverageExporter {
    fn record_coverage(&mut self, _summary: &LineCoverageSummary) -> Result<(), ExportError> {
        Ok(())
    }
}

/// Writes the snapshot as pretty-printed JSON.
#[derive(Clone, Debug)]
pub struct JsonCoverageExporter {
    path: Utf8PathBuf,
}

impl JsonCoverageExporter {
    /// The name of the file written within the export directory.
    pub const FILE_NAME: &'static str = "linecoverage.json";

    /// Creates an exporter writing to [`Self::FILE_NAME`] within `dir`.
    pub fn new(dir: &Utf8Path) -> Self {
        Self {
            path: dir.join(Self::FILE_NAME),
        }
    }

    /// Returns the path written to.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl CoverageExporter for JsonCoverageExporter {
    fn record_coverage(&mut self, summary: &LineCoverageSummary) -> Result<(), ExportError> {
        let mut json =
            serde_json::to_string_pretty(summary).map_err(|error| ExportError::Serialize {
                path: self.path.clone(),
                error,
            })?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())
    }
}

/// Writes per-test pass/fail status as a JUnit report.
///
/// No timestamps or durations are written.
#[derive(Clone, Debug)]
pub struct JunitStatusExporter {
    path: Utf8PathBuf,
}

impl JunitStatusExporter {
    /// The name of the file written within the export directory.
    pub const FILE_NAME: &'static str = "test-status.xml";

    /// Creates an exporter writing to [`Self::FILE_NAME`] within `dir`.
    pub fn new(dir: &Utf8Path) -> Self {
        Self {
            path: dir.join(Self::FILE_NAME),
        }
    }

    /// Returns the path written to.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl CoverageExporter for JunitStatusExporter {
    fn record_coverage(&mut self, summary: &LineCoverageSummary) -> Result<(), ExportError> {
        let mut test_suite = TestSuite::new("coverage");
        for test in &summary.tests {
            let status = if test.passed {
                TestCaseStatus::success()
            } else {
                let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
                status.set_message("test failed while gathering coverage");
                status
            };
            test_suite.add_test_case(TestCase::new(test.name.as_str(), status));
        }

        let mut report = Report::new("covgen");
        report.add_test_suite(test_suite);
        let xml = report.to_string().map_err(|error| ExportError::Junit {
            path: self.path.clone(),
            error,
        })?;
        write_atomic(&self.path, xml.as_bytes())
    }
}

/// Fans a snapshot out to several exporters.
///
/// Every exporter is called even if an earlier one fails; the first error is returned.
#[derive(Debug, Default)]
pub struct MultiCoverageExporter {
    exporters: Vec<Box<dyn CoverageExporter>>,
}

impl MultiCoverageExporter {
    /// Creates an exporter with no children.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an exporter writing each of `formats` into `dir`.
    pub fn for_formats(dir: &Utf8Path, formats: &[ExportFormat]) -> Self {
        let mut this = Self::new();
        for format in formats {
            match format {
                ExportFormat::Json => this.push(JsonCoverageExporter::new(dir)),
                ExportFormat::Junit => this.push(JunitStatusExporter::new(dir)),
            }
        }
        this
    }

    /// Adds an exporter.
    pub fn push(&mut self, exporter: impl CoverageExporter + 'static) {
        self.exporters.push(Box::new(exporter));
    }
}

impl CoverageExporter for MultiCoverageExporter {
    fn record_coverage(&mut self, summary: &LineCoverageSummary) -> Result<(), ExportError> {
        let mut first_error = None;
        for exporter in &mut self.exporters {
            if let Err(error) = exporter.record_coverage(summary) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn write_atomic(path: &Utf8Path, contents: &[u8]) -> Result<(), ExportError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|error| ExportError::CreateDir {
            path: dir.to_owned(),
            error,
        })?;
    }

    atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
        .write(|file| file.write_all(contents))
        .map_err(|error| ExportError::Write {
            path: path.to_owned(),
            error,
        })?;
    debug!("wrote coverage export to {path}");
    Ok(())
}
