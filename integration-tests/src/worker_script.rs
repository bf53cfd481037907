// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The script the fake coverage worker follows.
//!
//! Tests write a [`WorkerScript`] as JSON and pass its path as the worker's only argument.

use camino::Utf8PathBuf;
use covgen_metadata::{ClassLine, CoverageResult, TestIdentifier, WorkerArguments};
use covgen_runner::protocol::FRAME_MAGIC;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the fake worker does once it is launched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerScript {
    /// The result reported for each test. Tests not listed pass without covering anything.
    #[serde(default)]
    pub results: BTreeMap<String, ScriptedResult>,

    /// The order results are sent in.
    #[serde(default)]
    pub order: ResultOrder,

    /// How the worker deviates from a well-behaved run.
    #[serde(default)]
    pub behavior: Behavior,

    /// Lines written to stderr on startup.
    #[serde(default)]
    pub stderr_lines: Vec<String>,

    /// File the worker writes its process ID to on startup.
    #[serde(default)]
    pub pid_file: Option<Utf8PathBuf>,

    /// File the worker writes what it received from the controller to.
    #[serde(default)]
    pub received_file: Option<Utf8PathBuf>,

    /// If set, the worker starts a long-running child process on startup, leaves it running and
    /// writes its process ID here.
    #[serde(default)]
    pub orphan_pid_file: Option<Utf8PathBuf>,
}

impl WorkerScript {
    /// Adds a scripted result.
    pub fn with_result(mut self, test: &str, passed: bool, lines: &[(&str, u32)]) -> Self {
        self.results.insert(
            test.to_owned(),
            ScriptedResult {
                passed,
                lines: lines
                    .iter()
                    .map(|(class, line)| ((*class).to_owned(), *line))
                    .collect(),
            },
        );
        self
    }

    /// Returns the result to send for `test`.
    pub fn result_for(&self, test: &TestIdentifier) -> CoverageResult {
        match self.results.get(test.as_str()) {
            Some(scripted) => CoverageResult::new(
                test.clone(),
                // Differs between runs.
                std::process::id() as u64 % 97,
                scripted.passed,
                scripted
                    .lines
                    .iter()
                    .map(|(class, line)| ClassLine::new(class.as_str(), *line)),
            ),
            None => CoverageResult::new(test.clone(), 0, true, Vec::new()),
        }
    }
}

/// A scripted result for a single test.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScriptedResult {
    /// Whether the test passes.
    pub passed: bool,

    /// The lines the test covers, as `(class, line)` pairs.
    pub lines: Vec<(String, u32)>,
}

/// The order results are sent in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultOrder {
    /// The order the controller listed the tests in.
    #[default]
    AsGiven,

    /// The reverse of that order.
    Reversed,
}

/// How the fake worker misbehaves, if at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Behavior {
    /// Send every result, close the connection and exit 0.
    #[default]
    Normal,

    /// Exit with `exit_code` after sending `results` results, without closing the connection.
    CrashAfter {
        /// The number of results sent first.
        results: usize,

        /// The exit code.
        exit_code: i32,
    },

    /// Send only part of the final result's frame, then exit 0.
    TruncateFinal,

    /// Send `results` results, then stop without closing the connection or exiting.
    StallAfter {
        /// The number of results sent first.
        results: usize,
    },

    /// Send every result but the last, then a corrupt frame, then close the connection and
    /// exit 0.
    CorruptFrame {
        /// How the frame is corrupted.
        corruption: Corruption,
    },

    /// Never connect to the controller.
    NeverConnect,

    /// Send every result and close the connection, then exit with `code`.
    ExitCode {
        /// The exit code.
        code: i32,
    },

    /// Send every result and close the connection, then never exit.
    HangAfterClose,
}

/// The ways [`Behavior::CorruptFrame`] corrupts a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corruption {
    /// The header does not start with the frame magic.
    BadMagic,

    /// The header is valid but the payload is not a coverage result.
    MalformedPayload,
}

impl Corruption {
    /// Returns the bytes written in place of a valid frame.
    pub fn frame_bytes(self) -> Vec<u8> {
        let (magic, payload): (u16, &[u8]) = match self {
            Self::BadMagic => (0xDEAD, b"{}"),
            Self::MalformedPayload => (FRAME_MAGIC, b"{\"test\": 42"),
        };
        let mut bytes = Vec::with_capacity(8 + payload.len());
        bytes.extend_from_slice(&magic.to_be_bytes());
        // A coverage result with no flags set.
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }
}

/// What the worker received from the controller, written to [`WorkerScript::received_file`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReceivedRun {
    /// The arguments message.
    pub arguments: WorkerArguments,

    /// The class path environment variable.
    pub class_path: Option<String>,

    /// The agent environment variable.
    pub agent: Option<String>,
}
