// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by covgen.

use crate::{coverage::CoverageData, help::Help, protocol::MessageKind};
use camino::Utf8PathBuf;
use config::ConfigError;
use covgen_metadata::TestIdentifier;
use itertools::Itertools;
use std::{error, fmt, io, process::ExitStatus, time::Duration};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse covgen config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// Launch or coverage parameters are invalid.
///
/// Always reported before any worker process is spawned.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// No worker program was configured.
    #[error("no worker program configured (set `worker.program`)")]
    MissingProgram,

    /// The instrumentation agent could not be found at the configured location.
    #[error("instrumentation agent not found at `{path}`")]
    AgentNotFound {
        /// The configured agent location.
        path: Utf8PathBuf,
    },

    /// The working directory could not be read.
    #[error("working directory `{path}` could not be read")]
    WorkingDirRead {
        /// The working directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The working directory is not a directory.
    #[error("working directory `{path}` is not a directory")]
    WorkingDirNotADirectory {
        /// The working directory.
        path: Utf8PathBuf,
    },

    /// A glob pattern could not be parsed.
    #[error("invalid {kind} pattern `{pattern}`")]
    InvalidGlob {
        /// What the pattern is used for.
        kind: &'static str,

        /// The pattern.
        pattern: String,

        /// The underlying error.
        #[source]
        err: globset::Error,
    },

    /// A timeout was configured as zero.
    #[error("`{name}` must be greater than zero")]
    ZeroTimeout {
        /// The name of the timeout.
        name: &'static str,
    },

    /// The class path could not be joined into a single environment value.
    #[error("class path contains an element that cannot be passed to the worker")]
    InvalidClassPath(#[source] std::env::JoinPathsError),
}

/// The worker process could not be started, or it never connected back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessLaunchError {
    /// Binding the local endpoint failed.
    #[error("failed to bind a local endpoint for the worker")]
    Bind(#[source] io::Error),

    /// Spawning the worker process failed.
    #[error("failed to spawn worker `{program}`")]
    Spawn {
        /// The program that was spawned.
        program: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// Accepting the worker's connection failed.
    #[error("failed to accept worker connection")]
    Accept(#[source] io::Error),

    /// The worker did not connect within the configured bound.
    #[error("worker did not connect within {}", display_duration(.timeout))]
    ConnectTimeout {
        /// The configured connect timeout.
        timeout: Duration,
    },

    /// The worker exited before it connected.
    #[error("worker exited with {status} before connecting{}", display_stderr_tail(.stderr_tail))]
    ExitedBeforeConnect {
        /// The exit status of the worker.
        status: ExitStatus,

        /// The last lines the worker wrote to stderr.
        stderr_tail: String,
    },

    /// Waiting on the worker process failed.
    #[error("failed to wait on worker process")]
    Wait(#[source] io::Error),
}

/// The result stream was truncated or malformed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A frame header did not start with the expected magic number.
    #[error("invalid frame magic {found:#06x}")]
    BadMagic {
        /// The magic number found.
        found: u16,
    },

    /// A frame header had flags set that this version does not understand.
    #[error("unsupported frame flags {flags:#04x}")]
    UnsupportedFlags {
        /// The flags found.
        flags: u8,
    },

    /// A frame header carried an unknown message kind.
    #[error("unknown message kind {kind}")]
    UnknownKind {
        /// The raw kind byte.
        kind: u8,
    },

    /// A frame carried a message of the wrong kind for this direction.
    #[error("expected a {expected} message, found {found}")]
    UnexpectedKind {
        /// The kind that was expected.
        expected: MessageKind,

        /// The kind that was found.
        found: MessageKind,
    },

    /// A frame declared a payload larger than the maximum allowed.
    #[error("frame payload of {len} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge {
        /// The declared payload length.
        len: usize,

        /// The maximum payload length.
        max: usize,
    },

    /// The stream ended in the middle of a frame.
    #[error("stream closed with {buffered} bytes of an incomplete frame buffered")]
    Truncated {
        /// The number of bytes buffered when the stream closed.
        buffered: usize,
    },

    /// A frame payload could not be decoded.
    #[error("failed to decode {kind} message")]
    Malformed {
        /// The kind of message being decoded.
        kind: MessageKind,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// A message could not be encoded.
    #[error("failed to encode {kind} message")]
    Encode {
        /// The kind of message being encoded.
        kind: MessageKind,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// Reading from the channel failed.
    #[error("failed to read from result channel")]
    Read(#[source] io::Error),

    /// Writing to the channel failed.
    #[error("failed to write to result channel")]
    Write(#[source] io::Error),
}

/// A connected worker failed to complete the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerAbortedError {
    /// The worker exited unsuccessfully.
    #[error("worker exited with {status} before completing the run{}", display_stderr_tail(.stderr_tail))]
    UnexpectedExit {
        /// The exit status of the worker.
        status: ExitStatus,

        /// The last lines the worker wrote to stderr.
        stderr_tail: String,
    },

    /// The worker closed the result channel and exited successfully, but some of the tests it
    /// was sent never reported a result.
    #[error(
        "worker finished without reporting results for {} of its tests: {}",
        .missing.len(),
        display_missing(.missing)
    )]
    MissingResults {
        /// The tests without a result, sorted by identifier.
        missing: Vec<TestIdentifier>,
    },

    /// The run did not complete within the configured bound.
    #[error("worker did not finish streaming results within {}", display_duration(.timeout))]
    RunTimeout {
        /// The configured run timeout.
        timeout: Duration,
    },

    /// The worker closed the result channel but did not exit within the configured bound.
    #[error("worker did not exit within {} of closing the result channel", display_duration(.timeout))]
    ExitTimeout {
        /// The configured exit timeout.
        timeout: Duration,
    },

    /// The run was cancelled.
    #[error("coverage run was cancelled")]
    Cancelled,

    /// Waiting on the worker process failed.
    #[error("failed to wait on worker process")]
    Wait(#[source] io::Error),
}

/// Not every test passed while gathering coverage, so the build is not suitable for mutation
/// analysis.
///
/// The partial coverage gathered is available through [`Self::coverage`] for inspection, but
/// must not be treated as a complete, trustworthy result.
#[derive(Debug, Error)]
#[error("{help}")]
pub struct BuildUnsuitableError {
    help: Help,
    failing_tests: Vec<TestIdentifier>,
    coverage: Box<CoverageData>,
}

impl BuildUnsuitableError {
    pub(crate) fn new(help: Help, coverage: CoverageData) -> Self {
        Self {
            help,
            failing_tests: coverage.failing_tests(),
            coverage: Box::new(coverage),
        }
    }

    /// Returns the corrective help for this condition.
    pub fn help(&self) -> Help {
        self.help
    }

    /// Returns the failing tests, sorted by identifier.
    pub fn failing_tests(&self) -> &[TestIdentifier] {
        &self.failing_tests
    }

    /// Returns the (non-authoritative) coverage gathered during the run.
    pub fn coverage(&self) -> &CoverageData {
        &self.coverage
    }

    /// Consumes the error, returning the (non-authoritative) coverage gathered during the run.
    pub fn into_coverage(self) -> CoverageData {
        *self.coverage
    }
}

/// An error that occurred while exporting coverage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExportError {
    /// Creating the export directory failed.
    #[error("failed to create export directory `{path}`")]
    CreateDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Writing an export file failed.
    #[error("failed to write coverage export to `{path}`")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },

    /// Serializing the coverage summary failed.
    #[error("failed to serialize coverage summary for `{path}`")]
    Serialize {
        /// The file being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// Serializing the JUnit report failed.
    #[error("failed to serialize test status report for `{path}`")]
    Junit {
        /// The file being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },
}

/// An error reported by a [`CodeSource`](crate::code_source::CodeSource).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CodeSourceError {
    message: String,
    #[source]
    source: Option<Box<dyn error::Error + Send + Sync + 'static>>,
}

impl CodeSourceError {
    /// Creates a new error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new error with a message and an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Any other failure, wrapped with its original cause.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnexpectedFailure {
    /// Creating the Tokio runtime failed.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// The code source failed to enumerate tests.
    #[error("code source failed to enumerate tests")]
    CodeSource(#[source] CodeSourceError),
}

/// An error that occurred while calculating coverage.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Launch or coverage parameters were invalid.
    #[error("invalid coverage configuration")]
    Configuration(#[from] ConfigurationError),

    /// The worker could not be launched or never connected.
    #[error("failed to launch coverage worker")]
    ProcessLaunch(#[from] ProcessLaunchError),

    /// The result stream was truncated or malformed.
    #[error("coverage result stream was corrupted")]
    Protocol(#[from] ProtocolError),

    /// The worker failed to complete the run.
    #[error("coverage worker did not complete the run")]
    WorkerAborted(#[from] WorkerAbortedError),

    /// Not every test passed.
    #[error("build is not suitable for mutation analysis")]
    BuildUnsuitable(#[from] BuildUnsuitableError),

    /// Exporting coverage failed.
    #[error("failed to export coverage")]
    Export(#[from] ExportError),

    /// Any other failure.
    #[error("unexpected failure while calculating coverage")]
    Unexpected(#[from] UnexpectedFailure),
}

impl CoverageError {
    /// Returns true if this error means no coverage from the run can be trusted.
    ///
    /// This is every error except [`CoverageError::BuildUnsuitable`], where coverage was fully
    /// gathered but some tests failed, and [`CoverageError::Export`], where coverage was
    /// gathered but could not be written out.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::BuildUnsuitable(_) | Self::Export(_))
    }
}

/// An error that occurred on the worker side of the result channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerClientError {
    /// The port environment variable was not set.
    #[error("environment variable `{var}` is not set: was this process launched by covgen?")]
    MissingPort {
        /// The environment variable.
        var: &'static str,
    },

    /// The port environment variable could not be parsed.
    #[error("environment variable `{var}` has invalid port `{value}`")]
    InvalidPort {
        /// The environment variable.
        var: &'static str,

        /// The value found.
        value: String,
    },

    /// Connecting to the controller failed.
    #[error("failed to connect to covgen controller on port {port}")]
    Connect {
        /// The port.
        port: u16,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The controller closed the connection before sending arguments.
    #[error("controller closed the connection before sending worker arguments")]
    ConnectionClosed,

    /// A protocol error occurred.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

fn display_duration(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

/// The number of missing tests named in an error message.
const MISSING_SHOWN: usize = 5;

fn display_missing(missing: &[TestIdentifier]) -> String {
    let shown = missing.iter().take(MISSING_SHOWN).join(", ");
    match missing.len().checked_sub(MISSING_SHOWN) {
        Some(rest) if rest > 0 => format!("{shown} and {rest} more"),
        _ => shown,
    }
}

fn display_stderr_tail(tail: &str) -> DisplayStderrTail<'_> {
    DisplayStderrTail(tail)
}

struct DisplayStderrTail<'a>(&'a str);

impl fmt::Display for DisplayStderrTail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "; worker stderr:")?;
        for line in self.0.lines() {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E>(E);

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        let causes = std::iter::from_fn(|| {
            let current = source?;
            source = current.source();
            Some(current)
        })
        .collect_vec();
        if !causes.is_empty() {
            write!(f, "\n  caused by:")?;
            for cause in causes {
                write!(f, "\n  - {cause}")?;
            }
        }
        Ok(())
    }
}
