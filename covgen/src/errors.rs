// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::{FromPathBufError, Utf8PathBuf};
use covgen_metadata::CovgenExitCode;
use covgen_runner::errors::{
    BuildUnsuitableError, ConfigParseError, ConfigurationError, CoverageError, ExportError,
    UnexpectedFailure,
};
use owo_colors::OwoColorize;
use std::{error::Error, io};
use thiserror::Error;
use tracing::{error, info};

/// A failure covgen reports with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirRead {
        #[source]
        err: io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("test list read error")]
    TestListRead {
        path: Utf8PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("invalid configuration")]
    Configuration {
        #[from]
        err: ConfigurationError,
    },
    #[error("build unsuitable")]
    BuildUnsuitable {
        #[from]
        err: BuildUnsuitableError,
    },
    #[error("coverage worker failed")]
    WorkerFailed {
        #[source]
        err: CoverageError,
    },
    #[error("export failed")]
    ExportFailed {
        #[from]
        err: ExportError,
    },
    #[error("unexpected failure")]
    Unexpected {
        #[from]
        err: UnexpectedFailure,
    },
}

impl ExpectedError {
    pub(crate) fn from_coverage_error(err: CoverageError) -> Self {
        match err {
            CoverageError::Configuration(err) => Self::Configuration { err },
            CoverageError::BuildUnsuitable(err) => Self::BuildUnsuitable { err },
            CoverageError::Export(err) => Self::ExportFailed { err },
            CoverageError::Unexpected(err) => Self::Unexpected { err },
            err @ (CoverageError::ProcessLaunch(_)
            | CoverageError::Protocol(_)
            | CoverageError::WorkerAborted(_)) => Self::WorkerFailed { err },
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirRead { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::TestListRead { .. }
            | Self::Configuration { .. } => CovgenExitCode::SETUP_ERROR,
            Self::BuildUnsuitable { .. } => CovgenExitCode::BUILD_UNSUITABLE,
            Self::WorkerFailed { .. } => CovgenExitCode::WORKER_FAILED,
            Self::ExportFailed { .. } => CovgenExitCode::EXPORT_FAILED,
            Self::Unexpected { .. } => 1,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirRead { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse covgen config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::TestListRead { path, err } => {
                error!("failed to read test list from `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::Configuration { err } => {
                error!("{err}");
                err.source()
            }
            Self::BuildUnsuitable { err } => {
                error!(
                    "{} ({} failed)",
                    err,
                    err.failing_tests().len().style(styles.failed)
                );
                for test in err.failing_tests() {
                    info!(target: NO_HEADING, "    {}", test.style(styles.failed));
                }
                info!("{} [{}]", err.help().suggestion(), err.help().code());
                None
            }
            Self::WorkerFailed { err } => {
                error!("{err}");
                err.source()
            }
            Self::ExportFailed { err } => {
                error!("{err}");
                err.source()
            }
            Self::Unexpected { err } => {
                error!("{err}");
                err.source()
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covgen_runner::errors::{ProtocolError, WorkerAbortedError};
    use test_case::test_case;

    #[test_case(
        CoverageError::from(ProtocolError::Truncated { buffered: 4 }),
        CovgenExitCode::WORKER_FAILED
        ; "truncated stream"
    )]
    #[test_case(
        CoverageError::from(WorkerAbortedError::Cancelled),
        CovgenExitCode::WORKER_FAILED
        ; "cancelled run"
    )]
    #[test_case(
        CoverageError::from(ConfigurationError::MissingProgram),
        CovgenExitCode::SETUP_ERROR
        ; "missing program"
    )]
    #[test_case(
        CoverageError::from(ExportError::CreateDir {
            path: "out".into(),
            error: io::Error::other("read-only file system"),
        }),
        CovgenExitCode::EXPORT_FAILED
        ; "export failure"
    )]
    #[test_case(
        CoverageError::from(UnexpectedFailure::TokioRuntimeCreate(io::Error::other("no threads"))),
        1
        ; "unexpected failure"
    )]
    fn exit_codes(err: CoverageError, expected: i32) {
        assert_eq!(
            ExpectedError::from_coverage_error(err).process_exit_code(),
            expected
        );
    }
}
