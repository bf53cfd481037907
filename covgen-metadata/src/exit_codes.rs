// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `covgen` failures.
///
/// Coverage runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum CovgenExitCode {}

impl CovgenExitCode {
    /// No errors occurred and covgen exited normally.
    pub const OK: i32 = 0;

    /// A user issue happened while setting up a coverage run: bad configuration, missing
    /// worker program, unreadable test manifest.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests failed while coverage was being gathered, so the build is not
    /// suitable for mutation analysis.
    pub const BUILD_UNSUITABLE: i32 = 100;

    /// The worker process could not be launched, or it broke the result protocol.
    pub const WORKER_FAILED: i32 = 105;

    /// Writing exported coverage produced an error.
    pub const EXPORT_FAILED: i32 = 110;
}
