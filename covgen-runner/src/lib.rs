// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for covgen: per-test line coverage, gathered in an isolated worker process.
//!
//! The basic flow of a coverage run is:
//!
//! 1. A [`CodeSource`](code_source::CodeSource) lists the tests in scope, which are narrowed
//!    down by a [`TestFilter`](test_filter::TestFilter).
//! 2. The [`controller`] spawns a worker process, sends it the test list over a framed
//!    [`protocol`] and pulls one [`CoverageResult`](covgen_metadata::CoverageResult) per test.
//! 3. Each result is applied to a [`CoverageData`](coverage::CoverageData) in arrival order.
//! 4. The run is checked for failing tests, and the canonical snapshot is handed to an
//!    [`export`]er.
//!
//! [`DefaultCoverageGenerator`](generator::DefaultCoverageGenerator) drives all of this.
//! Worker implementations talk to the controller through [`worker::WorkerConnection`].

pub mod code_source;
pub mod config;
pub mod controller;
pub mod coverage;
pub mod errors;
pub mod export;
pub mod generator;
pub mod help;
pub mod options;
pub mod progress;
pub mod protocol;
pub mod test_filter;
mod time;
pub mod timings;
pub mod worker;
