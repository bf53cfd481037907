// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregating coverage results into a per-line coverage map.
//!
//! A [`CoverageData`] is created fresh for each run and owned by it. Results are applied one at
//! a time, in the order they arrive from the worker; once the run is over the data is only read.

mod data;

pub use data::*;
