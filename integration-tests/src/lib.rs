// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared pieces of the covgen integration tests.

pub mod covgen_cli;
pub mod worker_script;
