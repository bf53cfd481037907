// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Wire messages and machine-readable output for covgen coverage runs.
//!
//! This crate is shared between the coverage controller (`covgen-runner`), worker
//! implementations that stream results back to it, and downstream consumers of exported
//! line coverage.

mod exit_codes;
mod identifiers;
mod messages;
mod summary;

pub use exit_codes::*;
pub use identifiers::*;
pub use messages::*;
pub use summary::*;
