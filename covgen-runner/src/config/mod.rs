// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for covgen.
//!
//! Configuration is read from an embedded default config, with a repository config at
//! `.config/covgen.toml` (or a file passed in explicitly) layered on top. Parsing happens once;
//! [`LaunchOptions`](crate::options::LaunchOptions) and
//! [`CoverageOptions`](crate::options::CoverageOptions) are then built from the result and
//! validated before any worker is spawned.

mod imp;

pub use imp::*;
