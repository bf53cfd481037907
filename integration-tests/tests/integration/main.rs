// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These run real worker processes: `fake-coverage-worker` speaks the result protocol and reports
//! whatever a per-test JSON script tells it to, including crashing, hanging, or truncating its
//! output.
//!
//! CLI tests run `covgen-dup`, which is exactly the same as `covgen`. Running the binary under
//! test through its own name would have cargo try to replace it while it runs, which is
//! forbidden on Windows.

mod cli;
mod coverage_run;
mod fixtures;
