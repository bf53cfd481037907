// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corrective messages for conditions a user can fix.

use std::fmt;

/// A condition covgen can explain to the user, along with how to fix it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Help {
    /// Not every test passed while coverage was gathered.
    FailingTests,

    /// The filtered test list was empty.
    NoTestsFound,
}

impl Help {
    /// Returns a short, stable identifier for this condition.
    pub fn code(self) -> &'static str {
        match self {
            Self::FailingTests => "failing-tests",
            Self::NoTestsFound => "no-tests-found",
        }
    }

    /// Returns the corrective suggestion for this condition.
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::FailingTests => {
                "mutation analysis requires a green test suite: fix or exclude the failing tests \
                 (for example with `--filter`) and run again"
            }
            Self::NoTestsFound => {
                "check the test list and the `tests.filter` patterns: no test matched, so no \
                 coverage was gathered"
            }
        }
    }
}

impl fmt::Display for Help {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailingTests => write!(f, "not every test passed while gathering coverage"),
            Self::NoTestsFound => write!(f, "no tests were found to gather coverage for"),
        }
    }
}
