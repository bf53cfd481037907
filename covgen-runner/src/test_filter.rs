// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering the tests handed to the worker.

use crate::errors::ConfigurationError;
use covgen_metadata::TestIdentifier;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;

/// Selects tests by glob pattern.
///
/// An empty filter selects every test.
#[derive(Clone, Debug)]
pub struct TestFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl TestFilter {
    /// Creates a filter from a list of glob patterns.
    pub fn new(
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ConfigurationError> {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let set = build_glob_set("test filter", &patterns)?;
        Ok(Self { patterns, set })
    }

    /// Creates a filter that selects every test.
    pub fn match_all() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// Returns the patterns making up this filter.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if the test is selected by this filter.
    pub fn is_match(&self, test: &TestIdentifier) -> bool {
        self.patterns.is_empty() || self.set.is_match(test.as_str())
    }

    /// Returns the selected tests, in their original order with duplicates removed.
    pub fn filter(&self, tests: impl IntoIterator<Item = TestIdentifier>) -> Vec<TestIdentifier> {
        let mut seen = HashSet::new();
        tests
            .into_iter()
            .filter(|test| self.is_match(test) && seen.insert(test.clone()))
            .collect()
    }
}

impl Default for TestFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

pub(crate) fn build_glob_set(
    kind: &'static str,
    patterns: &[String],
) -> Result<GlobSet, ConfigurationError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| ConfigurationError::InvalidGlob {
            kind,
            pattern: pattern.clone(),
            err,
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| ConfigurationError::InvalidGlob {
            kind,
            pattern: patterns.join(", "),
            err,
        })
}
