// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The seam through which covgen learns about the code under test.

use crate::{
    errors::{CodeSourceError, ConfigurationError},
    options::ClassPath,
    test_filter::build_glob_set,
};
use covgen_metadata::{ClassName, TestIdentifier};
use globset::GlobSet;
use std::fmt;

/// Enumerates tests and classifies code under test.
///
/// Discovering tests and telling test code from production code is left to the caller; covgen
/// only consumes the results.
pub trait CodeSource: fmt::Debug + Send + Sync {
    /// Returns every test in scope.
    fn tests(&self) -> Result<Vec<TestIdentifier>, CodeSourceError>;

    /// Returns the class path the worker should run with.
    fn class_path(&self) -> &ClassPath;

    /// Returns true if the class is test code rather than code under test.
    fn is_test_class(&self, class: &ClassName) -> bool;
}

/// A code source backed by an explicit list of tests.
///
/// Test classes are recognized by glob pattern.
#[derive(Clone, Debug)]
pub struct StaticCodeSource {
    tests: Vec<TestIdentifier>,
    class_path: ClassPath,
    test_class_patterns: Vec<String>,
    test_classes: GlobSet,
}

impl StaticCodeSource {
    /// Creates a new `StaticCodeSource`.
    pub fn new(
        tests: impl IntoIterator<Item = TestIdentifier>,
        class_path: ClassPath,
        test_class_patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ConfigurationError> {
        let test_class_patterns: Vec<String> =
            test_class_patterns.into_iter().map(Into::into).collect();
        let test_classes = build_glob_set("test class", &test_class_patterns)?;
        Ok(Self {
            tests: tests.into_iter().collect(),
            class_path,
            test_class_patterns,
            test_classes,
        })
    }

    /// Returns the patterns identifying test classes.
    pub fn test_class_patterns(&self) -> &[String] {
        &self.test_class_patterns
    }
}

impl CodeSource for StaticCodeSource {
    fn tests(&self) -> Result<Vec<TestIdentifier>, CodeSourceError> {
        Ok(self.tests.clone())
    }

    fn class_path(&self) -> &ClassPath {
        &self.class_path
    }

    fn is_test_class(&self, class: &ClassName) -> bool {
        self.test_classes.is_match(class.as_str())
    }
}
