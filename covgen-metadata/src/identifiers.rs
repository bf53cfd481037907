// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// The name of a single discovered test.
///
/// Test identifiers are opaque to covgen: they are produced by a code source, handed to the
/// worker, and echoed back in each [`CoverageResult`](crate::CoverageResult). They are ordered
/// lexicographically, which is the canonical order used in exported coverage.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestIdentifier(SmolStr);

impl TestIdentifier {
    /// Creates a new test identifier.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestIdentifier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The name of a class (compilation unit) whose lines can be covered.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(SmolStr);

impl ClassName {
    /// Creates a new class name.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    /// Returns the class name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A single line within a class.
///
/// Ordered by class name, then by line number.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassLine {
    /// The class the line belongs to.
    pub class: ClassName,

    /// The 1-based line number.
    pub line: u32,
}

impl ClassLine {
    /// Creates a new `ClassLine`.
    pub fn new(class: impl Into<ClassName>, line: u32) -> Self {
        Self {
            class: class.into(),
            line,
        }
    }
}

impl fmt::Display for ClassLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.line)
    }
}

#[cfg(feature = "proptest1")]
mod proptest_impls {
    use super::*;
    use proptest::prelude::*;

    impl Arbitrary for TestIdentifier {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            "[A-E][a-z]{0,3}Test".prop_map(TestIdentifier::new).boxed()
        }
    }

    impl Arbitrary for ClassName {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            "[A-E][a-z]{0,3}".prop_map(ClassName::new).boxed()
        }
    }

    impl Arbitrary for ClassLine {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (any::<ClassName>(), 1..64_u32)
                .prop_map(|(class, line)| ClassLine { class, line })
                .boxed()
        }
    }
}
