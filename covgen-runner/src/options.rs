// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Launch and coverage options for a single run.
//!
//! Both [`LaunchOptions`] and [`CoverageOptions`] are validated once, when they are built, and are
//! never mutated afterwards.

use crate::{errors::ConfigurationError, test_filter::TestFilter};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};
use std::{ffi::OsString, fmt, sync::Arc, time::Duration};

/// An ordered, de-duplicated list of class path elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassPath {
    elements: IndexSet<Utf8PathBuf>,
}

impl ClassPath {
    /// Creates a new class path from the given elements.
    ///
    /// Later duplicates are dropped, keeping the position of the first occurrence.
    pub fn new(elements: impl IntoIterator<Item = impl Into<Utf8PathBuf>>) -> Self {
        Self {
            elements: elements.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends every element of `other` not already present.
    pub fn union(&mut self, other: &ClassPath) {
        self.elements.extend(other.elements.iter().cloned());
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Utf8Path> + '_ {
        self.elements.iter().map(|p| p.as_path())
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Joins the elements with the platform's path list separator.
    pub fn to_env_value(&self) -> Result<OsString, ConfigurationError> {
        std::env::join_paths(self.elements.iter()).map_err(ConfigurationError::InvalidClassPath)
    }
}

impl<P: Into<Utf8PathBuf>> FromIterator<P> for ClassPath {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Locates the instrumentation agent loaded into the worker.
pub trait AgentLocator: fmt::Debug + Send + Sync {
    /// Returns the agent location, or `None` if the worker runs without one.
    fn locate(&self) -> Result<Option<Utf8PathBuf>, ConfigurationError>;
}

/// An agent at a fixed, known location.
#[derive(Clone, Debug)]
pub struct KnownLocationAgent {
    path: Utf8PathBuf,
}

impl KnownLocationAgent {
    /// Creates a new `KnownLocationAgent`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AgentLocator for KnownLocationAgent {
    fn locate(&self) -> Result<Option<Utf8PathBuf>, ConfigurationError> {
        if self.path.is_file() {
            Ok(Some(self.path.clone()))
        } else {
            Err(ConfigurationError::AgentNotFound {
                path: self.path.clone(),
            })
        }
    }
}

/// No instrumentation agent: the worker instruments code itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAgent;

impl AgentLocator for NoAgent {
    fn locate(&self) -> Result<Option<Utf8PathBuf>, ConfigurationError> {
        Ok(None)
    }
}

/// Time bounds applied to a worker process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerTimeouts {
    /// How long to wait for the worker to connect after it is spawned.
    pub connect: Duration,

    /// How long the worker may take from connecting to closing the result channel.
    pub run: Duration,

    /// How long to wait for the worker to exit once it has closed the result channel.
    pub exit: Duration,

    /// How long a terminated worker gets to exit before it is killed.
    pub grace_period: Duration,
}

impl WorkerTimeouts {
    fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("connect-timeout", self.connect),
            ("run-timeout", self.run),
            ("exit-timeout", self.exit),
        ] {
            if value.is_zero() {
                return Err(ConfigurationError::ZeroTimeout { name });
            }
        }
        Ok(())
    }
}

impl Default for WorkerTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            run: Duration::from_secs(60 * 60),
            exit: Duration::from_secs(10),
            grace_period: Duration::from_secs(5),
        }
    }
}

/// How to launch the worker process.
#[derive(Clone, Debug)]
pub struct LaunchOptions {
    program: Utf8PathBuf,
    args: Vec<String>,
    agent: Arc<dyn AgentLocator>,
    working_dir: Utf8PathBuf,
    env: IndexMap<String, String>,
    timeouts: WorkerTimeouts,
}

impl LaunchOptions {
    /// Returns the worker program.
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Returns the arguments passed to the worker program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the instrumentation agent locator.
    pub fn agent(&self) -> &dyn AgentLocator {
        &*self.agent
    }

    /// Returns the directory the worker is launched in.
    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    /// Returns extra environment variables set for the worker.
    pub fn env(&self) -> &IndexMap<String, String> {
        &self.env
    }

    /// Returns the time bounds applied to the worker.
    pub fn timeouts(&self) -> &WorkerTimeouts {
        &self.timeouts
    }
}

/// Builds [`LaunchOptions`].
#[derive(Debug)]
pub struct LaunchOptionsBuilder {
    program: Option<Utf8PathBuf>,
    args: Vec<String>,
    agent: Arc<dyn AgentLocator>,
    working_dir: Utf8PathBuf,
    env: IndexMap<String, String>,
    timeouts: WorkerTimeouts,
}

impl LaunchOptionsBuilder {
    /// Creates a new builder, launching workers in `working_dir`.
    pub fn new(working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: None,
            args: Vec::new(),
            agent: Arc::new(NoAgent),
            working_dir: working_dir.into(),
            env: IndexMap::new(),
            timeouts: WorkerTimeouts::default(),
        }
    }

    /// Sets the worker program.
    pub fn set_program(&mut self, program: impl Into<Utf8PathBuf>) -> &mut Self {
        self.program = Some(program.into());
        self
    }

    /// Sets the arguments passed to the worker program.
    pub fn set_args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the instrumentation agent locator.
    pub fn set_agent(&mut self, agent: impl AgentLocator + 'static) -> &mut Self {
        self.agent = Arc::new(agent);
        self
    }

    /// Sets an extra environment variable for the worker.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the time bounds applied to the worker.
    pub fn set_timeouts(&mut self, timeouts: WorkerTimeouts) -> &mut Self {
        self.timeouts = timeouts;
        self
    }

    /// Validates the options and builds them.
    pub fn build(&self) -> Result<LaunchOptions, ConfigurationError> {
        let program = match &self.program {
            Some(program) if !program.as_str().is_empty() => program.clone(),
            _ => return Err(ConfigurationError::MissingProgram),
        };

        let metadata = self.working_dir.metadata().map_err(|err| {
            ConfigurationError::WorkingDirRead {
                path: self.working_dir.clone(),
                err,
            }
        })?;
        if !metadata.is_dir() {
            return Err(ConfigurationError::WorkingDirNotADirectory {
                path: self.working_dir.clone(),
            });
        }

        self.timeouts.validate()?;

        Ok(LaunchOptions {
            program,
            args: self.args.clone(),
            agent: self.agent.clone(),
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
            timeouts: self.timeouts,
        })
    }
}

/// What a coverage run covers, and how.
#[derive(Clone, Debug)]
pub struct CoverageOptions {
    test_filter: TestFilter,
    max_dependency_distance: Option<u32>,
    verbose: bool,
}

impl CoverageOptions {
    /// Returns the filter applied to the code source's tests.
    pub fn test_filter(&self) -> &TestFilter {
        &self.test_filter
    }

    /// Returns the dependency distance bound passed through to the worker.
    pub fn max_dependency_distance(&self) -> Option<u32> {
        self.max_dependency_distance
    }

    /// Returns true if worker output should be shown.
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

/// Builds [`CoverageOptions`].
#[derive(Clone, Debug, Default)]
pub struct CoverageOptionsBuilder {
    filter: Vec<String>,
    max_dependency_distance: Option<u32>,
    verbose: bool,
}

impl CoverageOptionsBuilder {
    /// Creates a new builder that selects every test.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds test filter patterns.
    pub fn add_filters(
        &mut self,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.filter.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Sets the dependency distance bound.
    pub fn set_max_dependency_distance(&mut self, distance: Option<u32>) -> &mut Self {
        self.max_dependency_distance = distance;
        self
    }

    /// Sets whether worker output should be shown.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Validates the options and builds them.
    pub fn build(&self) -> Result<CoverageOptions, ConfigurationError> {
        Ok(CoverageOptions {
            test_filter: TestFilter::new(self.filter.iter().cloned())?,
            max_dependency_distance: self.max_dependency_distance,
            verbose: self.verbose,
        })
    }
}
