// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a complete coverage run: scan, spawn, stream, aggregate, check and export.

use crate::{
    code_source::CodeSource,
    controller::{CancelHandle, WorkerProcessController},
    coverage::CoverageData,
    errors::{BuildUnsuitableError, CoverageError, DisplayErrorChain, UnexpectedFailure},
    export::{CoverageExporter, NullCoverageExporter},
    help::Help,
    options::{CoverageOptions, LaunchOptions},
    progress::ProgressIndicator,
    timings::{DisplayDuration, Stage, Timings},
};
use covgen_metadata::{TestIdentifier, WorkerArguments};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Calculates per-test line coverage.
pub trait CoverageGenerator {
    /// Runs the tests in scope and returns the coverage they achieve.
    ///
    /// Each call is a separate run with its own worker process, and records its snapshot with
    /// the exporter once. Fatal errors record nothing.
    ///
    /// If any test failed, returns [`CoverageError::BuildUnsuitable`], which carries the
    /// (non-authoritative) coverage gathered.
    fn calculate_coverage(&mut self) -> Result<CoverageData, CoverageError>;

    /// Returns the coverage options in use.
    fn coverage_options(&self) -> &CoverageOptions;

    /// Returns the launch options in use.
    fn launch_options(&self) -> &LaunchOptions;
}

/// Builds a [`DefaultCoverageGenerator`].
#[derive(Debug)]
pub struct DefaultCoverageGeneratorBuilder {
    launch: LaunchOptions,
    coverage: CoverageOptions,
    code: Arc<dyn CodeSource>,
    exporter: Box<dyn CoverageExporter>,
    show_progress: bool,
    cancel: CancelHandle,
}

impl DefaultCoverageGeneratorBuilder {
    /// Creates a new builder. Snapshots are discarded unless an exporter is set.
    pub fn new(
        launch: LaunchOptions,
        coverage: CoverageOptions,
        code: Arc<dyn CodeSource>,
    ) -> Self {
        Self {
            launch,
            coverage,
            code,
            exporter: Box::new(NullCoverageExporter),
            show_progress: false,
            cancel: CancelHandle::new(),
        }
    }

    /// Sets the exporter each run's snapshot is recorded with.
    pub fn set_exporter(&mut self, exporter: impl CoverageExporter + 'static) -> &mut Self {
        self.exporter = Box::new(exporter);
        self
    }

    /// Sets whether a progress indicator is shown.
    pub fn set_show_progress(&mut self, show_progress: bool) -> &mut Self {
        self.show_progress = show_progress;
        self
    }

    /// Returns a handle that cancels runs of the generator being built.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Creates the generator, along with the runtime that drives its worker.
    pub fn build(self) -> Result<DefaultCoverageGenerator, UnexpectedFailure> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(UnexpectedFailure::TokioRuntimeCreate)?;

        Ok(DefaultCoverageGenerator {
            launch: self.launch,
            coverage: self.coverage,
            code: self.code,
            exporter: self.exporter,
            show_progress: self.show_progress,
            cancel: self.cancel,
            runtime,
            timings: Timings::new(),
        })
    }
}

/// Runs one isolated worker process per coverage run, driven on the calling thread.
#[derive(Debug)]
pub struct DefaultCoverageGenerator {
    launch: LaunchOptions,
    coverage: CoverageOptions,
    code: Arc<dyn CodeSource>,
    exporter: Box<dyn CoverageExporter>,
    show_progress: bool,
    cancel: CancelHandle,
    runtime: Runtime,
    timings: Timings,
}

impl DefaultCoverageGenerator {
    /// Returns the stage timings of the last run.
    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Returns a handle that cancels the run in progress.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn gather(
        &self,
        tests: Vec<TestIdentifier>,
        data: &mut CoverageData,
    ) -> Result<(), CoverageError> {
        let progress = ProgressIndicator::new(self.show_progress, tests.len());
        let arguments = WorkerArguments {
            tests,
            max_dependency_distance: self.coverage.max_dependency_distance(),
            verbose: self.coverage.verbose(),
        };
        let controller = WorkerProcessController::new(
            self.launch.clone(),
            self.code.class_path().clone(),
            arguments,
        );

        for result in controller.start_blocking(&self.runtime, &self.cancel)? {
            let result = result?;
            progress.on_result(&result);
            data.apply(result);
        }
        progress.finish();
        Ok(())
    }
}

impl CoverageGenerator for DefaultCoverageGenerator {
    fn calculate_coverage(&mut self) -> Result<CoverageData, CoverageError> {
        self.timings = Timings::new();

        self.timings.register_start(Stage::ScanClassPath);
        let discovered = self.code.tests().map_err(UnexpectedFailure::CodeSource)?;
        let discovered_count = discovered.len();
        let tests = self.coverage.test_filter().filter(discovered);
        self.timings.register_end(Stage::ScanClassPath);
        debug!("selected {} of {discovered_count} tests", tests.len());

        let mut data = CoverageData::new(self.code.clone());
        if tests.is_empty() {
            warn!("{}: {}", Help::NoTestsFound, Help::NoTestsFound.suggestion());
        } else {
            self.timings.register_start(Stage::Coverage);
            self.gather(tests, &mut data)?;
            if let Some(elapsed) = self.timings.register_end(Stage::Coverage) {
                info!("calculated coverage in {}", DisplayDuration(elapsed));
            }
        }

        let all_green = data.all_tests_green();

        self.timings.register_start(Stage::Export);
        let exported = self.exporter.record_coverage(&data.create_line_coverage());
        self.timings.register_end(Stage::Export);
        debug!("coverage run timings:\n{}", self.timings);

        if !all_green {
            if let Err(error) = exported {
                warn!(
                    "failed to export coverage of an unsuitable build: {}",
                    DisplayErrorChain::new(error)
                );
            }
            return Err(BuildUnsuitableError::new(Help::FailingTests, data).into());
        }
        exported?;
        Ok(data)
    }

    fn coverage_options(&self) -> &CoverageOptions {
        &self.coverage
    }

    fn launch_options(&self) -> &LaunchOptions {
        &self.launch
    }
}
