// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use covgen_metadata::{CovgenExitCode, TestIdentifier};
use covgen_runner::{
    code_source::StaticCodeSource,
    config::CovgenConfig,
    export::MultiCoverageExporter,
    generator::{CoverageGenerator, DefaultCoverageGeneratorBuilder},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-test line coverage for mutation analysis.
///
/// Runs the configured worker once, in its own process, and records which tests cover which
/// lines.
#[derive(Debug, Parser)]
#[command(version, name = "covgen", styles = crate::output::clap_styles::style())]
pub struct CovgenApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(subcommand)]
    command: Command,
}

impl CovgenApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, output: OutputContext) -> Result<i32, ExpectedError> {
        match self.command {
            Command::Run(opts) => opts.exec(output),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the worker and gather per-test line coverage
    Run(RunOpts),
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: workspace-root/.config/covgen.toml]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Directory relative paths in the config are resolved against [default: current directory]
    #[arg(long, value_name = "DIR")]
    workspace_root: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn workspace_root(&self) -> Result<Utf8PathBuf, ExpectedError> {
        match &self.workspace_root {
            Some(root) => Ok(root.clone()),
            None => {
                let current_dir = std::env::current_dir()
                    .map_err(|err| ExpectedError::CurrentDirRead { err })?;
                Utf8PathBuf::try_from(current_dir)
                    .map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
            }
        }
    }

    fn make_config(&self) -> Result<CovgenConfig, ExpectedError> {
        let workspace_root = self.workspace_root()?;
        Ok(CovgenConfig::from_sources(
            workspace_root,
            self.config_file.as_deref(),
        )?)
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    #[command(flatten)]
    config_opts: ConfigOpts,

    /// Test to gather coverage for (may be repeated)
    #[arg(long = "test", value_name = "TEST")]
    tests: Vec<String>,

    /// File listing tests to gather coverage for, one per line
    #[arg(long, value_name = "PATH")]
    tests_from: Option<Utf8PathBuf>,

    /// Only gather coverage for tests matching this glob (may be repeated)
    #[arg(short = 'E', long = "filter", value_name = "GLOB")]
    filters: Vec<String>,

    /// Directory to export coverage to [default: from config]
    #[arg(long, value_name = "DIR")]
    export_dir: Option<Utf8PathBuf>,

    /// Show a progress indicator while coverage is gathered
    #[arg(long)]
    show_progress: bool,
}

impl RunOpts {
    fn exec(self, output: OutputContext) -> Result<i32, ExpectedError> {
        let config = self.config_opts.make_config()?;

        let mut tests: Vec<TestIdentifier> = self
            .tests
            .iter()
            .map(|test| TestIdentifier::new(test.as_str()))
            .collect();
        if let Some(path) = &self.tests_from {
            tests.extend(read_test_list(path)?);
        }
        debug!("{} tests listed", tests.len());

        let code = StaticCodeSource::new(
            tests,
            config.class_path(),
            config.test_class_patterns().iter().cloned(),
        )?;
        let launch = config.launch_options_builder().build()?;
        let mut coverage = config.coverage_options_builder();
        coverage.add_filters(self.filters.iter().cloned());
        if output.verbose {
            coverage.set_verbose(true);
        }
        let coverage = coverage.build()?;

        let export_dir = self.export_dir.unwrap_or_else(|| config.export_dir());
        let exporter = MultiCoverageExporter::for_formats(&export_dir, config.export_formats());

        let mut builder = DefaultCoverageGeneratorBuilder::new(launch, coverage, Arc::new(code));
        builder
            .set_exporter(exporter)
            .set_show_progress(self.show_progress || config.show_progress());
        let mut generator = builder.build()?;

        let data = generator
            .calculate_coverage()
            .map_err(ExpectedError::from_coverage_error)?;
        info!(
            "gathered coverage for {} tests across {} classes, exported to {export_dir}",
            data.test_count(),
            data.covered_classes().len(),
        );
        Ok(CovgenExitCode::OK)
    }
}

/// Reads a test list: one test per line, ignoring blank lines and `#` comments.
fn read_test_list(path: &Utf8Path) -> Result<Vec<TestIdentifier>, ExpectedError> {
    let contents = std::fs::read_to_string(path).map_err(|err| ExpectedError::TestListRead {
        path: path.to_owned(),
        err,
    })?;
    Ok(parse_test_list(&contents))
}

fn parse_test_list(contents: &str) -> Vec<TestIdentifier> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(TestIdentifier::new)
        .collect()
}
