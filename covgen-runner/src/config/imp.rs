// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ConfigParseError,
    export::ExportFormat,
    options::{
        ClassPath, CoverageOptionsBuilder, KnownLocationAgent, LaunchOptionsBuilder,
        WorkerTimeouts,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};
use tracing::warn;

/// Overall configuration for covgen.
#[derive(Clone, Debug)]
pub struct CovgenConfig {
    workspace_root: Utf8PathBuf,
    inner: CovgenConfigDeserialize,
}

impl CovgenConfig {
    /// The default location of the config within the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/covgen.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the covgen config from the given file, or if not specified from
    /// `.config/covgen.toml` in the workspace root.
    ///
    /// If no config file is specified and the workspace root doesn't have `.config/covgen.toml`,
    /// uses the default config options.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&builder, &config_file)
            .map_err(|err| ConfigParseError::new(&config_file, err))?;

        Ok(Self {
            workspace_root,
            inner,
        })
    }

    /// Returns the default covgen config.
    #[cfg(test)]
    pub(crate) fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let inner = Self::build_and_deserialize_config(
            &Self::make_default_config(),
            Utf8Path::new("<default config>"),
        )
        .expect("default config is always valid");
        Self {
            workspace_root: workspace_root.into(),
            inner,
        }
    }

    /// Returns the workspace root relative paths are resolved against.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns a launch options builder populated from the `[worker]` section.
    pub fn launch_options_builder(&self) -> LaunchOptionsBuilder {
        let worker = &self.inner.worker;
        let mut builder = LaunchOptionsBuilder::new(self.resolve(&worker.working_dir));
        if let Some(program) = &worker.program {
            builder.set_program(self.resolve_program(program));
        }
        builder.set_args(worker.args.iter().cloned());
        if let Some(agent) = &worker.agent {
            builder.set_agent(KnownLocationAgent::new(self.resolve(agent)));
        }
        for (key, value) in &worker.env {
            builder.set_env(key, value);
        }
        builder.set_timeouts(WorkerTimeouts {
            connect: worker.connect_timeout,
            run: worker.run_timeout,
            exit: worker.exit_timeout,
            grace_period: worker.grace_period,
        });
        builder
    }

    /// Returns a coverage options builder populated from the `[tests]` and `[output]` sections.
    pub fn coverage_options_builder(&self) -> CoverageOptionsBuilder {
        let mut builder = CoverageOptionsBuilder::new();
        builder
            .add_filters(self.inner.tests.filter.iter().cloned())
            .set_max_dependency_distance(self.inner.tests.max_dependency_distance)
            .set_verbose(self.inner.output.verbose);
        builder
    }

    /// Returns the configured class path, with relative elements resolved.
    pub fn class_path(&self) -> ClassPath {
        self.inner
            .worker
            .class_path
            .iter()
            .map(|element| self.resolve(element))
            .collect()
    }

    /// Returns the glob patterns identifying test classes.
    pub fn test_class_patterns(&self) -> &[String] {
        &self.inner.tests.test_class_patterns
    }

    /// Returns the directory coverage is exported to.
    pub fn export_dir(&self) -> Utf8PathBuf {
        self.resolve(&self.inner.export.dir)
    }

    /// Returns the formats coverage is exported in.
    pub fn export_formats(&self) -> &[ExportFormat] {
        &self.inner.export.formats
    }

    /// Returns true if worker output should be shown.
    pub fn verbose(&self) -> bool {
        self.inner.output.verbose
    }

    /// Returns true if a progress indicator should be shown.
    pub fn show_progress(&self) -> bool {
        self.inner.output.show_progress
    }

    // ---
    // Helper methods
    // ---

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.workspace_root.join(path)
        }
    }

    // A bare program name is looked up on PATH, so only paths with a directory part are resolved.
    fn resolve_program(&self, program: &Utf8Path) -> Utf8PathBuf {
        if program.components().count() > 1 {
            self.resolve(program)
        } else {
            program.to_owned()
        }
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
        config_file: &Utf8Path,
    ) -> Result<CovgenConfigDeserialize, ConfigError> {
        let config = builder.build_cloned()?;

        let mut ignored = Vec::new();
        let deserialized: CovgenConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                ignored.push(path.to_string());
            })?;

        for key in ignored {
            warn!("ignoring unknown configuration key `{key}` in {config_file}");
        }
        Ok(deserialized)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CovgenConfigDeserialize {
    worker: WorkerConfig,
    tests: TestsConfig,
    export: ExportConfig,
    output: OutputConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct WorkerConfig {
    #[serde(default)]
    program: Option<Utf8PathBuf>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    agent: Option<Utf8PathBuf>,
    #[serde(default)]
    class_path: Vec<Utf8PathBuf>,
    working_dir: Utf8PathBuf,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(with = "humantime_serde")]
    connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    run_timeout: Duration,
    #[serde(with = "humantime_serde")]
    exit_timeout: Duration,
    #[serde(with = "humantime_serde")]
    grace_period: Duration,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TestsConfig {
    #[serde(default)]
    filter: Vec<String>,
    #[serde(default)]
    test_class_patterns: Vec<String>,
    #[serde(default)]
    max_dependency_distance: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ExportConfig {
    dir: Utf8PathBuf,
    #[serde(default)]
    formats: Vec<ExportFormat>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct OutputConfig {
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    show_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigurationError;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn write_config(dir: &Utf8TempDir, contents: &str) {
        let path = dir.path().join(CovgenConfig::CONFIG_PATH);
        std::fs::create_dir_all(path.parent().expect("config path has a parent"))
            .expect("config dir created");
        std::fs::write(&path, contents).expect("config written");
    }

    #[test]
    fn default_config_is_valid() {
        let config = CovgenConfig::default_config("/ws");
        assert_eq!(config.test_class_patterns(), ["*Test", "*Tests"]);
        assert_eq!(config.export_dir(), "/ws/target/covgen");
        assert_eq!(config.export_formats(), [ExportFormat::Json]);
        assert!(config.class_path().is_empty());
        assert!(!config.verbose());
        assert!(!config.show_progress());

        // No worker program is configured by default.
        let err = config
            .launch_options_builder()
            .build()
            .expect_err("program is missing");
        assert!(matches!(err, ConfigurationError::MissingProgram));
    }

    #[test]
    fn repository_config_is_layered_over_defaults() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        write_config(
            &dir,
            indoc! {r#"
                [worker]
                program = "bin/worker"
                args = ["--mode", "coverage"]
                class-path = ["target/classes", "/opt/lib/dep.jar", "target/classes"]
                run-timeout = "30m"

                [worker.env]
                worker-log = "debug"

                [tests]
                filter = ["com.example.*"]
                max-dependency-distance = 3

                [export]
                formats = ["json", "junit"]

                [output]
                verbose = true
            "#},
        );

        let config = CovgenConfig::from_sources(dir.path(), None).expect("config is valid");
        assert_eq!(
            config.class_path().iter().map(|p| p.to_owned()).collect::<Vec<_>>(),
            vec![dir.path().join("target/classes"), "/opt/lib/dep.jar".into()]
        );
        assert_eq!(
            config.export_formats(),
            [ExportFormat::Json, ExportFormat::Junit]
        );
        assert!(config.verbose());

        let launch = config
            .launch_options_builder()
            .build()
            .expect("launch options are valid");
        assert_eq!(launch.program(), dir.path().join("bin/worker"));
        assert_eq!(launch.args(), ["--mode", "coverage"]);
        assert_eq!(launch.working_dir(), dir.path().join("."));
        assert_eq!(launch.timeouts().run, Duration::from_secs(30 * 60));
        assert_eq!(launch.timeouts().connect, Duration::from_secs(10));
        assert_eq!(
            launch.env().get("worker-log").map(String::as_str),
            Some("debug")
        );

        let coverage = config
            .coverage_options_builder()
            .build()
            .expect("coverage options are valid");
        assert_eq!(coverage.test_filter().patterns(), ["com.example.*"]);
        assert_eq!(coverage.max_dependency_distance(), Some(3));
        assert!(coverage.verbose());
    }

    #[test]
    fn bare_program_names_are_not_resolved() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        write_config(
            &dir,
            indoc! {r#"
                [worker]
                program = "coverage-worker"
            "#},
        );
        let config = CovgenConfig::from_sources(dir.path(), None).expect("config is valid");
        let launch = config
            .launch_options_builder()
            .build()
            .expect("launch options are valid");
        assert_eq!(launch.program().as_str(), "coverage-worker");
    }

    #[test]
    fn invalid_duration_is_a_parse_error() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        write_config(
            &dir,
            indoc! {r#"
                [worker]
                connect-timeout = "soon"
            "#},
        );
        let err = CovgenConfig::from_sources(dir.path(), None).expect_err("duration is invalid");
        assert_eq!(
            err.config_file(),
            &dir.path().join(CovgenConfig::CONFIG_PATH)
        );
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        let missing = dir.path().join("missing.toml");
        let err = CovgenConfig::from_sources(dir.path(), Some(&missing))
            .expect_err("config file is missing");
        assert_eq!(err.config_file(), &missing);
    }
}
