// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use covgen_metadata::TestIdentifier;
use covgen_runner::{
    code_source::StaticCodeSource,
    coverage::CoverageData,
    errors::CoverageError,
    export::JsonCoverageExporter,
    generator::{CoverageGenerator, DefaultCoverageGenerator, DefaultCoverageGeneratorBuilder},
    options::{
        ClassPath, CoverageOptions, CoverageOptionsBuilder, LaunchOptionsBuilder, WorkerTimeouts,
    },
};
use integration_tests::worker_script::{ReceivedRun, WorkerScript};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

pub(crate) const FAKE_WORKER: &str = env!("CARGO_BIN_EXE_fake-coverage-worker");
pub(crate) const COVGEN: &str = env!("CARGO_BIN_EXE_covgen-dup");

/// Timeouts short enough that misbehaving workers are dealt with quickly.
pub(crate) fn fast_timeouts() -> WorkerTimeouts {
    WorkerTimeouts {
        connect: Duration::from_secs(1),
        run: Duration::from_secs(30),
        exit: Duration::from_millis(500),
        grace_period: Duration::from_millis(200),
    }
}

pub(crate) fn default_coverage() -> CoverageOptions {
    CoverageOptionsBuilder::new()
        .build()
        .expect("coverage options are valid")
}

/// A fake worker and the scratch directory holding its script and outputs.
pub(crate) struct FakeWorker {
    dir: Utf8TempDir,
    script_path: Utf8PathBuf,
}

impl FakeWorker {
    pub(crate) fn new(mut script: WorkerScript) -> Self {
        let dir = Utf8TempDir::new().expect("temp dir created");
        script.pid_file = Some(dir.path().join("worker.pid"));
        script.received_file = Some(dir.path().join("received.json"));
        if let Some(orphan_pid_file) = &mut script.orphan_pid_file {
            *orphan_pid_file = dir.path().join(&*orphan_pid_file);
        }

        let script_path = dir.path().join("script.json");
        std::fs::write(
            &script_path,
            serde_json::to_string_pretty(&script).expect("script serializes"),
        )
        .expect("script written");
        Self { dir, script_path }
    }

    pub(crate) fn dir(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn script_path(&self) -> &Utf8Path {
        &self.script_path
    }

    pub(crate) fn launch_options_builder(&self) -> LaunchOptionsBuilder {
        let mut builder = LaunchOptionsBuilder::new(self.dir.path());
        builder
            .set_program(FAKE_WORKER)
            .set_args([self.script_path.as_str()])
            .set_timeouts(fast_timeouts());
        builder
    }

    /// Creates a generator over `tests` with these timeouts, exporting JSON to `export_dir`.
    pub(crate) fn generator(
        &self,
        tests: &[&str],
        coverage: CoverageOptions,
        timeouts: WorkerTimeouts,
        export_dir: &Utf8Path,
    ) -> DefaultCoverageGenerator {
        let code = StaticCodeSource::new(
            tests.iter().copied().map(TestIdentifier::new),
            ClassPath::new([self.dir.path().join("classes"), self.dir.path().join("lib.jar")]),
            ["*Test"],
        )
        .expect("patterns are valid");
        let launch = self
            .launch_options_builder()
            .set_timeouts(timeouts)
            .build()
            .expect("launch options are valid");

        let mut builder = DefaultCoverageGeneratorBuilder::new(launch, coverage, Arc::new(code));
        builder.set_exporter(JsonCoverageExporter::new(export_dir));
        builder.build().expect("runtime is created")
    }

    /// Runs a coverage run over `tests`, exporting JSON to `export_dir`.
    pub(crate) fn run(
        &self,
        tests: &[&str],
        coverage: CoverageOptions,
        export_dir: &Utf8Path,
    ) -> Result<CoverageData, CoverageError> {
        self.generator(tests, coverage, fast_timeouts(), export_dir)
            .calculate_coverage()
    }

    /// Runs over `tests` with default coverage options, exporting into the scratch directory.
    pub(crate) fn run_default(&self, tests: &[&str]) -> Result<CoverageData, CoverageError> {
        self.run(tests, default_coverage(), &self.export_dir())
    }

    pub(crate) fn export_dir(&self) -> Utf8PathBuf {
        self.dir.path().join("export")
    }

    pub(crate) fn exported_json(&self) -> String {
        std::fs::read_to_string(self.export_dir().join(JsonCoverageExporter::FILE_NAME))
            .expect("coverage was exported")
    }

    pub(crate) fn pid(&self) -> u32 {
        std::fs::read_to_string(self.dir.path().join("worker.pid"))
            .expect("worker wrote its pid")
            .trim()
            .parse()
            .expect("pid is a number")
    }

    /// Waits until the worker has received its arguments.
    pub(crate) fn wait_until_received(&self, timeout: Duration) {
        let received = self.dir.path().join("received.json");
        let start = Instant::now();
        while !received.exists() {
            assert!(
                start.elapsed() < timeout,
                "worker did not receive its arguments within {timeout:?}"
            );
            thread::sleep(Duration::from_millis(20));
        }
    }

    pub(crate) fn received(&self) -> ReceivedRun {
        let contents = std::fs::read_to_string(self.dir.path().join("received.json"))
            .expect("worker recorded what it received");
        serde_json::from_str(&contents).expect("received run parses")
    }
}

/// Returns true if a process with this ID exists. Reaped workers do not.
#[cfg(unix)]
pub(crate) fn is_process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for the existence of the process.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Like [`is_process_alive`], but zombies count as exited. Orphans are reparented and may not be
/// reaped promptly.
#[cfg(unix)]
pub(crate) fn is_process_running(pid: u32) -> bool {
    if !is_process_alive(pid) {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => {
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next());
            state != Some("Z")
        }
        Err(_) => true,
    }
}

/// Waits for a process that is not a child of the test to go away.
#[cfg(unix)]
pub(crate) fn assert_process_exits(pid: u32, timeout: Duration) {
    let start = Instant::now();
    while is_process_running(pid) {
        assert!(
            start.elapsed() < timeout,
            "process {pid} is still running after {timeout:?}"
        );
        thread::sleep(Duration::from_millis(20));
    }
}

pub(crate) fn assert_worker_gone(worker: &FakeWorker) {
    let pid = worker.pid();
    #[cfg(unix)]
    assert!(!is_process_alive(pid), "worker {pid} is still running");
    #[cfg(not(unix))]
    let _ = pid;
}
