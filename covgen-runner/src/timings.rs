// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-stage timings for a coverage run.

use crate::time::{StopwatchSnapshot, StopwatchStart, stopwatch};
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use std::{collections::HashMap, fmt, time::Duration};
use tracing::debug;

/// A stage of a coverage run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Enumerating the tests in scope.
    ScanClassPath,

    /// Running the worker and aggregating its results.
    Coverage,

    /// Exporting the snapshot.
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanClassPath => write!(f, "scan class path"),
            Self::Coverage => write!(f, "coverage and dependency analysis"),
            Self::Export => write!(f, "export"),
        }
    }
}

/// How long a finished stage took.
#[derive(Copy, Clone, Debug)]
pub struct StageTiming {
    /// When the stage started.
    pub start_time: DateTime<Local>,

    /// How long the stage took.
    pub duration: Duration,
}

impl From<StopwatchSnapshot> for StageTiming {
    fn from(snapshot: StopwatchSnapshot) -> Self {
        Self {
            start_time: snapshot.start_time,
            duration: snapshot.duration,
        }
    }
}

/// Records when stages start and end.
#[derive(Debug, Default)]
pub struct Timings {
    running: HashMap<Stage, StopwatchStart>,
    finished: IndexMap<Stage, StageTiming>,
}

impl Timings {
    /// Creates an empty set of timings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a stage.
    pub fn register_start(&mut self, stage: Stage) {
        self.running.insert(stage, stopwatch());
    }

    /// Marks the end of a stage, returning how long it took.
    ///
    /// Returns `None` if the stage was never started.
    pub fn register_end(&mut self, stage: Stage) -> Option<Duration> {
        let snapshot = self.running.remove(&stage)?.snapshot();
        debug!(
            "stage `{stage}` finished at {} after {}",
            snapshot.end_time().format("%H:%M:%S%.3f"),
            DisplayDuration(snapshot.duration),
        );
        let timing = StageTiming::from(snapshot);
        self.finished.insert(stage, timing);
        Some(timing.duration)
    }

    /// Returns the timing of a finished stage.
    pub fn get(&self, stage: Stage) -> Option<&StageTiming> {
        self.finished.get(&stage)
    }

    /// Iterates over finished stages, in the order they finished.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageTiming)> + '_ {
        self.finished.iter().map(|(stage, timing)| (*stage, timing))
    }

    /// Returns the total time spent in finished stages.
    pub fn total(&self) -> Duration {
        self.finished.values().map(|timing| timing.duration).sum()
    }
}

impl fmt::Display for Timings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (stage, timing) in self.iter() {
            writeln!(f, "> {stage} : {}", DisplayDuration(timing.duration))?;
        }
        write!(f, "> total : {}", DisplayDuration(self.total()))
    }
}

/// Displays a duration rounded to milliseconds.
pub(crate) struct DisplayDuration(pub(crate) Duration);

impl fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = Duration::from_millis(self.0.as_millis() as u64);
        if millis.is_zero() {
            write!(f, "0ms")
        } else {
            write!(f, "{}", humantime::format_duration(millis))
        }
    }
}
