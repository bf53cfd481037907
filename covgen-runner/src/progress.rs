// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A progress indicator shown while coverage is gathered.

use covgen_metadata::CoverageResult;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// A spinner on stderr that ticks once per coverage result.
///
/// When disabled, the spinner is hidden and every operation is a no-op.
#[derive(Debug)]
pub struct ProgressIndicator {
    bar: ProgressBar,
}

impl ProgressIndicator {
    /// Creates a new indicator for a run over `test_count` tests.
    pub fn new(enabled: bool, test_count: usize) -> Self {
        if !enabled {
            return Self::hidden();
        }

        let bar = ProgressBar::new(test_count as u64);
        // set_draw_target must be called before enable_steady_tick to avoid a spurious extra line.
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} [{elapsed_precise:>9}] {pos}/{len} coverage results: {wide_msg}")
                .expect("template is known to be valid"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Creates an indicator that never draws.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Records that a result arrived.
    pub fn on_result(&self, result: &CoverageResult) {
        self.bar.inc(1);
        self.bar.set_message(result.test.to_string());
    }

    /// Returns the number of results recorded.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Clears the indicator from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_indicator_still_counts() {
        let progress = ProgressIndicator::new(false, 2);
        progress.on_result(&CoverageResult::new("T1", 1, true, Vec::new()));
        progress.on_result(&CoverageResult::new("T2", 1, true, Vec::new()));
        assert_eq!(progress.position(), 2);
        progress.finish();
    }
}
