// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::output::WorkerOutput;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::debug;

// TODO: assign the worker to a job object so processes it spawns are torn down with it.
pub(super) fn set_process_group(_cmd: &mut Command) {}

pub(super) async fn terminate_child(
    child: &mut Child,
    _pgid: Option<u32>,
    _output: &mut WorkerOutput,
    _grace_period: Duration,
) {
    if child.id().is_none() {
        return;
    }
    if let Err(error) = child.start_kill() {
        debug!("error killing worker: {error}");
    }
    if let Err(error) = child.wait().await {
        debug!("error waiting for killed worker: {error}");
    }
}

pub(super) fn kill_process_group(_pgid: u32) {}
