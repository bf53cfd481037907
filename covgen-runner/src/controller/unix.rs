// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::output::WorkerOutput;
use libc::{SIGKILL, SIGTERM};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::debug;

/// Puts the worker in a new process group led by itself, so that anything it spawns can be
/// signalled along with it.
pub(super) fn set_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

/// Terminates the worker's process group: SIGTERM, then SIGKILL once the grace period is over.
///
/// `pgid` is the worker's pid at spawn time. The group is killed even if the worker itself has
/// already exited, since processes it spawned may still be running. Returns once the worker has
/// been reaped.
pub(super) async fn terminate_child(
    child: &mut Child,
    pgid: Option<u32>,
    output: &mut WorkerOutput,
    grace_period: Duration,
) {
    let Some(pgid) = pgid else {
        // Spawned without a pid, so there is no group to signal.
        if let Err(error) = child.start_kill() {
            debug!("error killing worker: {error}");
        }
        if let Err(error) = child.wait().await {
            debug!("error waiting for killed worker: {error}");
        }
        return;
    };

    if child.id().is_some() && !grace_period.is_zero() {
        debug!("sending SIGTERM to worker process group {pgid}");
        signal_group(pgid, SIGTERM);

        let sleep = tokio::time::sleep(grace_period);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = output.fill_buf(), if !output.is_done() => {}
                _ = child.wait() => break,
                () = &mut sleep => break,
            }
        }
    }

    debug!("sending SIGKILL to worker process group {pgid}");
    kill_process_group(pgid);
    if let Err(error) = child.wait().await {
        debug!("error waiting for killed worker (pid {pgid}): {error}");
    }
}

/// Kills whatever is left of the worker's process group.
pub(super) fn kill_process_group(pgid: u32) {
    signal_group(pgid, SIGKILL);
}

fn signal_group(pgid: u32, signal: libc::c_int) {
    // A negative pid addresses the whole process group.
    // SAFETY: kill has no memory safety preconditions.
    unsafe { libc::kill(-(pgid as libc::pid_t), signal) };
}
