// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{os, output::WorkerOutput};
use crate::{
    errors::{CoverageError, ProcessLaunchError, ProtocolError, WorkerAbortedError},
    options::{ClassPath, LaunchOptions, WorkerTimeouts},
    protocol::{Frame, FrameReader, write_message},
    worker::{AGENT_ENV, CLASS_PATH_ENV, PORT_ENV},
};
use covgen_metadata::{CoverageResult, TestIdentifier, WorkerArguments};
use debug_ignore::DebugIgnore;
use itertools::Itertools;
use std::{
    collections::HashSet,
    io,
    net::Ipv4Addr,
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    process::{Child, Command},
    runtime::Runtime,
    sync::watch,
    time::Instant,
};
use tracing::debug;

/// How long to keep reading worker output once the worker has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Requests cancellation of a coverage run in progress.
///
/// Cloneable and usable from any thread. Cancelling terminates the worker and fails the run with
/// [`WorkerAbortedError::Cancelled`].
#[derive(Clone, Debug)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Creates a new handle.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancels the run. Cancelling more than once has no further effect.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns true if the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    pub(crate) fn receiver(&self) -> CancelReceiver {
        CancelReceiver(self.sender.subscribe())
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub(crate) struct CancelReceiver(watch::Receiver<bool>);

impl CancelReceiver {
    /// Completes once cancellation is requested. Cancel-safe.
    async fn cancelled(&mut self) {
        if self.0.wait_for(|cancelled| *cancelled).await.is_err() {
            // Every handle was dropped without cancelling.
            std::future::pending::<()>().await;
        }
    }
}

/// Launches the worker process for a single coverage run.
#[derive(Debug)]
pub struct WorkerProcessController {
    launch: LaunchOptions,
    class_path: ClassPath,
    arguments: WorkerArguments,
}

impl WorkerProcessController {
    /// Creates a controller that will send `arguments` to the worker once it connects.
    pub fn new(launch: LaunchOptions, class_path: ClassPath, arguments: WorkerArguments) -> Self {
        Self {
            launch,
            class_path,
            arguments,
        }
    }

    /// Spawns the worker, waits for it to connect and sends it its arguments.
    ///
    /// Configuration problems are reported before anything is spawned. If the worker fails to
    /// connect, it is terminated and reaped before this returns.
    pub async fn start(&self, cancel: &CancelHandle) -> Result<WorkerProcessHandle, CoverageError> {
        let agent = self.launch.agent().locate()?;
        let class_path = self.class_path.to_env_value()?;
        let timeouts = *self.launch.timeouts();
        let mut cancel = cancel.receiver();

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(ProcessLaunchError::Bind)?;
        let port = listener
            .local_addr()
            .map_err(ProcessLaunchError::Bind)?
            .port();

        let mut cmd = Command::new(self.launch.program());
        cmd.args(self.launch.args())
            .current_dir(self.launch.working_dir())
            .envs(self.launch.env())
            .env(PORT_ENV, port.to_string())
            .env(CLASS_PATH_ENV, class_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(agent) = &agent {
            cmd.env(AGENT_ENV, agent);
        }
        os::set_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|err| ProcessLaunchError::Spawn {
            program: self.launch.program().to_owned(),
            err,
        })?;
        let pid = child.id();
        debug!(
            "spawned worker `{}` (pid {}), listening on port {port}",
            self.launch.program(),
            pid.map_or_else(|| "unknown".to_owned(), |pid| pid.to_string()),
        );

        let mut output =
            WorkerOutput::new(child.stdout.take(), child.stderr.take(), self.arguments.verbose);

        let connected = accept_worker(
            &listener,
            &mut child,
            &mut output,
            &mut cancel,
            &timeouts,
        )
        .await;
        drop(listener);
        let mut stream = match connected {
            Ok(stream) => stream,
            Err(error) => {
                shut_down(&mut child, pid, &mut output, timeouts.grace_period).await;
                return Err(error);
            }
        };

        let run_deadline = Instant::now() + timeouts.run;
        let sent = {
            let send = tokio::time::timeout_at(
                run_deadline,
                write_message(&mut stream, &self.arguments),
            );
            tokio::pin!(send);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break Err(WorkerAbortedError::Cancelled.into()),
                    res = &mut send => break match res {
                        Ok(res) => res.map_err(CoverageError::from),
                        Err(_) => Err(WorkerAbortedError::RunTimeout { timeout: timeouts.run }.into()),
                    },
                    () = output.fill_buf(), if !output.is_done() => {}
                }
            }
        };
        if let Err(error) = sent {
            shut_down(&mut child, pid, &mut output, timeouts.grace_period).await;
            return Err(error);
        }
        debug!("sent {} tests to worker", self.arguments.tests.len());

        Ok(WorkerProcessHandle {
            child,
            pid,
            reader: Some(FrameReader::new(stream)),
            output: DebugIgnore(output),
            timeouts,
            run_deadline,
            exit_status: None,
            pending: self.arguments.tests.iter().cloned().collect(),
            cancel,
            done: false,
        })
    }

    /// Like [`start`](Self::start), but drives `runtime` on the calling thread and returns a
    /// blocking iterator over results.
    pub fn start_blocking<'a>(
        &self,
        runtime: &'a Runtime,
        cancel: &CancelHandle,
    ) -> Result<ResultStream<'a>, CoverageError> {
        let handle = runtime.block_on(self.start(cancel))?;
        Ok(ResultStream { runtime, handle })
    }
}

async fn accept_worker(
    listener: &TcpListener,
    child: &mut Child,
    output: &mut WorkerOutput,
    cancel: &mut CancelReceiver,
    timeouts: &WorkerTimeouts,
) -> Result<TcpStream, CoverageError> {
    let connect_timeout = tokio::time::sleep(timeouts.connect);
    tokio::pin!(connect_timeout);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WorkerAbortedError::Cancelled.into()),
            res = listener.accept() => {
                let (stream, addr) = res.map_err(ProcessLaunchError::Accept)?;
                debug!("worker connected from {addr}");
                return Ok(stream);
            }
            res = child.wait() => {
                let status = res.map_err(ProcessLaunchError::Wait)?;
                output.drain(OUTPUT_DRAIN_TIMEOUT).await;
                return Err(ProcessLaunchError::ExitedBeforeConnect {
                    status,
                    stderr_tail: output.stderr_tail(),
                }
                .into());
            }
            () = output.fill_buf(), if !output.is_done() => {}
            () = &mut connect_timeout => {
                return Err(ProcessLaunchError::ConnectTimeout {
                    timeout: timeouts.connect,
                }
                .into());
            }
        }
    }
}

/// Terminates the worker along with anything it spawned and reaps it, then forwards whatever
/// output is left.
async fn shut_down(
    child: &mut Child,
    pgid: Option<u32>,
    output: &mut WorkerOutput,
    grace_period: Duration,
) {
    os::terminate_child(child, pgid, output, grace_period).await;
    output.drain(OUTPUT_DRAIN_TIMEOUT).await;
}

async fn read_frame_opt(
    reader: &mut Option<FrameReader<TcpStream>>,
) -> Result<Option<Frame>, ProtocolError> {
    match reader {
        Some(reader) => reader.read_frame().await,
        None => Ok(None),
    }
}

enum StreamEvent {
    Cancelled,
    Frame(Result<Option<Frame>, ProtocolError>),
    Exited(io::Result<ExitStatus>),
    RunTimeout,
}

/// A running worker process and its open result channel.
///
/// Dropping the handle before the run is over kills the worker.
#[derive(Debug)]
pub struct WorkerProcessHandle {
    child: Child,
    pid: Option<u32>,
    reader: Option<FrameReader<TcpStream>>,
    output: DebugIgnore<WorkerOutput>,
    timeouts: WorkerTimeouts,
    run_deadline: Instant,
    exit_status: Option<ExitStatus>,
    // Tests sent to the worker that have not reported a result yet.
    pending: HashSet<TestIdentifier>,
    cancel: CancelReceiver,
    done: bool,
}

impl WorkerProcessHandle {
    /// Returns the process ID of the worker, if it was available at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the exit status of the worker, once it has been observed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Returns the next result from the worker, in arrival order.
    ///
    /// Returns `Ok(None)` once the worker has closed the channel and exited successfully, having
    /// reported a result for every test it was sent. A clean finish with tests still unreported
    /// is [`WorkerAbortedError::MissingResults`]. On any error the worker is terminated and
    /// reaped before the error is returned, and every later call returns `Ok(None)`.
    ///
    /// Worker output is forwarded while waiting.
    pub async fn next_result(&mut self) -> Result<Option<CoverageResult>, CoverageError> {
        if self.done {
            return Ok(None);
        }

        let run_timeout = tokio::time::sleep_until(self.run_deadline);
        tokio::pin!(run_timeout);

        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => StreamEvent::Cancelled,
                res = read_frame_opt(&mut self.reader) => StreamEvent::Frame(res),
                res = self.child.wait(), if self.exit_status.is_none() => StreamEvent::Exited(res),
                () = self.output.fill_buf(), if !self.output.is_done() => continue,
                () = &mut run_timeout => StreamEvent::RunTimeout,
            };

            match event {
                StreamEvent::Cancelled => {
                    return Err(self.abort(WorkerAbortedError::Cancelled).await);
                }
                StreamEvent::Frame(Ok(Some(frame))) => {
                    return match frame.decode::<CoverageResult>() {
                        Ok(result) => {
                            self.pending.remove(&result.test);
                            Ok(Some(result))
                        }
                        Err(error) => Err(self.abort(error).await),
                    };
                }
                StreamEvent::Frame(Ok(None)) => {
                    debug!("worker closed the result channel");
                    self.reader = None;
                    self.wait_for_exit().await?;
                    if !self.pending.is_empty() {
                        let missing = self.pending.drain().sorted().collect();
                        return Err(WorkerAbortedError::MissingResults { missing }.into());
                    }
                    return Ok(None);
                }
                StreamEvent::Frame(Err(error)) => {
                    return Err(self.abort(error).await);
                }
                StreamEvent::Exited(Ok(status)) => {
                    // Results may still be buffered in the channel: keep reading until it closes.
                    debug!("worker exited with {status} while streaming results");
                    self.exit_status = Some(status);
                }
                StreamEvent::Exited(Err(error)) => {
                    return Err(self.abort(WorkerAbortedError::Wait(error)).await);
                }
                StreamEvent::RunTimeout => {
                    let timeout = self.timeouts.run;
                    return Err(self.abort(WorkerAbortedError::RunTimeout { timeout }).await);
                }
            }
        }
    }

    async fn wait_for_exit(&mut self) -> Result<(), CoverageError> {
        let status = match self.exit_status {
            Some(status) => status,
            None => {
                let exit_timeout = tokio::time::sleep(self.timeouts.exit);
                tokio::pin!(exit_timeout);
                loop {
                    let res = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => Err(WorkerAbortedError::Cancelled),
                        res = self.child.wait() => res.map_err(WorkerAbortedError::Wait),
                        () = self.output.fill_buf(), if !self.output.is_done() => continue,
                        () = &mut exit_timeout => Err(WorkerAbortedError::ExitTimeout {
                            timeout: self.timeouts.exit,
                        }),
                    };
                    match res {
                        Ok(status) => break status,
                        Err(error) => return Err(self.abort(error).await),
                    }
                }
            }
        };

        self.done = true;
        self.exit_status = Some(status);
        // Nothing the worker started outlives the run.
        if let Some(pgid) = self.pid {
            os::kill_process_group(pgid);
        }
        self.output.drain(OUTPUT_DRAIN_TIMEOUT).await;
        if status.success() {
            debug!("worker exited with {status}");
            Ok(())
        } else {
            Err(WorkerAbortedError::UnexpectedExit {
                status,
                stderr_tail: self.output.stderr_tail(),
            }
            .into())
        }
    }

    async fn abort(&mut self, error: impl Into<CoverageError>) -> CoverageError {
        let error = error.into();
        debug!("aborting coverage run: {error}");
        self.done = true;
        self.reader = None;
        shut_down(
            &mut self.child,
            self.pid,
            &mut self.output,
            self.timeouts.grace_period,
        )
        .await;
        error
    }
}

impl Drop for WorkerProcessHandle {
    fn drop(&mut self) {
        if self.child.id().is_some() || !self.done {
            debug!("killing worker still running at the end of the run");
            if let Some(pgid) = self.pid {
                os::kill_process_group(pgid);
            }
            _ = self.child.start_kill();
        }
    }
}

/// A blocking iterator over a worker's results, driven on the calling thread.
///
/// Yields results in arrival order, one at a time. After an error is yielded the worker has
/// been torn down and the iterator is exhausted.
#[derive(Debug)]
pub struct ResultStream<'a> {
    runtime: &'a Runtime,
    handle: WorkerProcessHandle,
}

impl ResultStream<'_> {
    /// Returns the underlying worker handle.
    pub fn handle(&self) -> &WorkerProcessHandle {
        &self.handle
    }
}

impl Iterator for ResultStream<'_> {
    type Item = Result<CoverageResult, CoverageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.handle.next_result()).transpose()
    }
}
