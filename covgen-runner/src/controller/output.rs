// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwarding worker stdout and stderr into the log.
//!
//! Worker output travels on its own pipes, separate from the result channel. Complete lines are
//! forwarded as they arrive: stderr at info level, stdout at debug level when verbose and
//! dropped otherwise. The last few stderr lines are kept for error messages.

use bytes::BytesMut;
use std::{collections::VecDeque, io, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{ChildStderr, ChildStdout},
};
use tracing::{debug, info};

/// The size of each buffered reader's buffer.
const CHUNK_SIZE: usize = 4 * 1024;

/// A line longer than this is forwarded in pieces.
const MAX_LINE_LEN: usize = 64 * 1024;

/// The number of stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 10;

/// A `BufReader` over an `AsyncRead` that tracks whether it is done.
pub(super) struct FusedBufReader<R> {
    reader: BufReader<R>,
    done: bool,
}

impl<R: AsyncRead + Unpin> FusedBufReader<R> {
    pub(super) fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(CHUNK_SIZE, reader),
            done: false,
        }
    }

    /// Appends available data to `acc`.
    ///
    /// Cancel-safe, since the underlying [`AsyncBufReadExt::fill_buf`] is cancel-safe.
    pub(super) async fn fill_buf(&mut self, acc: &mut BytesMut) -> Result<(), io::Error> {
        if self.done {
            return Ok(());
        }

        match self.reader.fill_buf().await {
            Ok(buf) => {
                acc.extend_from_slice(buf);
                if buf.is_empty() {
                    self.done = true;
                }
                let len = buf.len();
                self.reader.consume(len);
                Ok(())
            }
            Err(error) => {
                self.done = true;
                Err(error)
            }
        }
    }

    pub(super) fn is_done(&self) -> bool {
        self.done
    }
}

async fn fill_buf_opt<R: AsyncRead + Unpin>(
    reader: Option<&mut FusedBufReader<R>>,
    acc: &mut BytesMut,
) -> Result<(), io::Error> {
    match reader {
        Some(reader) => reader.fill_buf(acc).await,
        None => Ok(()),
    }
}

fn is_done_opt<R: AsyncRead + Unpin>(reader: Option<&FusedBufReader<R>>) -> bool {
    reader.is_none_or(|r| r.is_done())
}

#[derive(Copy, Clone, Debug)]
enum Stream {
    Stdout,
    Stderr,
}

/// Output accumulator for a worker process.
pub(super) struct WorkerOutput {
    stdout: Option<FusedBufReader<ChildStdout>>,
    stderr: Option<FusedBufReader<ChildStderr>>,
    stdout_buf: BytesMut,
    stderr_buf: BytesMut,
    verbose: bool,
    stderr_tail: VecDeque<String>,
}

impl WorkerOutput {
    pub(super) fn new(
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
        verbose: bool,
    ) -> Self {
        Self {
            stdout: stdout.map(FusedBufReader::new),
            stderr: stderr.map(FusedBufReader::new),
            stdout_buf: BytesMut::with_capacity(CHUNK_SIZE),
            stderr_buf: BytesMut::with_capacity(CHUNK_SIZE),
            verbose,
            stderr_tail: VecDeque::with_capacity(STDERR_TAIL_LINES),
        }
    }

    pub(super) fn is_done(&self) -> bool {
        is_done_opt(self.stdout.as_ref()) && is_done_opt(self.stderr.as_ref())
    }

    /// Reads whatever output is available and forwards complete lines.
    ///
    /// Cancel-safe: partial lines stay buffered in `self`.
    pub(super) async fn fill_buf(&mut self) {
        let stdout_done = is_done_opt(self.stdout.as_ref());
        let stderr_done = is_done_opt(self.stderr.as_ref());
        let stream = tokio::select! {
            res = fill_buf_opt(self.stdout.as_mut(), &mut self.stdout_buf), if !stdout_done => {
                if let Err(error) = res {
                    debug!("error reading worker stdout: {error}");
                }
                Stream::Stdout
            }
            res = fill_buf_opt(self.stderr.as_mut(), &mut self.stderr_buf), if !stderr_done => {
                if let Err(error) = res {
                    debug!("error reading worker stderr: {error}");
                }
                Stream::Stderr
            }
            else => return,
        };
        self.forward_lines(stream, false);
    }

    /// Reads output until both pipes close or `bound` elapses, then forwards what is left.
    pub(super) async fn drain(&mut self, bound: Duration) {
        let sleep = tokio::time::sleep(bound);
        tokio::pin!(sleep);
        while !self.is_done() {
            tokio::select! {
                () = self.fill_buf() => {}
                () = &mut sleep => break,
            }
        }
        self.forward_lines(Stream::Stdout, true);
        self.forward_lines(Stream::Stderr, true);
    }

    /// Returns the last few lines the worker wrote to stderr.
    pub(super) fn stderr_tail(&self) -> String {
        self.stderr_tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    fn forward_lines(&mut self, stream: Stream, flush: bool) {
        let buf = match stream {
            Stream::Stdout => &mut self.stdout_buf,
            Stream::Stderr => &mut self.stderr_buf,
        };

        let mut lines = Vec::new();
        loop {
            let end = match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => pos + 1,
                None if buf.len() >= MAX_LINE_LEN || (flush && !buf.is_empty()) => buf.len(),
                None => break,
            };
            let line = buf.split_to(end);
            let line = String::from_utf8_lossy(&line);
            lines.push(line.trim_end_matches(['\n', '\r']).to_owned());
        }

        for line in lines {
            match stream {
                Stream::Stdout => {
                    if self.verbose {
                        debug!("worker: {line}");
                    }
                }
                Stream::Stderr => {
                    info!("worker: {line}");
                    if self.stderr_tail.len() == STDERR_TAIL_LINES {
                        self.stderr_tail.pop_front();
                    }
                    self.stderr_tail.push_back(line);
                }
            }
        }
    }
}
