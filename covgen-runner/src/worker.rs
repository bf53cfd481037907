// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker side of the result channel.
//!
//! A worker is launched by the controller with [`PORT_ENV`] set. It connects back, receives its
//! [`WorkerArguments`], runs each test, streams one [`CoverageResult`] per test and closes the
//! connection with [`WorkerConnection::finish`]. It should then exit with status 0: test
//! failures travel in-stream and are never signalled through the exit status.
//!
//! The client is blocking, since a worker has nothing else to do while it waits on the
//! controller.

use crate::{
    errors::{ProtocolError, WorkerClientError},
    protocol::{decode_frame, decode_frame_eof, encode_message},
};
use bytes::BytesMut;
use covgen_metadata::{CoverageResult, WorkerArguments};
use std::{
    io::{Read, Write},
    net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream},
};
use tracing::debug;

/// The environment variable holding the port the controller listens on.
pub const PORT_ENV: &str = "COVGEN_PORT";

/// The environment variable holding the class path, joined with the platform separator.
pub const CLASS_PATH_ENV: &str = "COVGEN_CLASS_PATH";

/// The environment variable holding the instrumentation agent location, if any.
pub const AGENT_ENV: &str = "COVGEN_AGENT";

/// A worker's connection to the controller.
#[derive(Debug)]
pub struct WorkerConnection {
    stream: TcpStream,
    buf: BytesMut,
}

impl WorkerConnection {
    /// Connects to the controller on the port in [`PORT_ENV`].
    pub fn from_env() -> Result<Self, WorkerClientError> {
        let value = std::env::var(PORT_ENV)
            .map_err(|_| WorkerClientError::MissingPort { var: PORT_ENV })?;
        let port = value.parse().map_err(|_| WorkerClientError::InvalidPort {
            var: PORT_ENV,
            value,
        })?;
        Self::connect(port)
    }

    /// Connects to a controller listening on the loopback interface.
    pub fn connect(port: u16) -> Result<Self, WorkerClientError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let stream =
            TcpStream::connect(addr).map_err(|err| WorkerClientError::Connect { port, err })?;
        debug!("connected to controller on port {port}");
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4 * 1024),
        })
    }

    /// Receives the arguments for this run.
    pub fn receive_arguments(&mut self) -> Result<WorkerArguments, WorkerClientError> {
        let mut chunk = [0u8; 4 * 1024];
        loop {
            if let Some(frame) = decode_frame(&mut self.buf)? {
                return Ok(frame.decode()?);
            }
            let n = self
                .stream
                .read(&mut chunk)
                .map_err(ProtocolError::Read)?;
            if n == 0 {
                return match decode_frame_eof(&mut self.buf)? {
                    Some(frame) => Ok(frame.decode()?),
                    None => Err(WorkerClientError::ConnectionClosed),
                };
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Sends the result for a single test.
    pub fn send_result(&mut self, result: &CoverageResult) -> Result<(), WorkerClientError> {
        let frame = encode_message(result)?;
        self.stream
            .write_all(&frame)
            .map_err(ProtocolError::Write)?;
        Ok(())
    }

    /// Flushes and closes the connection, signalling that every result has been sent.
    pub fn finish(mut self) -> Result<(), WorkerClientError> {
        self.stream.flush().map_err(ProtocolError::Write)?;
        self.stream
            .shutdown(Shutdown::Both)
            .map_err(ProtocolError::Write)?;
        Ok(())
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covgen_metadata::ClassLine;
    use std::{net::TcpListener, thread};

    #[test]
    fn round_trip_over_loopback() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind succeeds");
        let port = listener.local_addr().unwrap().port();

        let controller = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept succeeds");
            let args = WorkerArguments {
                tests: vec!["T1".into()],
                max_dependency_distance: Some(2),
                verbose: false,
            };
            stream
                .write_all(&encode_message(&args).unwrap())
                .expect("write succeeds");

            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes).expect("read succeeds");
            let mut buf = BytesMut::from(&bytes[..]);
            let mut results = Vec::new();
            while let Some(frame) = decode_frame_eof(&mut buf).expect("stream is valid") {
                results.push(frame.decode::<CoverageResult>().expect("payload is valid"));
            }
            results
        });

        let mut conn = WorkerConnection::connect(port).expect("connect succeeds");
        let args = conn.receive_arguments().expect("arguments arrive");
        assert_eq!(args.tests, vec!["T1".into()]);
        assert_eq!(args.max_dependency_distance, Some(2));

        let result = CoverageResult::new("T1", 3, true, [ClassLine::new("A", 10)]);
        conn.send_result(&result).expect("send succeeds");
        conn.finish().expect("finish succeeds");

        let received = controller.join().expect("controller thread completes");
        assert_eq!(received, vec![result]);
    }

    #[test]
    fn controller_closing_early_is_reported() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind succeeds");
        let port = listener.local_addr().unwrap().port();
        let controller = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept succeeds");
            drop(stream);
        });

        let mut conn = WorkerConnection::connect(port).expect("connect succeeds");
        controller.join().expect("controller thread completes");
        assert!(matches!(
            conn.receive_arguments(),
            Err(WorkerClientError::ConnectionClosed)
        ));
    }
}
