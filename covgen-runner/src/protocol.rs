// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The framed result protocol spoken between the controller and a worker.
//!
//! Every message travels in a self-delimiting frame:
//!
//! ```text
//! +--------+------+-------+----------------+-----------------+
//! | magic  | kind | flags | payload length | payload (JSON)  |
//! | u16 BE | u8   | u8    | u32 BE         | length bytes    |
//! +--------+------+-------+----------------+-----------------+
//! ```
//!
//! The controller sends a single [`WorkerArguments`] frame. The worker answers with one
//! [`CoverageResult`] frame per executed test and then closes the connection. Closing the
//! connection on a frame boundary is a clean end of stream; closing it with part of a frame
//! buffered is a [`ProtocolError::Truncated`].

use crate::errors::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use covgen_metadata::{CoverageResult, WorkerArguments};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The magic number at the start of every frame.
pub const FRAME_MAGIC: u16 = 0xC07E;

/// The length of a frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// The largest payload accepted in a single frame.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// The kind of message carried by a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// [`WorkerArguments`], controller to worker.
    Arguments,

    /// [`CoverageResult`], worker to controller.
    CoverageResult,
}

impl MessageKind {
    fn to_u8(self) -> u8 {
        match self {
            Self::Arguments => 1,
            Self::CoverageResult => 2,
        }
    }

    fn from_u8(kind: u8) -> Option<Self> {
        match kind {
            1 => Some(Self::Arguments),
            2 => Some(Self::CoverageResult),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arguments => write!(f, "worker arguments"),
            Self::CoverageResult => write!(f, "coverage result"),
        }
    }
}

/// A message that can travel over the result channel.
pub trait Message: Serialize + DeserializeOwned {
    /// The kind written into the frame header.
    const KIND: MessageKind;
}

impl Message for WorkerArguments {
    const KIND: MessageKind = MessageKind::Arguments;
}

impl Message for CoverageResult {
    const KIND: MessageKind = MessageKind::CoverageResult;
}

/// Encodes a message into a complete frame.
pub fn encode_message<M: Message>(message: &M) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(message).map_err(|err| ProtocolError::Encode {
        kind: M::KIND,
        err,
    })?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u16(FRAME_MAGIC);
    buf.put_u8(M::KIND.to_u8());
    buf.put_u8(0);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// A single complete frame read off the channel.
#[derive(Clone, Debug)]
pub struct Frame {
    kind: MessageKind,
    payload: Bytes,
}

impl Frame {
    /// Returns the kind of message in this frame.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Decodes the payload as a message of type `M`.
    pub fn decode<M: Message>(&self) -> Result<M, ProtocolError> {
        if self.kind != M::KIND {
            return Err(ProtocolError::UnexpectedKind {
                expected: M::KIND,
                found: self.kind,
            });
        }
        serde_json::from_slice(&self.payload).map_err(|err| ProtocolError::Malformed {
            kind: self.kind,
            err,
        })
    }
}

/// Splits the next complete frame off the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet hold a complete frame. The header is validated as
/// soon as it is available, so a corrupt stream is rejected without waiting for its payload.
pub(crate) fn decode_frame(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let mut header = &buf[..HEADER_LEN];
    let magic = header.get_u16();
    if magic != FRAME_MAGIC {
        return Err(ProtocolError::BadMagic { found: magic });
    }
    let raw_kind = header.get_u8();
    let kind =
        MessageKind::from_u8(raw_kind).ok_or(ProtocolError::UnknownKind { kind: raw_kind })?;
    let flags = header.get_u8();
    if flags != 0 {
        return Err(ProtocolError::UnsupportedFlags { flags });
    }
    let len = header.get_u32() as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let frame_len = HEADER_LEN + len;
    if buf.len() < frame_len {
        buf.reserve(frame_len - buf.len());
        return Ok(None);
    }

    buf.advance(HEADER_LEN);
    let payload = buf.split_to(len).freeze();
    Ok(Some(Frame { kind, payload }))
}

/// Like [`decode_frame`], but called once the underlying stream has reached EOF.
///
/// Leftover bytes that do not form a complete frame mean the stream was truncated.
pub(crate) fn decode_frame_eof(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    match decode_frame(buf)? {
        Some(frame) => Ok(Some(frame)),
        None if buf.is_empty() => Ok(None),
        None => Err(ProtocolError::Truncated {
            buffered: buf.len(),
        }),
    }
}

/// Reads frames off an async byte stream.
#[derive(Debug)]
pub(crate) struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(4 * 1024),
            eof: false,
        }
    }

    /// Reads the next frame, or `None` on a clean end of stream.
    ///
    /// This operation is cancel-safe: partially read frames stay buffered in `self`, and the
    /// underlying [`AsyncReadExt::read_buf`] is cancel-safe.
    pub(crate) async fn read_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            if self.eof {
                return decode_frame_eof(&mut self.buf);
            }
            if let Some(frame) = decode_frame(&mut self.buf)? {
                return Ok(Some(frame));
            }
            let n = self
                .reader
                .read_buf(&mut self.buf)
                .await
                .map_err(ProtocolError::Read)?;
            if n == 0 {
                self.eof = true;
            }
        }
    }
}

/// Writes a single message as a frame and flushes it.
pub(crate) async fn write_message<W, M>(writer: &mut W, message: &M) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let frame = encode_message(message)?;
    writer.write_all(&frame).await.map_err(ProtocolError::Write)?;
    writer.flush().await.map_err(ProtocolError::Write)
}
