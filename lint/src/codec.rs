//! Line framing codec for analyzer communication.
//!
//! Every record, in both directions, is one line of JSON terminated by `\n`.
//! [`LineDecoder`] is the pure incremental part: it accepts arbitrary byte
//! chunks and yields zero or more complete frames per chunk. [`FrameReader`]
//! and [`FrameWriter`] wrap it around async streams.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Terminates every record on the wire.
pub const RECORD_SEPARATOR: u8 = b'\n';

/// Maximum unterminated frame size (4 MiB) to prevent unbounded memory allocation.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const READ_CHUNK_BYTES: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unterminated frame exceeds maximum {MAX_FRAME_BYTES} bytes")]
    FrameTooLarge,
    #[error("stream closed with {pending} bytes of an unterminated frame")]
    UnexpectedEof { pending: usize },
}

/// Accumulates raw bytes and splits them into separator-terminated frames.
///
/// A chunk boundary never implies a frame boundary.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to contain no separator.
    scanned: usize,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Remove and return the next complete frame, without its terminator.
    ///
    /// Returns `Ok(None)` when the buffer holds only a partial frame. A
    /// trailing `\r` is stripped so CRLF-writing analyzers decode the same.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        let unscanned = &self.buf[self.scanned..];
        match unscanned.iter().position(|b| *b == RECORD_SEPARATOR) {
            Some(rel) => {
                let end = self.scanned + rel;
                let mut frame: Vec<u8> = self.buf.drain(..=end).collect();
                frame.pop();
                if frame.last() == Some(&b'\r') {
                    frame.pop();
                }
                self.scanned = 0;
                Ok(Some(frame))
            }
            None if self.buf.len() > MAX_FRAME_BYTES => {
                self.buf.clear();
                self.scanned = 0;
                Err(CodecError::FrameTooLarge)
            }
            None => {
                self.scanned = self.buf.len();
                Ok(None)
            }
        }
    }

    /// Append a chunk and drain every frame it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
        self.push(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Bytes buffered for the frame in progress.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Reads separator-terminated frames from an async reader.
pub struct FrameReader<R> {
    reader: R,
    decoder: LineDecoder,
    chunk: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: LineDecoder::new(),
            chunk: vec![0u8; READ_CHUNK_BYTES].into_boxed_slice(),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on EOF at a frame boundary (clean shutdown).
    /// Returns `Err` on EOF mid-frame or oversized frames.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut self.chunk).await?;
            if read == 0 {
                let pending = self.decoder.pending();
                if pending == 0 {
                    return Ok(None);
                }
                return Err(CodecError::UnexpectedEof { pending });
            }
            self.decoder.push(&self.chunk[..read]);
        }
    }
}

/// Writes separator-terminated frames to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame followed by the separator, then flush.
    ///
    /// `payload` must not contain the separator; serialized JSON never does.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), CodecError> {
        debug_assert!(!payload.contains(&RECORD_SEPARATOR));
        self.writer.write_all(payload).await?;
        self.writer.write_all(&[RECORD_SEPARATOR]).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flush and close the stream so the peer observes EOF.
    pub async fn close(&mut self) -> Result<(), CodecError> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
