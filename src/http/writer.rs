use bytes::{Buf, BytesMut};
use std::io::{self, Write};

/// What a flush attempt achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Every buffered byte has been handed to the socket.
    Done,
    /// The socket stopped accepting bytes; wait for the next write-readiness.
    Pending,
}

/// Response bytes not yet accepted by the peer's socket.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    buffer: BytesMut,
    written: usize,
}

impl ResponseWriter {
    pub fn new(buffer: BytesMut) -> Self {
        Self { buffer, written: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes sent so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Writes as much of the buffer as `stream` accepts, trimming the sent
    /// prefix. Stops at `WouldBlock` and reports `Pending`.
    ///
    /// A zero-length write means the peer can no longer receive and is
    /// reported as `WriteZero`.
    pub fn write_to<W: Write>(&mut self, stream: &mut W) -> io::Result<Flush> {
        while !self.buffer.is_empty() {
            match stream.write(&self.buffer) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => {
                    self.buffer.advance(n);
                    self.written += n;
                    tracing::trace!(bytes = n, remaining = self.buffer.len(), "wrote response bytes");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Flush::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(Flush::Done)
    }
}
