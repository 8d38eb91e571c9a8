use bytes::BytesMut;
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::gateway::environ::{BaseEnvironment, Environment};
use crate::http::framer;
use crate::http::parser::{ParseError, parse_request_head};
use crate::http::request::Request;
use crate::http::writer::{Flush, ResponseWriter};

const SEPARATOR_LEN: usize = 4;

/// Where a connection is in its single request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadingHeaders,
    ReadingBody,
    ReadyToDispatch,
    WritingResponse,
    Closing,
}

/// Readiness a connection should be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watch {
    Read,
    Write,
    None,
}

impl Phase {
    pub fn is_reading(self) -> bool {
        matches!(self, Phase::ReadingHeaders | Phase::ReadingBody)
    }

    pub fn watch(self) -> Watch {
        match self {
            Phase::ReadingHeaders | Phase::ReadingBody | Phase::ReadyToDispatch => Watch::Read,
            Phase::WritingResponse => Watch::Write,
            Phase::Closing => Watch::None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),

    #[error("{method} request without Content-Length")]
    MissingContentLength { method: String },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Per-connection state: one phase and one set of buffers.
///
/// The connection performs no I/O of its own; [`Connection::pump`] and
/// [`Connection::flush`] take the stream as an argument so the reactor keeps
/// ownership of the socket.
#[derive(Debug)]
pub struct Connection {
    phase: Phase,
    inbound: BytesMut,
    max_head_bytes: usize,
    request: Option<Request>,
    expected_len: Option<usize>,
    body: BytesMut,
    environ: Option<Environment>,
    writer: ResponseWriter,
}

impl Connection {
    pub fn new(max_head_bytes: usize) -> Self {
        Self {
            phase: Phase::ReadingHeaders,
            inbound: BytesMut::with_capacity(4096),
            max_head_bytes,
            request: None,
            expected_len: None,
            body: BytesMut::new(),
            environ: None,
            writer: ResponseWriter::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The parsed request, until it is handed to the environment builder.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Declared body length, known once the head is parsed.
    pub fn expected_len(&self) -> Option<usize> {
        self.expected_len
    }

    /// Body bytes buffered so far.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Response bytes still waiting for the socket.
    pub fn pending_output(&self) -> usize {
        self.writer.remaining()
    }

    /// Response bytes the socket has accepted so far.
    pub fn bytes_sent(&self) -> usize {
        self.writer.written()
    }

    /// Feeds freshly read bytes through the framer and drives the phase.
    ///
    /// Bytes arriving outside the reading phases are ignored. Any error moves
    /// the connection to `Closing`.
    pub fn on_bytes(&mut self, data: &[u8]) -> Result<Phase, ConnectionError> {
        match self.phase {
            Phase::ReadingHeaders => self.on_head_bytes(data),
            Phase::ReadingBody => {
                self.body.extend_from_slice(data);
                self.complete_body();
                Ok(self.phase)
            }
            _ => {
                tracing::trace!(bytes = data.len(), phase = ?self.phase, "ignoring bytes");
                Ok(self.phase)
            }
        }
    }

    fn on_head_bytes(&mut self, data: &[u8]) -> Result<Phase, ConnectionError> {
        let scanned = self.inbound.len();
        self.inbound.extend_from_slice(data);

        let end = match framer::find_head_end(&self.inbound, scanned) {
            Some(end) if end <= self.max_head_bytes => end,
            Some(_) => return Err(self.too_large()),
            None if self.inbound.len() > self.max_head_bytes + SEPARATOR_LEN => {
                return Err(self.too_large());
            }
            None => return Ok(self.phase),
        };

        let request = match parse_request_head(&self.inbound[..end]) {
            Ok(request) => request,
            Err(e) => return Err(self.abort(e.into())),
        };
        let body = self.inbound.split_off(end + SEPARATOR_LEN);
        self.inbound = BytesMut::new();

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            content_length = ?request.content_length,
            buffered = body.len(),
            "Request head complete"
        );

        if request.method.is_body_bearing() && request.content_length.is_none() {
            let method = request.method.to_string();
            return Err(self.abort(ConnectionError::MissingContentLength { method }));
        }

        self.expected_len = request.content_length;
        self.body = body;
        let body_bearing = request.method.is_body_bearing();
        self.request = Some(request);

        if body_bearing {
            self.complete_body();
        } else {
            self.ready();
        }
        Ok(self.phase)
    }

    /// Moves to `ReadyToDispatch` once the declared length is buffered,
    /// otherwise keeps (or starts) reading the body.
    fn complete_body(&mut self) {
        let expected = self.expected_len.unwrap_or(0);
        if self.body.len() >= expected {
            self.ready();
        } else {
            self.phase = Phase::ReadingBody;
        }
    }

    fn ready(&mut self) {
        self.body.truncate(self.expected_len.unwrap_or(0));
        self.phase = Phase::ReadyToDispatch;
    }

    fn too_large(&mut self) -> ConnectionError {
        let max_size = self.max_head_bytes;
        self.abort(ParseError::HeadTooLarge { max_size }.into())
    }

    fn abort(&mut self, err: ConnectionError) -> ConnectionError {
        self.close();
        err
    }

    /// Reads from `stream` until it would block or the reading phases end.
    /// A zero-length read means the peer closed and moves to `Closing`.
    pub fn pump<R: Read>(&mut self, stream: &mut R, scratch: &mut [u8]) -> Result<Phase, ConnectionError> {
        while self.phase.is_reading() {
            match stream.read(scratch) {
                Ok(0) => {
                    tracing::debug!(phase = ?self.phase, "peer closed while reading");
                    self.close();
                }
                Ok(n) => {
                    tracing::trace!(bytes = n, "read request bytes");
                    self.on_bytes(&scratch[..n])?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.abort(e.into())),
            }
        }

        Ok(self.phase)
    }

    /// Builds the environment for the buffered request. Only available in
    /// `ReadyToDispatch`; the request is consumed on the first call.
    pub fn prepare_dispatch(&mut self, base: &BaseEnvironment) -> Option<&Environment> {
        if self.phase != Phase::ReadyToDispatch {
            return None;
        }
        if self.environ.is_none() {
            let request = self.request.take()?;
            let body = std::mem::take(&mut self.body).freeze();
            self.environ = Some(Environment::build(base, request, body));
        }
        self.environ.as_ref()
    }

    /// Installs the assembled response and starts writing it.
    pub fn respond(&mut self, response: BytesMut) {
        self.environ = None;
        self.writer = ResponseWriter::new(response);
        self.phase = Phase::WritingResponse;
    }

    /// Sends buffered response bytes; `Closing` once everything is out.
    pub fn flush<W: Write>(&mut self, stream: &mut W) -> Result<Phase, ConnectionError> {
        if self.phase != Phase::WritingResponse {
            return Ok(self.phase);
        }
        match self.writer.write_to(stream) {
            Ok(Flush::Done) => {
                tracing::debug!(bytes = self.writer.written(), "Response sent");
                self.close();
            }
            Ok(Flush::Pending) => {}
            Err(e) => return Err(self.abort(e.into())),
        }
        Ok(self.phase)
    }

    pub fn close(&mut self) {
        self.phase = Phase::Closing;
    }
}
