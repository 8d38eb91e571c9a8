use crate::gateway::app::{Application, Body};
use crate::gateway::environ::Environment;
use crate::gateway::error::GatewayError;
use crate::http::response::ResponseHead;
use bytes::{BufMut, BytesMut};
use std::io::{self, Write};

/// Response-start handle passed to applications, owning the response
/// accumulator for one request.
///
/// The recorded head is written into the accumulator (committed) on the
/// first non-empty body write, or when the invoker finishes. Every check runs
/// against this live state.
#[derive(Debug, Default)]
pub struct StartResponse {
    head: Option<ResponseHead>,
    committed: bool,
    buffer: BytesMut,
}

/// Write function returned by [`StartResponse::start`].
#[derive(Debug)]
pub struct BodyWriter<'a> {
    response: &'a mut StartResponse,
}

impl StartResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the status line and headers.
    ///
    /// A second call without `exc_info` fails with
    /// [`GatewayError::AlreadyStarted`]. With `exc_info`, a head that has not
    /// been committed yet is replaced; once committed, the supplied error is
    /// handed back as [`GatewayError::Reraised`].
    pub fn start<I, K, V>(
        &mut self,
        status: impl Into<String>,
        headers: I,
        exc_info: Option<anyhow::Error>,
    ) -> Result<BodyWriter<'_>, GatewayError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        match exc_info {
            Some(err) if self.committed => return Err(GatewayError::Reraised(err)),
            Some(err) => {
                tracing::debug!(error = %err, "replacing uncommitted response head");
            }
            None if self.head.is_some() => return Err(GatewayError::AlreadyStarted),
            None => {}
        }

        let head = ResponseHead::new(
            status,
            headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        validate(&head)?;
        self.head = Some(head);

        Ok(BodyWriter { response: self })
    }

    /// Whether the head has been written into the accumulator.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    /// Appends body bytes, committing the head first if needed.
    pub fn write(&mut self, data: &[u8]) -> Result<(), GatewayError> {
        if data.is_empty() {
            return Ok(());
        }
        self.commit()?;
        self.buffer.put_slice(data);
        Ok(())
    }

    /// Commits the head if nothing did so yet and returns the complete
    /// response bytes.
    pub fn finish(mut self) -> Result<BytesMut, GatewayError> {
        self.commit()?;
        Ok(self.buffer)
    }

    fn commit(&mut self) -> Result<(), GatewayError> {
        if self.committed {
            return Ok(());
        }
        let head = self.head.as_ref().ok_or(GatewayError::NotStarted)?;
        head.write_preamble(&mut self.buffer);
        self.committed = true;
        Ok(())
    }
}

impl BodyWriter<'_> {
    pub fn write(&mut self, data: &[u8]) -> Result<(), GatewayError> {
        self.response.write(data)
    }
}

impl io::Write for BodyWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.response.write(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn validate(head: &ResponseHead) -> Result<(), GatewayError> {
    if head.code().is_none() || has_line_break(&head.status) {
        return Err(GatewayError::InvalidStatus {
            status: head.status.clone(),
        });
    }
    for (name, value) in &head.headers {
        let bad_name = name.is_empty() || name.bytes().any(|b| !b.is_ascii_graphic() || b == b':');
        if bad_name || has_line_break(value) {
            return Err(GatewayError::InvalidHeader { name: name.clone() });
        }
    }
    Ok(())
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

/// Calls `close` on the body when dropped, so it runs on every exit path.
struct Release(Body);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Runs the application once and assembles the full response bytes.
///
/// Non-empty chunks are appended in order. The body's close hook runs after
/// iteration completes, fails, or panics. Errors from the application, its
/// body, or a [`GatewayError`] are returned unchanged; callers can
/// `downcast_ref::<GatewayError>()` to tell protocol violations apart.
/// Whatever the application left unterminated on its error stream is
/// flushed once it is done.
pub fn invoke<A>(app: &A, environ: &Environment) -> anyhow::Result<BytesMut>
where
    A: Application + ?Sized,
{
    let response = run(app, environ);
    if let Err(e) = (&environ.errors).flush() {
        tracing::debug!(error = %e, "failed to flush application error stream");
    }
    response
}

fn run<A>(app: &A, environ: &Environment) -> anyhow::Result<BytesMut>
where
    A: Application + ?Sized,
{
    let mut start_response = StartResponse::new();
    let body = app.call(environ, &mut start_response)?;

    {
        let mut body = Release(body);
        while let Some(chunk) = body.0.next_chunk() {
            let chunk = chunk?;
            if !chunk.is_empty() {
                start_response.write(&chunk)?;
            }
        }
    }

    Ok(start_response.finish()?)
}
