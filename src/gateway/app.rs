//! The application callback contract.
//!
//! An [`Application`] receives the request [`Environment`] and a
//! [`StartResponse`]. It must start the response exactly once and return a
//! [`Body`] producing the response chunks. The body is drained once, in
//! order, and its [`ResponseBody::close`] hook always runs afterwards.

use crate::gateway::environ::Environment;
use crate::gateway::invoker::StartResponse;
use bytes::Bytes;

/// Boxed body producer returned by applications.
pub type Body = Box<dyn ResponseBody>;

pub trait Application {
    fn call(&self, environ: &Environment, start_response: &mut StartResponse) -> anyhow::Result<Body>;
}

/// A finite, lazily evaluated sequence of response chunks.
pub trait ResponseBody {
    /// The next chunk, `None` once exhausted. Empty chunks are allowed and
    /// skipped by the invoker.
    fn next_chunk(&mut self) -> Option<anyhow::Result<Bytes>>;

    /// Releases resources held by the producer. Called exactly once, after
    /// iteration finishes or fails.
    fn close(&mut self) {}
}

impl<B: ResponseBody + ?Sized> ResponseBody for Box<B> {
    fn next_chunk(&mut self) -> Option<anyhow::Result<Bytes>> {
        (**self).next_chunk()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Body over an infallible iterator of byte-like chunks.
#[derive(Debug)]
pub struct Chunks<I> {
    iter: I,
}

impl<I> ResponseBody for Chunks<I>
where
    I: Iterator,
    I::Item: Into<Bytes>,
{
    fn next_chunk(&mut self) -> Option<anyhow::Result<Bytes>> {
        self.iter.next().map(|chunk| Ok(chunk.into()))
    }
}

/// Body over an iterator whose chunks may fail.
#[derive(Debug)]
pub struct TryChunks<I> {
    iter: I,
}

impl<I, T> ResponseBody for TryChunks<I>
where
    I: Iterator<Item = anyhow::Result<T>>,
    T: Into<Bytes>,
{
    fn next_chunk(&mut self) -> Option<anyhow::Result<Bytes>> {
        self.iter.next().map(|chunk| chunk.map(Into::into))
    }
}

/// Wraps a body with an extra release hook, run after the inner body's own
/// `close`.
pub struct OnClose<B, F> {
    inner: B,
    release: Option<F>,
}

impl<B: ResponseBody, F: FnOnce()> ResponseBody for OnClose<B, F> {
    fn next_chunk(&mut self) -> Option<anyhow::Result<Bytes>> {
        self.inner.next_chunk()
    }

    fn close(&mut self) {
        self.inner.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

pub trait ResponseBodyExt: ResponseBody + Sized {
    fn on_close<F: FnOnce()>(self, release: F) -> OnClose<Self, F> {
        OnClose {
            inner: self,
            release: Some(release),
        }
    }
}

impl<B: ResponseBody> ResponseBodyExt for B {}

pub fn chunks<I>(iter: I) -> Body
where
    I: IntoIterator,
    I::IntoIter: 'static,
    I::Item: Into<Bytes>,
{
    Box::new(Chunks {
        iter: iter.into_iter(),
    })
}

pub fn try_chunks<I, T>(iter: I) -> Body
where
    I: IntoIterator<Item = anyhow::Result<T>>,
    I::IntoIter: 'static,
    T: Into<Bytes>,
{
    Box::new(TryChunks {
        iter: iter.into_iter(),
    })
}

/// Application backed by a closure.
#[derive(Debug, Clone)]
pub struct FnApp<F>(F);

pub fn from_fn<F>(f: F) -> FnApp<F>
where
    F: Fn(&Environment, &mut StartResponse) -> anyhow::Result<Body>,
{
    FnApp(f)
}

impl<F> Application for FnApp<F>
where
    F: Fn(&Environment, &mut StartResponse) -> anyhow::Result<Body>,
{
    fn call(&self, environ: &Environment, start_response: &mut StartResponse) -> anyhow::Result<Body> {
        (self.0)(environ, start_response)
    }
}

/// Sample handler answering every request with a fixed greeting.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelloWorld;

impl HelloWorld {
    pub const BODY: &'static str = "Hello, World!\n";
}

impl Application for HelloWorld {
    fn call(&self, _environ: &Environment, start_response: &mut StartResponse) -> anyhow::Result<Body> {
        let length = Self::BODY.len().to_string();
        start_response.start(
            "200 OK",
            [("Content-Type", "text/plain"), ("Content-Length", length.as_str())],
            None,
        )?;
        Ok(chunks([Self::BODY]))
    }
}
