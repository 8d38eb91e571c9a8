//! Diagnostic output channel for applications.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Error stream exposed to applications through the environment.
///
/// Every complete line written becomes a `warn` event; a trailing partial
/// line is held until the next newline or `flush`. Clones share one line
/// buffer, so the base environment and every request write to the same
/// stream.
#[derive(Debug, Clone, Default)]
pub struct ErrorStream {
    pending: Arc<Mutex<Vec<u8>>>,
}

impl ErrorStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> io::Result<MutexGuard<'_, Vec<u8>>> {
        self.pending
            .lock()
            .map_err(|_| io::Error::other("error stream lock poisoned"))
    }
}

fn emit(line: &[u8]) {
    let line = String::from_utf8_lossy(line);
    tracing::warn!(source = "application", "{}", line.trim_end_matches('\r'));
}

impl Write for &ErrorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pending = self.pending()?;
        pending.extend_from_slice(buf);
        while let Some(end) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=end).collect();
            emit(&line[..end]);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut pending = self.pending()?;
        if !pending.is_empty() {
            emit(&pending);
            pending.clear();
        }
        Ok(())
    }
}

impl Write for ErrorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self).flush()
    }
}
