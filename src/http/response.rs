use bytes::{BufMut, BytesMut};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Status line and ordered header list recorded by the application.
///
/// Headers keep the order the application supplied them in and are emitted
/// verbatim; duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status as "<code> <reason>", e.g. "200 OK"
    pub status: String,
    /// (name, value) pairs in emission order
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn new(status: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self {
            status: status.into(),
            headers,
        }
    }

    /// The numeric status code, if the status starts with three digits
    /// followed by a space.
    ///
    /// ```
    /// # use turnstile::http::response::ResponseHead;
    /// assert_eq!(ResponseHead::new("404 Not Found", vec![]).code(), Some(404));
    /// assert_eq!(ResponseHead::new("OK", vec![]).code(), None);
    /// ```
    pub fn code(&self) -> Option<u16> {
        let (code, _reason) = self.status.split_once(' ')?;
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        code.parse().ok()
    }

    /// Looks up the first header with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialises the preamble:
    /// `HTTP/1.1 <status>\r\nStatus: <status>\r\n`, one `<Name>: <Value>\r\n`
    /// line per header, then the blank line.
    pub fn write_preamble(&self, buf: &mut BytesMut) {
        // Status line
        buf.put_slice(HTTP_VERSION.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.as_bytes());
        buf.put_slice(b"\r\nStatus: ");
        buf.put_slice(self.status.as_bytes());
        buf.put_slice(b"\r\n");

        // Headers
        for (k, v) in &self.headers {
            buf.put_slice(k.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(v.as_bytes());
            buf.put_slice(b"\r\n");
        }

        // Header/body separator
        buf.put_slice(b"\r\n");
    }
}
