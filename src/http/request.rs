use std::collections::HashMap;
use std::fmt;

/// HTTP request methods.
///
/// The well-known methods get their own variant; any other token from the
/// request line is carried verbatim in `Extension`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other method token
    Extension(String),
}

/// A parsed request head. Immutable once the parser hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The raw request target as sent (e.g. "/search?q=rust")
    pub target: String,
    /// Path part of the target
    pub path: String,
    /// Final path segment after the last '/'
    pub script_name: String,
    /// Query string without the '?', empty when absent
    pub query: String,
    /// Protocol version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers keyed by lower-cased name
    pub headers: HashMap<String, String>,
    /// Declared Content-Length, if the header was present
    pub content_length: Option<usize>,
}

/// Builder for constructing Request objects.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: HashMap<String, String>,
}

impl Method {
    /// Parses a method token. Known methods are matched case-sensitively;
    /// anything else becomes `Method::Extension`.
    ///
    /// # Example
    ///
    /// ```
    /// # use turnstile::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Method::GET);
    /// assert_eq!(Method::from_token("get"), Method::Extension("get".into()));
    /// ```
    pub fn from_token(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            other => Method::Extension(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Extension(token) => token.as_str(),
        }
    }

    /// Whether requests with this method carry an entity body whose length
    /// must be declared up front.
    pub fn is_body_bearing(&self) -> bool {
        matches!(self, Method::POST | Method::PUT | Method::PATCH)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Builds the request, deriving path, script name, query and declared
    /// length the same way the parser does.
    pub fn build(self) -> Result<Request, &'static str> {
        let target = self.target.ok_or("target missing")?;
        let (path, query) = split_target(&target);
        let content_length = match self.headers.get("content-length") {
            Some(v) => Some(v.trim().parse().map_err(|_| "invalid content-length")?),
            None => None,
        };

        Ok(Request {
            method: self.method.ok_or("method missing")?,
            script_name: script_name(&path).to_string(),
            path,
            query,
            target,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            content_length,
        })
    }
}

impl Request {
    /// Retrieves a header value by name, case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// The Content-Type header, or an empty string.
    pub fn content_type(&self) -> &str {
        self.header("Content-Type").unwrap_or("")
    }
}

/// Splits a request target into path and query at the first '?'.
///
/// A '?' as the final character is kept in the path and yields an empty
/// query string.
pub fn split_target(target: &str) -> (String, String) {
    match target.split_once('?') {
        Some((path, query)) if !target.ends_with('?') => (path.to_string(), query.to_string()),
        _ => (target.to_string(), String::new()),
    }
}

/// The final segment of `path` after its last '/'; the whole path when it
/// has no '/'.
pub fn script_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, last)| last)
}
