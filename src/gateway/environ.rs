//! The request context handed to applications.
//!
//! A [`BaseEnvironment`] is computed once at start-up and merged read-only
//! into every per-request [`Environment`].

use crate::config::Config;
use crate::gateway::errors::ErrorStream;
use crate::http::request::Request;
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn from_secure(secure: bool) -> Self {
        if secure { Scheme::Https } else { Scheme::Http }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every request served by one process.
#[derive(Debug, Clone)]
pub struct BaseEnvironment {
    pub server_name: String,
    pub server_port: u16,
    pub url_scheme: Scheme,
    /// Gateway interface version
    pub version: (u8, u8),
    pub multithread: bool,
    pub multiprocess: bool,
    pub run_once: bool,
    /// Diagnostic stream shared with every request
    pub errors: ErrorStream,
    /// Process environment captured at start-up
    pub inherited: Arc<BTreeMap<String, String>>,
}

impl BaseEnvironment {
    pub fn new(server_name: impl Into<String>, server_port: u16, url_scheme: Scheme) -> Self {
        Self {
            server_name: server_name.into(),
            server_port,
            url_scheme,
            version: (1, 0),
            multithread: false,
            multiprocess: true,
            run_once: true,
            errors: ErrorStream::new(),
            inherited: Arc::default(),
        }
    }

    /// Builds the base from configuration, capturing the process environment
    /// when `inherit_env` is set. Names and values that are not valid
    /// Unicode are kept, decoded byte for byte as Latin-1.
    pub fn from_config(cfg: &Config) -> Self {
        let mut base = Self::new(cfg.host.clone(), cfg.port, Scheme::from_secure(cfg.secure));

        if cfg.inherit_env {
            let vars = std::env::vars_os()
                .map(|(k, v)| (env_string(k), env_string(v)))
                .collect();
            base.inherited = Arc::new(vars);
        }

        base
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }
}

fn env_string(s: OsString) -> String {
    s.into_string().unwrap_or_else(latin1)
}

#[cfg(unix)]
fn latin1(raw: OsString) -> String {
    use std::os::unix::ffi::OsStringExt;
    raw.into_vec().into_iter().map(char::from).collect()
}

#[cfg(not(unix))]
fn latin1(raw: OsString) -> String {
    raw.to_string_lossy().into_owned()
}

/// Full context of one request, built once the request is ready to dispatch.
#[derive(Debug, Clone)]
pub struct Environment {
    pub method: String,
    /// Final segment of the path
    pub script_name: String,
    pub path: String,
    pub query_string: String,
    /// Request headers keyed by lower-cased name
    pub headers: HashMap<String, String>,
    /// Declared body length, 0 when no Content-Length was sent
    pub content_length: usize,
    pub content_type: String,
    pub protocol: String,
    pub server_name: String,
    pub server_port: u16,
    pub url_scheme: Scheme,
    pub version: (u8, u8),
    pub multithread: bool,
    pub multiprocess: bool,
    pub run_once: bool,
    pub errors: ErrorStream,
    /// Request body, exactly `content_length` bytes for body-bearing methods
    pub body: Bytes,
    pub inherited: Arc<BTreeMap<String, String>>,
}

impl Environment {
    /// Merges the per-request values with the process-wide base.
    pub fn build(base: &BaseEnvironment, request: Request, body: Bytes) -> Self {
        Self {
            method: request.method.as_str().to_string(),
            content_length: request.content_length.unwrap_or(0),
            content_type: request.content_type().to_string(),
            script_name: request.script_name,
            path: request.path,
            query_string: request.query,
            headers: request.headers,
            protocol: request.version,
            server_name: base.server_name.clone(),
            server_port: base.server_port,
            url_scheme: base.url_scheme,
            version: base.version,
            multithread: base.multithread,
            multiprocess: base.multiprocess,
            run_once: base.run_once,
            errors: base.errors.clone(),
            body,
            inherited: Arc::clone(&base.inherited),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// CGI-style lookup.
    ///
    /// Resolves the well-known request and server keys, `HTTP_<NAME>` for
    /// request headers (`HTTP_USER_AGENT` reads `user-agent`), and finally the
    /// inherited process environment.
    pub fn var(&self, key: &str) -> Option<Cow<'_, str>> {
        let value = match key {
            "REQUEST_METHOD" => Cow::Borrowed(self.method.as_str()),
            "SCRIPT_NAME" => Cow::Borrowed(self.script_name.as_str()),
            "PATH_INFO" => Cow::Borrowed(self.path.as_str()),
            "QUERY_STRING" => Cow::Borrowed(self.query_string.as_str()),
            "CONTENT_LENGTH" => Cow::Owned(self.content_length.to_string()),
            "CONTENT_TYPE" => Cow::Borrowed(self.content_type.as_str()),
            "SERVER_PROTOCOL" => Cow::Borrowed(self.protocol.as_str()),
            "SERVER_NAME" => Cow::Borrowed(self.server_name.as_str()),
            "SERVER_PORT" => Cow::Owned(self.server_port.to_string()),
            "wsgi.url_scheme" => Cow::Borrowed(self.url_scheme.as_str()),
            _ => {
                if let Some(name) = key.strip_prefix("HTTP_") {
                    let name = name.to_ascii_lowercase().replace('_', "-");
                    return self.headers.get(&name).map(|v| Cow::Borrowed(v.as_str()));
                }
                return self.inherited.get(key).map(|v| Cow::Borrowed(v.as_str()));
            }
        };
        Some(value)
    }

    /// Reconstructs the absolute URL the client asked for, preferring the
    /// Host header over the configured server name and port.
    pub fn request_url(&self) -> Result<Url, url::ParseError> {
        let authority = match self.header("Host") {
            Some(host) => host.to_string(),
            None => {
                let name = if self.server_name.contains(':') && !self.server_name.starts_with('[') {
                    format!("[{}]", self.server_name)
                } else {
                    self.server_name.clone()
                };
                if self.server_port == self.url_scheme.default_port() {
                    name
                } else {
                    format!("{}:{}", name, self.server_port)
                }
            }
        };

        let mut url = format!("{}://{}{}", self.url_scheme, authority, self.path);
        if !self.query_string.is_empty() {
            url.push('?');
            url.push_str(&self.query_string);
        }
        Url::parse(&url)
    }
}
