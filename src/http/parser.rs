use crate::http::request::{Method, Request, script_name, split_target};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,

    #[error("malformed request line: {line:?}")]
    InvalidRequestLine { line: String },

    #[error("malformed header line: {line:?}")]
    InvalidHeader { line: String },

    #[error("invalid content-length header: {value:?}")]
    InvalidContentLength { value: String },

    #[error("request head exceeds the limit of {max_size} bytes")]
    HeadTooLarge { max_size: usize },
}

/// Parses a complete request head (request line plus header lines, without
/// the trailing blank line) into a [`Request`].
pub fn parse_request_head(head: &[u8]) -> Result<Request, ParseError> {
    let head = std::str::from_utf8(head).map_err(|_| ParseError::InvalidEncoding)?;

    let mut lines = head.split("\r\n");

    // Request line
    let request_line = lines.next().unwrap_or_default();
    let (method, target, version) = parse_request_line(request_line)?;

    // Headers
    let mut headers = HashMap::new();

    for line in lines {
        let (key, value) = line
            .split_once(": ")
            .filter(|(key, _)| is_token(key))
            .ok_or_else(|| ParseError::InvalidHeader {
                line: line.to_string(),
            })?;

        headers.insert(key.to_ascii_lowercase(), value.to_string());
    }

    let content_length = headers
        .get("content-length")
        .map(|v: &String| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength { value: v.clone() })
        })
        .transpose()?;

    let (path, query) = split_target(target);

    Ok(Request {
        method: Method::from_token(method),
        script_name: script_name(&path).to_string(),
        path,
        query,
        target: target.to_string(),
        version: version.to_string(),
        headers,
        content_length,
    })
}

/// Splits "METHOD SP TARGET SP VERSION". The method ends at the first space
/// and the version starts after the last one, so the target may itself
/// contain spaces.
fn parse_request_line(line: &str) -> Result<(&str, &str, &str), ParseError> {
    let invalid = || ParseError::InvalidRequestLine {
        line: line.to_string(),
    };

    let (method, rest) = line.split_once(' ').ok_or_else(invalid)?;
    let (target, version) = rest.rsplit_once(' ').ok_or_else(invalid)?;

    if !is_token(method) || target.is_empty() || !version.starts_with("HTTP/") {
        return Err(invalid());
    }

    Ok((method, target, version))
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}
