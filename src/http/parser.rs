use std::collections::HashMap;

use thiserror::Error;

use crate::http::request::{Method, Request};
use crate::pool::PoolEntry;

/// Upper bound on the request head (request line + headers).
pub(crate) const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Errors produced while parsing a request from a byte buffer.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The request line is malformed
    #[error("malformed request line")]
    InvalidRequest,
    /// The HTTP method is not recognized
    #[error("unrecognized HTTP method")]
    InvalidMethod,
    /// The protocol version is not an HTTP version
    #[error("unsupported protocol version")]
    InvalidVersion,
    /// A header line is malformed
    #[error("malformed header line")]
    InvalidHeader,
    /// Content-Length is not a valid number
    #[error("invalid Content-Length value")]
    InvalidContentLength,
    /// More data is needed before a request can be produced
    #[error("request is incomplete")]
    Incomplete,
}

/// Errors produced while reading a request off a connection.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),
    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    HeadersTooLarge,
    #[error("connection closed mid-request")]
    UnexpectedEof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parses one complete HTTP request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied, so callers
/// can keep pipelined follow-up requests intact. `Incomplete` means the
/// buffer holds a valid prefix and more data should be read.
pub fn parse_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let head_end = find_head_end(buf).ok_or(ParseError::Incomplete)?;

    let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| ParseError::InvalidRequest)?;
    let mut lines = head.split("\r\n");

    let (method, path, version) =
        parse_request_line(lines.next().ok_or(ParseError::InvalidRequest)?)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = parse_header_line(line)?;
        headers.insert(name.to_string(), value.to_string());
    }

    let content_length = match headers.get("Content-Length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength)?,
        None => 0,
    };

    let body_start = head_end + 4;
    if buf.len() < body_start + content_length {
        return Err(ParseError::Incomplete);
    }

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body: buf[body_start..body_start + content_length].to_vec(),
    };

    Ok((request, body_start + content_length))
}

/// Reads one request from a pooled connection buffer.
///
/// Alternates between parsing what is already buffered and pulling more
/// bytes from the entry's underlying source. Returns `Ok(None)` when the
/// remote closed the connection cleanly between requests.
pub async fn read_request(entry: &mut PoolEntry) -> Result<Option<Request>, ReadError> {
    loop {
        match parse_request(entry.pending()) {
            Ok((request, consumed)) => {
                entry.consume(consumed);
                return Ok(Some(request));
            }
            Err(ParseError::Incomplete) => {
                if find_head_end(entry.pending()).is_none()
                    && entry.pending().len() > MAX_HEAD_BYTES
                {
                    return Err(ReadError::HeadersTooLarge);
                }
                if entry.fill().await? == 0 {
                    return if entry.pending().is_empty() {
                        Ok(None)
                    } else {
                        Err(ReadError::UnexpectedEof)
                    };
                }
            }
            Err(e) => return Err(ReadError::Malformed(e)),
        }
    }
}

fn parse_request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    let mut parts = line.split(' ').filter(|p| !p.is_empty());

    let method = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;
    if parts.next().is_some() {
        return Err(ParseError::InvalidRequest);
    }

    let method = method
        .parse::<Method>()
        .map_err(|_| ParseError::InvalidMethod)?;
    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidVersion);
    }

    Ok((method, path, version))
}

fn parse_header_line(line: &str) -> Result<(&str, &str), ParseError> {
    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ParseError::InvalidHeader);
    }
    Ok((name, value.trim()))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
