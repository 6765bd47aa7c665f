use std::collections::HashMap;
use std::fmt;

use tokio::io::AsyncRead;

/// HTTP status codes the engine and common filters emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 100 Continue
    Continue,
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 302 Found
    Found,
    /// 303 See Other
    SeeOther,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 408 Request Timeout
    RequestTimeout,
    /// 500 Internal Server Error
    InternalServerError,
    /// 502 Bad Gateway
    BadGateway,
    /// 503 Service Unavailable
    ServiceUnavailable,
    /// 504 Gateway Timeout
    GatewayTimeout,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::MovedPermanently => 301,
            StatusCode::Found => 302,
            StatusCode::SeeOther => 303,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RequestTimeout => 408,
            StatusCode::InternalServerError => 500,
            StatusCode::BadGateway => 502,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::GatewayTimeout => 504,
        }
    }

    /// Returns the standard reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::SeeOther => "See Other",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::GatewayTimeout => "Gateway Timeout",
        }
    }

    /// 1xx codes carry no body by definition.
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.as_u16())
    }
}

/// Response payload.
///
/// `Stream` bodies have unknown length and are written with chunked
/// transfer encoding.
pub enum Body {
    Empty,
    Fixed(Vec<u8>),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl Body {
    /// Body length in bytes, if known up front.
    pub fn len(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Fixed(data) => Some(data.len() as u64),
            Body::Stream(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Fixed(data) => write!(f, "Body::Fixed({} bytes)", data.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

/// A response ready to be handed to downstream filters and written out.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Body,
    /// When set, the connection is closed after this response is written.
    pub close: bool,
}

impl Response {
    /// Creates a fixed-body response with the given status.
    pub fn with_body(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(status).body(body.into()).build()
    }

    /// Creates a 200 OK response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_body(StatusCode::Ok, body)
    }

    /// Creates the engine's default 404 response.
    pub fn not_found() -> Self {
        Self::with_body(StatusCode::NotFound, "Not Found")
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        Self::with_body(StatusCode::InternalServerError, "Internal Server Error")
    }

    /// Creates a 302 redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::redirect_with(StatusCode::Found, location)
    }

    /// Creates a redirect with an explicit 3xx status.
    pub fn redirect_with(status: StatusCode, location: impl Into<String>) -> Self {
        ResponseBuilder::new(status)
            .header("Location", location)
            .build()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    /// Body length if known; `None` marks an unknown-length stream.
    pub fn content_length(&self) -> Option<u64> {
        self.body.len()
    }
}

/// Builder for constructing responses in a fluent style.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Body,
    close: bool,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Body::Empty,
            close: false,
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets a fixed body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Body::Fixed(body);
        self
    }

    /// Sets an unknown-length streaming body.
    pub fn stream(mut self, reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        self.body = Body::Stream(reader);
        self
    }

    /// Requests that the connection be closed after this response.
    pub fn close(mut self) -> Self {
        self.close = true;
        self
    }

    /// Builds the final response.
    ///
    /// A `Content-Length` header is filled in from the body size unless
    /// one was set explicitly; streams get no length header.
    pub fn build(mut self) -> Response {
        if let Some(len) = self.body.len() {
            self.headers
                .entry("Content-Length".to_string())
                .or_insert_with(|| len.to_string());
        }

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
            close: self.close,
        }
    }
}
