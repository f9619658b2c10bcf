use crate::message::Message;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{
    HeaderName, HeaderValue, ALLOW, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE,
    LAST_MODIFIED, LOCATION, X_CONTENT_TYPE_OPTIONS,
};
use http::{Method, StatusCode};
use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::io::Write;
use std::mem;
use std::path::Path;

/// The request type handed to the dispatcher and to route handlers.
/// The transport is expected to buffer the request body before dispatch.
pub type Request = http::Request<Vec<u8>>;

/// The response type returned to the transport.
pub type Response = http::Response<ResponseBody>;

/// The body of a [`Response`].
///
/// Actual socket I/O belongs to the transport, so a response carries either
/// buffered bytes or an open file handle for the transport's file-serving
/// primitive. The file handle is scoped to the response; dropping the
/// response closes it.
#[derive(Debug, Default)]
pub enum ResponseBody {
    /// No body.
    #[default]
    Empty,
    /// A buffered body.
    Bytes(Vec<u8>),
    /// An open file to be served by the transport, together with its size
    /// in bytes. Range and conditional-GET semantics are the transport's
    /// responsibility.
    File {
        /// The open file handle.
        file: File,
        /// The file size in bytes.
        length: u64,
    },
}

impl ResponseBody {
    /// The body size in bytes.
    pub fn len(&self) -> u64 {
        match self {
            ResponseBody::Empty => 0,
            ResponseBody::Bytes(bytes) => bytes.len() as u64,
            ResponseBody::File { length, .. } => *length,
        }
    }

    /// Returns true if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The content encoding applied when a content resolution is written.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum Encoding {
    /// Write the content as-is.
    #[default]
    Identity,
    /// Gzip-compress the content and set `Content-Encoding: gzip`.
    Gzip,
}

/// The outcome of handling one request.
///
/// A resolution is the only way a response leaves the dispatcher: every code
/// path produces exactly one, it is written exactly once, and it knows how to
/// summarize itself for the per-request log line. Handlers construct
/// resolutions through [`Resolution::content`], [`Resolution::serve_file`],
/// [`Resolution::redirect`], [`Resolution::error`],
/// [`Resolution::method_not_allowed`] and [`Resolution::web_socket`].
pub struct Resolution {
    kind: Kind,
}

enum Kind {
    Content {
        content_type: String,
        content: Vec<u8>,
        headers: Vec<(HeaderName, HeaderValue)>,
        encoding: Encoding,
    },
    File {
        file_name: String,
        content_type: String,
        max_age: u32,
        mod_time: DateTime<Utc>,
        size: u64,
        file: Option<File>,
    },
    Redirect {
        status: StatusCode,
        url: String,
    },
    Error {
        status: StatusCode,
        message: String,
    },
    MethodNotAllowed {
        allowed: String,
    },
    WebSocket {
        handler: Option<Box<dyn FnOnce(&Request) -> bool + Send>>,
        success: bool,
    },
}

impl Resolution {
    /// A response carrying the given body.
    /// Writes as 200, or 204 if `content` is empty.
    pub fn content(content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            kind: Kind::Content {
                content_type: content_type.into(),
                content,
                headers: Vec::new(),
                encoding: Encoding::Identity,
            },
        }
    }

    /// Add a response header to a content resolution.
    /// Has no effect on other resolutions.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if let Kind::Content { headers, .. } = &mut self.kind {
            headers.push((name, value));
        }
        self
    }

    /// Select the content encoding of a content resolution.
    /// Has no effect on other resolutions.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        if let Kind::Content {
            encoding: current, ..
        } = &mut self.kind
        {
            *current = encoding;
        }
        self
    }

    /// Serve the file at `path`.
    ///
    /// Requires method GET. A missing file resolves to 404, a non-regular
    /// file or an open failure to 500. A positive `max_age` is emitted as a
    /// `Cache-Control: max-age` response header, in seconds.
    pub fn serve_file(req: &Request, path: impl AsRef<Path>, content_type: &str, max_age: u32) -> Self {
        let path = path.as_ref();
        if req.method() != Method::GET {
            return Self::method_not_allowed("GET");
        }

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return Self::error(StatusCode::NOT_FOUND),
        };
        if !metadata.file_type().is_file() {
            return Self::error(StatusCode::INTERNAL_SERVER_ERROR);
        }
        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) => {
                return Self::error_with_message(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("opening {} failed ({error})", path.display()),
                )
            }
        };
        let mod_time = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        Self {
            kind: Kind::File {
                file_name: path.display().to_string(),
                content_type: content_type.to_owned(),
                max_age,
                mod_time,
                size: metadata.len(),
                file: Some(file),
            },
        }
    }

    /// A bodyless redirect with the given status, e.g. 303 See Other.
    pub fn redirect(status: StatusCode, url: impl Into<String>) -> Self {
        Self {
            kind: Kind::Redirect {
                status,
                url: url.into(),
            },
        }
    }

    /// An error response with the canonical status text as its body.
    pub fn error(status: StatusCode) -> Self {
        Self::error_with_message(status, String::new())
    }

    /// An error response with the given message as its body.
    /// An empty message falls back to the canonical status text.
    pub fn error_with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: Kind::Error {
                status,
                message: message.into(),
            },
        }
    }

    /// A 405 response advertising the allowed methods, e.g. `"POST"`.
    pub fn method_not_allowed(allowed: impl Into<String>) -> Self {
        Self {
            kind: Kind::MethodNotAllowed {
                allowed: allowed.into(),
            },
        }
    }

    /// A protocol upgrade. The handshake itself is delegated to `handler`,
    /// which reports whether the upgrade succeeded; the resolution then
    /// writes as 101, or 500 on failure.
    pub fn web_socket(handler: impl FnOnce(&Request) -> bool + Send + 'static) -> Self {
        Self {
            kind: Kind::WebSocket {
                handler: Some(Box::new(handler)),
                success: false,
            },
        }
    }

    /// Write this resolution as an HTTP response.
    ///
    /// This is the single place response status, headers and body are
    /// decided; callers other than the dispatcher should not need it. It
    /// consumes the carried body or file handle, and must be called at most
    /// once.
    pub fn write_response(&mut self, req: &Request) -> Response {
        match &mut self.kind {
            Kind::Content {
                content_type,
                content,
                headers,
                encoding,
            } => {
                let mut response = http::Response::new(ResponseBody::Empty);
                for (name, value) in headers.drain(..) {
                    response.headers_mut().insert(name, value);
                }
                if !content_type.is_empty() {
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, ascii_value(content_type));
                }
                if *encoding == Encoding::Gzip && !content.is_empty() {
                    if let Ok(compressed) = gzip(content) {
                        *content = compressed;
                        response
                            .headers_mut()
                            .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                    }
                }
                response
                    .headers_mut()
                    .insert(CONTENT_LENGTH, ascii_value(&content.len().to_string()));
                if content.is_empty() {
                    *response.status_mut() = StatusCode::NO_CONTENT;
                } else {
                    *response.status_mut() = StatusCode::OK;
                    *response.body_mut() = ResponseBody::Bytes(mem::take(content));
                }
                response
            }
            Kind::File {
                content_type,
                max_age,
                mod_time,
                size,
                file,
                ..
            } => {
                let mut response = http::Response::new(ResponseBody::Empty);
                if !content_type.is_empty() {
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, ascii_value(content_type));
                }
                if *max_age > 0 {
                    response
                        .headers_mut()
                        .insert(CACHE_CONTROL, ascii_value(&format!("max-age={max_age}")));
                }
                response.headers_mut().insert(
                    LAST_MODIFIED,
                    ascii_value(&mod_time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
                );
                match file.take() {
                    Some(file) if *size > 0 => {
                        *response.body_mut() = ResponseBody::File {
                            file,
                            length: *size,
                        };
                    }
                    _ => *response.status_mut() = StatusCode::NO_CONTENT,
                }
                response
            }
            Kind::Redirect { status, url } => {
                let mut response = http::Response::new(ResponseBody::Empty);
                *response.status_mut() = *status;
                response.headers_mut().insert(LOCATION, ascii_value(url));
                response
            }
            Kind::Error { status, message } => error_response(*status, message),
            Kind::MethodNotAllowed { allowed } => {
                let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "");
                if !allowed.is_empty() {
                    response.headers_mut().insert(ALLOW, ascii_value(allowed));
                }
                response
            }
            Kind::WebSocket { handler, success } => {
                *success = match handler.take() {
                    Some(handler) => handler(req),
                    None => false,
                };
                let mut response = http::Response::new(ResponseBody::Empty);
                *response.status_mut() = if *success {
                    StatusCode::SWITCHING_PROTOCOLS
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                response
            }
        }
    }

    /// A one-line summary of this resolution for the per-request log line.
    ///
    /// For the web-socket resolution the summary reflects the handshake
    /// outcome, so it is only meaningful after [`Resolution::write_response`].
    pub fn log_message(&self) -> Message {
        match &self.kind {
            Kind::Content { .. } => Message::debug(format!("{} bytes", self.size())),
            Kind::File { file_name, .. } => Message::debug(format!("File \"{file_name}\"")),
            Kind::Redirect { url, .. } => Message::debug(format!("Redirect \"{url}\"")),
            Kind::Error { status, message } => {
                let text = if message.is_empty() {
                    status_text(*status)
                } else {
                    message.as_str()
                };
                let line = format!("{} {}", status.as_u16(), text);
                if status.is_client_error() {
                    Message::warning(line)
                } else {
                    Message::error(line)
                }
            }
            Kind::MethodNotAllowed { .. } => Message::warning(format!(
                "{} {}",
                StatusCode::METHOD_NOT_ALLOWED.as_u16(),
                status_text(StatusCode::METHOD_NOT_ALLOWED)
            )),
            Kind::WebSocket { success, .. } => {
                if *success {
                    Message::debug("WebSocket")
                } else {
                    Message::error("WebSocket ERROR")
                }
            }
        }
    }

    /// The body size this resolution reports, in bytes.
    pub fn size(&self) -> u64 {
        match &self.kind {
            Kind::Content { content, .. } => content.len() as u64,
            Kind::File { size, .. } => *size,
            _ => 0,
        }
    }

    /// The status code this resolution writes.
    ///
    /// For the web-socket resolution this is only meaningful after
    /// [`Resolution::write_response`].
    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            Kind::Content { content, .. } => {
                if content.is_empty() {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::OK
                }
            }
            Kind::File { size, .. } => {
                if *size == 0 {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::OK
                }
            }
            Kind::Redirect { status, .. } => *status,
            Kind::Error { status, .. } => *status,
            Kind::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Kind::WebSocket { success, .. } => {
                if *success {
                    StatusCode::SWITCHING_PROTOCOLS
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }
}

impl Debug for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Kind::Content {
                content_type,
                content,
                ..
            } => f
                .debug_struct("Content")
                .field("content_type", content_type)
                .field("content_length", &content.len())
                .finish_non_exhaustive(),
            Kind::File {
                file_name, size, ..
            } => f
                .debug_struct("File")
                .field("file_name", file_name)
                .field("size", size)
                .finish_non_exhaustive(),
            Kind::Redirect { status, url } => f
                .debug_struct("Redirect")
                .field("status", status)
                .field("url", url)
                .finish(),
            Kind::Error { status, message } => f
                .debug_struct("Error")
                .field("status", status)
                .field("message", message)
                .finish(),
            Kind::MethodNotAllowed { allowed } => f
                .debug_struct("MethodNotAllowed")
                .field("allowed", allowed)
                .finish(),
            Kind::WebSocket { success, .. } => f
                .debug_struct("WebSocket")
                .field("success", success)
                .finish_non_exhaustive(),
        }
    }
}

/// An early exit from request handling, carrying the resolution to respond
/// with.
///
/// Route handlers and guards raise an `Abort` through `?`; the dispatcher is
/// the single point that recovers it and treats the carried value as the
/// resolution of the request. It never crosses a request boundary.
#[derive(Debug)]
pub struct Abort(Resolution);

impl From<Resolution> for Abort {
    fn from(resolution: Resolution) -> Self {
        Self(resolution)
    }
}

impl Abort {
    /// Borrow the resolution carried by this early exit.
    pub fn resolution(&self) -> &Resolution {
        &self.0
    }

    /// The resolution carried by this early exit.
    pub fn into_resolution(self) -> Resolution {
        self.0
    }
}

/// The return type of route handlers and guards: a resolution, produced
/// either by running to completion or by an early exit.
pub type Outcome = Result<Resolution, Abort>;

/// Render an error response: plain-text body, like the canonical error
/// responses of common HTTP stacks.
fn error_response(status: StatusCode, message: &str) -> Response {
    let text = if message.is_empty() {
        status_text(status)
    } else {
        message
    };
    let mut body = text.as_bytes().to_vec();
    body.push(b'\n');

    let mut response = http::Response::new(ResponseBody::Bytes(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
        .headers_mut()
        .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

// Invalid header bytes degrade to an empty value.
fn ascii_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn gzip(content: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> Request {
        http::Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Vec::new())
            .unwrap()
    }

    #[test]
    fn content_writes_200_with_length() {
        let req = get("/");
        let mut resolution = Resolution::content("text/plain", b"hello".to_vec());
        assert_eq!(resolution.size(), 5);
        let response = resolution.write_response(&req);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
        assert!(matches!(response.body(), ResponseBody::Bytes(bytes) if bytes == b"hello"));
    }

    #[test]
    fn empty_content_writes_204() {
        let req = get("/");
        let mut resolution = Resolution::content("text/plain", Vec::new());
        let response = resolution.write_response(&req);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
    }

    #[test]
    fn gzip_content_sets_content_encoding() {
        let req = get("/");
        let mut resolution = Resolution::content("text/plain", vec![b'a'; 4096])
            .with_encoding(Encoding::Gzip);
        let response = resolution.write_response(&req);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
        // Compressing a run of identical bytes must shrink it.
        assert!(response.body().len() < 4096);
    }

    #[test]
    fn error_body_falls_back_to_status_text() {
        let req = get("/");
        let mut resolution = Resolution::error(StatusCode::NOT_FOUND);
        let response = resolution.write_response(&req);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(matches!(response.body(), ResponseBody::Bytes(bytes) if bytes == b"Not Found\n"));
    }

    #[test]
    fn error_severity_follows_status_class() {
        use crate::message::Severity;
        assert_eq!(
            Resolution::error(StatusCode::FORBIDDEN).log_message().severity(),
            Severity::Warning
        );
        assert_eq!(
            Resolution::error(StatusCode::INTERNAL_SERVER_ERROR)
                .log_message()
                .severity(),
            Severity::Error
        );
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let req = get("/sign-in");
        let mut resolution = Resolution::method_not_allowed("POST");
        let response = resolution.write_response(&req);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");
    }

    #[test]
    fn redirect_sets_location_without_body() {
        let req = get("/old");
        let mut resolution = Resolution::redirect(StatusCode::SEE_OTHER, "/new");
        let response = resolution.write_response(&req);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/new");
        assert!(response.body().is_empty());
    }

    #[test]
    fn web_socket_status_reflects_handshake_outcome() {
        let req = get("/ws");
        let mut resolution = Resolution::web_socket(|_| true);
        let response = resolution.write_response(&req);
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(resolution.log_message(), Message::debug("WebSocket"));

        let mut resolution = Resolution::web_socket(|_| false);
        let response = resolution.write_response(&req);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
