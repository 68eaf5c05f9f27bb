use std::fmt;

use thiserror::Error;

use crate::headers::HeaderMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    /// Any other token. Answered with `501 Not Implemented`.
    Unsupported,
}

impl From<&str> for Method {
    fn from(value: &str) -> Self {
        match value {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            _ => Method::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Http10 => f.write_str("HTTP/1.0"),
            Version::Http11 => f.write_str("HTTP/1.1"),
        }
    }
}

/// Struct containing data on a single request.
///
/// Only the request line and headers are kept, bodies are never read.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    raw_method: String,
    target: String,
    version: Version,
    headers: HeaderMap,
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("connection closed before a request was sent")]
    Empty,
    #[error("failed to parse status line")]
    StatusLineErr,
    #[error("bad request version ({0})")]
    VersionErr(String),
    #[error("invalid HTTP version ({0})")]
    UnsupportedVersion(String),
    #[error("failed to parse headers")]
    HeadersErr,
    #[error("request headers exceed {0} bytes")]
    TooLarge(usize),
    #[error("failed to read request: {0}")]
    Io(#[from] std::io::Error),
}

/// Index just past the blank line ending the header block, if `buf` holds one.
///
/// Bare `\n` line endings are tolerated.
pub fn header_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);

    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl Request {
    /// Parses the request line and headers out of `buf`.
    ///
    /// Anything after the header block is ignored.
    pub fn parse(buf: &[u8]) -> Result<Request, RequestError> {
        let end = header_end(buf).unwrap_or(buf.len());
        let head = String::from_utf8_lossy(&buf[..end]);

        let mut lines = head
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .skip_while(|l| l.is_empty());

        let status_line = lines.next().ok_or(RequestError::Empty)?;

        #[cfg(feature = "log")]
        log::trace!("STATUS LINE: {:?}", status_line);

        let words: Vec<&str> = status_line.split_whitespace().collect();
        let &[method, target, version] = words.as_slice() else {
            return Err(RequestError::StatusLineErr);
        };

        let version = parse_version(version)?;

        let mut headers = HeaderMap::new();
        for line in lines.take_while(|l| !l.is_empty()) {
            if line.starts_with([' ', '\t']) {
                return Err(RequestError::HeadersErr);
            }
            let (name, value) = line.split_once(':').ok_or(RequestError::HeadersErr)?;
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(RequestError::HeadersErr);
            }

            #[cfg(feature = "log")]
            log::trace!("HEADER: {}: {}", name, value.trim());

            headers.set(name, value.trim());
        }

        Ok(Request {
            method: Method::from(method),
            raw_method: method.to_string(),
            target: target.to_string(),
            version,
            headers,
        })
    }

    pub fn get_method(&self) -> Method {
        self.method
    }

    /// Method token exactly as the client sent it
    pub fn get_raw_method(&self) -> &str {
        &self.raw_method
    }

    /// Request target, still percent-encoded and with any query string
    pub fn get_target(&self) -> &str {
        &self.target
    }

    pub fn get_version(&self) -> Version {
        self.version
    }

    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }
}

fn parse_version(raw: &str) -> Result<Version, RequestError> {
    let bad = || RequestError::VersionErr(raw.to_string());

    let number = raw.strip_prefix("HTTP/").ok_or_else(bad)?;
    let (major, minor) = number.split_once('.').ok_or_else(bad)?;
    let major: u32 = major.parse().map_err(|_| bad())?;
    let minor: u32 = minor.parse().map_err(|_| bad())?;

    match (major, minor) {
        (1, 0) => Ok(Version::Http10),
        (1, _) => Ok(Version::Http11),
        (0, _) => Err(bad()),
        _ => Err(RequestError::UnsupportedVersion(raw.to_string())),
    }
}
