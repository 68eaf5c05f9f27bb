use std::{io, time::SystemTime};

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    MovedPermanently,
    NotModified,
    BadRequest,
    Forbidden,
    NotFound,
    RequestHeaderFieldsTooLarge,
    InternalServerError,
    NotImplemented,
    HttpVersionNotSupported,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::MovedPermanently => 301,
            Status::NotModified => 304,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::RequestHeaderFieldsTooLarge => 431,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::HttpVersionNotSupported => 505,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::MovedPermanently => "Moved Permanently",
            Status::NotModified => "Not Modified",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

#[derive(Debug)]
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed from disk, `len` bytes long
    File { file: File, len: u64 },
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(b) => b.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An HTTP response waiting to be written.
///
/// `headers` keeps insertion order. `Server`, `Date`, `Content-Length` and
/// `Connection` are filled in by [`Response::send`].
#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Response {
        Response {
            status: Status::Ok,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Error page in the same shape for every 4xx/5xx status.
    pub fn error(status: Status, message: Option<&str>) -> Response {
        let mut page = format!(
            "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{code} {reason}</title>\n</head>\n<body>\n<h1>{code} {reason}</h1>\n",
            code = status.code(),
            reason = status.reason(),
        );
        if let Some(message) = message {
            page += &format!("<p>{}</p>\n", crate::listing::html_escape(message));
        }
        page += "</body>\n</html>\n";

        Response::new()
            .status(status)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(page.into_bytes())
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Body::Bytes(body);
        self
    }

    pub fn file(mut self, file: File, len: u64) -> Self {
        self.body = Body::File { file, len };
        self
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Serialises the status line and header block.
    ///
    /// `trailing` is written after every other header, right before the
    /// blank line.
    pub fn head_bytes(&self, trailing: &[(String, String)]) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        head += &format!("Server: quickserve/{}\r\n", env!("CARGO_PKG_VERSION"));
        head += &format!("Date: {}\r\n", http_date(SystemTime::now()));

        for (k, v) in self.headers.iter() {
            head += &format!("{}: {}\r\n", k, v);
        }

        if self.status != Status::NotModified {
            head += &format!("Content-Length: {}\r\n", self.body.len());
        }
        head += "Connection: close\r\n";

        for (k, v) in trailing.iter() {
            head += &format!("{}: {}\r\n", k, v);
        }
        head += "\r\n";

        head.into_bytes()
    }

    /// Writes the response to `sock`. With `head_only` the body is left out
    /// but `Content-Length` still describes it.
    pub async fn send<P: AsyncWrite + Unpin>(
        self,
        sock: &mut P,
        head_only: bool,
        trailing: &[(String, String)],
    ) -> io::Result<()> {
        let head = self.head_bytes(trailing);

        #[cfg(feature = "log")]
        log::trace!("res status line: {} {}", self.status.code(), self.status.reason());

        sock.write_all(&head).await?;

        if !head_only && self.status != Status::NotModified {
            match self.body {
                Body::Empty => {}
                Body::Bytes(bytes) => sock.write_all(&bytes).await?,
                Body::File { file, len } => {
                    let copied = tokio::io::copy(&mut file.take(len), sock).await?;

                    #[cfg(feature = "log")]
                    log::trace!("streamed {} of {} bytes", copied, len);

                    if copied < len {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "file shrank while it was being sent",
                        ));
                    }
                }
            }
        }

        sock.flush().await
    }
}

/// Formats a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(IMF_FIXDATE).to_string()
}

/// Parses an IMF-fixdate, falling back to anything RFC 2822 accepts.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, IMF_FIXDATE)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc2822(value).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn cors() -> Vec<(String, String)> {
        vec![("Access-Control-Allow-Origin".to_string(), "*".to_string())]
    }

    #[tokio::test]
    async fn trailing_headers_come_last() {
        let mut out = Vec::new();
        Response::new()
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(b"hello".to_vec())
            .send(&mut out, false, &cors())
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let (head, body) = text.split_once("\r\n\r\n").unwrap();

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.ends_with("\r\nAccess-Control-Allow-Origin: *"));
        assert!(head.contains("\r\nContent-Length: 5\r\n"));
        assert!(head.contains("\r\nContent-Type: text/plain; charset=utf-8\r\n"));
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn head_only_keeps_length_and_drops_body() {
        let mut out = Vec::new();
        Response::new()
            .body(vec![b'x'; 42])
            .send(&mut out, true, &[])
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\r\nContent-Length: 42\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn not_modified_has_no_length_or_body() {
        let mut out = Vec::new();
        Response::new()
            .status(Status::NotModified)
            .body(b"ignored".to_vec())
            .send(&mut out, false, &cors())
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("Access-Control-Allow-Origin: *\r\n\r\n"));
    }

    #[test]
    fn error_page_escapes_message() {
        let res = Response::error(Status::NotFound, Some("<script>"));

        assert_eq!(res.status.code(), 404);
        assert_eq!(res.get_header("content-type"), Some("text/html; charset=utf-8"));
        let Body::Bytes(page) = &res.body else {
            panic!("error page should be in memory");
        };
        let page = std::str::from_utf8(page).unwrap();
        assert!(page.contains("<h1>404 Not Found</h1>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn http_dates() {
        let time = UNIX_EPOCH + Duration::from_secs(784111777);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");

        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(parsed.timestamp(), 784111777);
        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 +0000").unwrap();
        assert_eq!(parsed.timestamp(), 784111777);
        assert!(parse_http_date("yesterday").is_none());
    }
}
