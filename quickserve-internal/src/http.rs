use std::{future::Future, net::SocketAddr, path::Path, sync::Arc};

use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncWrite},
    select,
};

use crate::{
    config::{Config, HttpListener},
    listing,
    mount::{self, Translated},
    request::{header_end, Method, Request, RequestError},
    response::{http_date, parse_http_date, Response, Status},
};

/// Largest header block we are willing to buffer.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

pub(crate) async fn start_http<F: Future<Output = ()>>(http: HttpListener, shutdown: F) {
    tokio::pin!(shutdown);

    loop {
        select! {
            result = http.socket.accept() => match result {
                Ok((mut conn, addr)) => {
                    let config = Arc::clone(&http.config);
                    tokio::spawn(async move {
                        parse_request(&mut conn, addr, &config).await;
                    });
                }
                Err(_e) => {
                    #[cfg(feature = "log")]
                    log::warn!("failed to accept connection: {}", _e);
                }
            },
            _ = &mut shutdown => {
                #[cfg(feature = "log")]
                log::debug!("shutting down");

                break;
            }
        }
    }
}

/// Reads until the end of the header block or EOF.
pub(crate) async fn read_stream<P: AsyncRead + Unpin>(
    stream: &mut P,
) -> Result<Vec<u8>, RequestError> {
    let buffer_size = 1024;
    let mut request_buffer = Vec::with_capacity(buffer_size);
    let mut buffer = vec![0; buffer_size];

    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            break;
        }

        // the terminator may straddle two reads
        let search_from = request_buffer.len().saturating_sub(3);
        request_buffer.extend_from_slice(&buffer[..n]);

        if let Some(end) = header_end(&request_buffer[search_from..]) {
            if search_from + end > MAX_HEADER_BYTES {
                return Err(RequestError::TooLarge(MAX_HEADER_BYTES));
            }
            break;
        }
        if request_buffer.len() > MAX_HEADER_BYTES {
            return Err(RequestError::TooLarge(MAX_HEADER_BYTES));
        }
    }

    if request_buffer.iter().all(u8::is_ascii_whitespace) {
        return Err(RequestError::Empty);
    }

    Ok(request_buffer)
}

pub(crate) async fn parse_request<P: AsyncRead + AsyncWrite + Unpin>(
    conn: &mut P,
    _addr: SocketAddr,
    config: &Config,
) {
    let request = match read_stream(conn).await {
        Ok(buf) => Request::parse(&buf),
        Err(e) => Err(e),
    };

    let (response, head_only) = match request {
        Ok(request) => {
            #[cfg(feature = "log")]
            log::debug!(
                "{} \"{} {} {}\"",
                _addr,
                request.get_raw_method(),
                request.get_target(),
                request.get_version()
            );

            (build_res(&request, config).await, request.is_head())
        }
        Err(RequestError::Empty) => return,
        Err(RequestError::Io(_e)) => {
            #[cfg(feature = "log")]
            log::debug!("{}: failed to read request: {}", _addr, _e);

            return;
        }
        Err(e) => {
            #[cfg(feature = "log")]
            log::debug!("{}: {}", _addr, e);

            let status = match e {
                RequestError::UnsupportedVersion(_) => Status::HttpVersionNotSupported,
                RequestError::TooLarge(_) => Status::RequestHeaderFieldsTooLarge,
                _ => Status::BadRequest,
            };
            (Response::error(status, Some(&e.to_string())), false)
        }
    };

    #[cfg(feature = "log")]
    log::debug!("{} -> {}", _addr, response.status.code());

    if let Err(_e) = response.send(conn, head_only, config.get_headers()).await {
        #[cfg(feature = "log")]
        log::warn!("{}: error on response: {}", _addr, _e);
    }
}

pub(crate) async fn build_res(req: &Request, config: &Config) -> Response {
    match req.get_method() {
        Method::GET | Method::HEAD => {}
        Method::Unsupported => {
            return Response::error(
                Status::NotImplemented,
                Some(&format!("Unsupported method ({})", req.get_raw_method())),
            )
        }
    }

    let Some(root) = config.get_mount() else {
        return Response::error(Status::NotFound, Some("File not found"));
    };

    let translated = mount::translate_path(root, req.get_target());
    serve_path(&translated, req, config).await
}

async fn serve_path(translated: &Translated, req: &Request, config: &Config) -> Response {
    let path = &translated.path;

    if tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        if !translated.trailing_slash {
            return Response::new()
                .status(Status::MovedPermanently)
                .header("Location", translated.redirect_location());
        }

        for index in INDEX_FILES {
            let index_path = path.join(index);
            if tokio::fs::metadata(&index_path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return serve_file(&index_path, req).await;
            }
        }

        if !config.get_dir_listing() {
            return Response::error(Status::Forbidden, Some("Directory listing is disabled"));
        }

        return match listing::list_directory(path, &translated.display_path).await {
            Ok(page) => Response::new()
                .header("Content-Type", "text/html; charset=utf-8")
                .body(page.into_bytes()),
            Err(_e) => {
                #[cfg(feature = "log")]
                log::debug!("cannot list {}: {}", path.display(), _e);

                Response::error(Status::NotFound, Some("No permission to list directory"))
            }
        };
    }

    if translated.trailing_slash {
        return Response::error(Status::NotFound, Some("File not found"));
    }

    serve_file(path, req).await
}

async fn serve_file(path: &Path, req: &Request) -> Response {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(_e) => {
            #[cfg(feature = "log")]
            log::debug!("File not found: {} ({})", path.display(), _e);

            return Response::error(Status::NotFound, Some("File not found"));
        }
    };

    let meta = match file.metadata().await {
        Ok(meta) => meta,
        Err(_e) => {
            #[cfg(feature = "log")]
            log::warn!("cannot stat {}: {}", path.display(), _e);

            return Response::error(Status::InternalServerError, None);
        }
    };

    if !meta.is_file() {
        return Response::error(Status::NotFound, Some("File not found"));
    }

    let modified = meta.modified().ok();

    if let Some(mtime) = modified {
        if is_not_modified(req, mtime) {
            return Response::new().status(Status::NotModified);
        }
    }

    let mime = match mount::guess_mime(path, &mut file).await {
        Ok(mime) => mime,
        Err(_e) => {
            #[cfg(feature = "log")]
            log::warn!("cannot read {}: {}", path.display(), _e);

            return Response::error(Status::InternalServerError, None);
        }
    };

    let mut response = Response::new().header("Content-Type", mime);
    if let Some(mtime) = modified {
        response = response.header("Last-Modified", http_date(mtime));
    }

    response.file(file, meta.len())
}

/// `If-Modified-Since` check, skipped when `If-None-Match` is present.
fn is_not_modified(req: &Request, mtime: std::time::SystemTime) -> bool {
    let headers = req.get_headers();
    if headers.contains("if-none-match") {
        return false;
    }

    let Some(since) = headers.get("if-modified-since").and_then(parse_http_date) else {
        return false;
    };

    chrono::DateTime::<chrono::Utc>::from(mtime).timestamp() <= since.timestamp()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::TempDir;

    use super::*;
    use crate::response::Body;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello, world\n").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("index.html"), "<h1>docs</h1>").unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    fn get(target: &str) -> Request {
        Request::parse(format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", target).as_bytes())
            .unwrap()
    }

    async fn body_of(res: Response) -> Vec<u8> {
        match res.body {
            Body::Empty => Vec::new(),
            Body::Bytes(b) => b,
            Body::File { file, len } => {
                let mut out = Vec::new();
                file.take(len).read_to_end(&mut out).await.unwrap();
                out
            }
        }
    }

    #[tokio::test]
    async fn serves_file_with_type_and_length() {
        let dir = site();
        let config = Config::new().mount_point(dir.path());

        let res = build_res(&get("/hello.txt"), &config).await;

        assert_eq!(res.status, Status::Ok);
        assert_eq!(res.get_header("Content-Type"), Some("text/plain"));
        assert!(res.get_header("Last-Modified").is_some());
        assert_eq!(res.body.len(), 13);
        assert_eq!(body_of(res).await, b"hello, world\n");
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let dir = site();
        let config = Config::new().mount_point(dir.path());

        assert_eq!(
            build_res(&get("/nope.txt"), &config).await.status,
            Status::NotFound
        );
        assert_eq!(
            build_res(&get("/hello.txt/"), &config).await.status,
            Status::NotFound
        );
    }

    #[tokio::test]
    async fn directory_redirects_then_serves_index() {
        let dir = site();
        let config = Config::new().mount_point(dir.path());

        let res = build_res(&get("/docs?v=1"), &config).await;
        assert_eq!(res.status, Status::MovedPermanently);
        assert_eq!(res.get_header("Location"), Some("/docs/?v=1"));
        assert!(res.body.is_empty());

        let res = build_res(&get("/docs/"), &config).await;
        assert_eq!(res.status, Status::Ok);
        assert_eq!(res.get_header("Content-Type"), Some("text/html"));
        assert_eq!(body_of(res).await, b"<h1>docs</h1>");
    }

    #[tokio::test]
    async fn directory_without_index_is_listed_or_forbidden() {
        let dir = site();

        let config = Config::new().mount_point(dir.path());
        let res = build_res(&get("/"), &config).await;
        assert_eq!(res.status, Status::Ok);
        let page = String::from_utf8(body_of(res).await).unwrap();
        assert!(page.contains("Directory listing for /"));
        assert!(page.contains("<a href=\"hello.txt\">hello.txt</a>"));
        assert!(page.contains("<a href=\"docs/\">docs/</a>"));

        let config = config.dir_listing(false);
        let res = build_res(&get("/empty/"), &config).await;
        assert_eq!(res.status, Status::Forbidden);
    }

    #[tokio::test]
    async fn traversal_cannot_escape_mount() {
        let outer = TempDir::new().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "secret").unwrap();
        std::fs::create_dir(outer.path().join("public")).unwrap();
        let config = Config::new().mount_point(outer.path().join("public"));

        for target in ["/../secret.txt", "/%2e%2e/secret.txt", "/a/../../secret.txt"] {
            let res = build_res(&get(target), &config).await;
            assert_eq!(res.status, Status::NotFound, "{}", target);
        }
    }

    #[tokio::test]
    async fn unsupported_method_and_no_mount() {
        let dir = site();
        let config = Config::new().mount_point(dir.path());

        let post = Request::parse(b"POST /hello.txt HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(build_res(&post, &config).await.status, Status::NotImplemented);

        let unmounted = Config::new();
        assert_eq!(
            build_res(&get("/hello.txt"), &unmounted).await.status,
            Status::NotFound
        );
    }

    #[tokio::test]
    async fn conditional_get() {
        let dir = site();
        let config = Config::new().mount_point(dir.path());

        let res = build_res(&get("/hello.txt"), &config).await;
        let last_modified = res.get_header("Last-Modified").unwrap().to_string();

        let req = Request::parse(
            format!(
                "GET /hello.txt HTTP/1.1\r\nIf-Modified-Since: {}\r\n\r\n",
                last_modified
            )
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(build_res(&req, &config).await.status, Status::NotModified);

        let req = Request::parse(
            b"GET /hello.txt HTTP/1.1\r\nIf-Modified-Since: Thu, 01 Jan 1970 00:00:00 GMT\r\n\r\n",
        )
        .unwrap();
        assert_eq!(build_res(&req, &config).await.status, Status::Ok);

        let req = Request::parse(
            format!(
                "GET /hello.txt HTTP/1.1\r\nIf-Modified-Since: {}\r\nIf-None-Match: \"x\"\r\n\r\n",
                last_modified
            )
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(build_res(&req, &config).await.status, Status::Ok);
    }

    #[tokio::test]
    async fn read_stream_stops_at_header_end() {
        let mut conn = Cursor::new(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n".to_vec());
        let buf = read_stream(&mut conn).await.unwrap();
        assert!(buf.ends_with(b"\r\n\r\n"));

        let mut silent = Cursor::new(Vec::new());
        assert!(matches!(
            read_stream(&mut silent).await,
            Err(RequestError::Empty)
        ));

        let mut flood = Cursor::new(vec![b'a'; MAX_HEADER_BYTES + 2048]);
        assert!(matches!(
            read_stream(&mut flood).await,
            Err(RequestError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn header_block_past_the_cap_is_too_large() {
        // terminator lands inside the read that crosses the limit
        let mut request = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        request.resize(MAX_HEADER_BYTES + 500, b'a');
        request.extend_from_slice(b"\r\n\r\n");

        let mut conn = Cursor::new(request);
        assert!(matches!(
            read_stream(&mut conn).await,
            Err(RequestError::TooLarge(_))
        ));

        let mut request = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        request.resize(MAX_HEADER_BYTES - 4, b'a');
        request.extend_from_slice(b"\r\n\r\n");

        let mut conn = Cursor::new(request);
        assert_eq!(
            read_stream(&mut conn).await.unwrap().len(),
            MAX_HEADER_BYTES
        );
    }

    #[tokio::test]
    async fn unknown_extension_is_sniffed_and_served_whole() {
        let dir = TempDir::new().unwrap();
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRrest-of-image".to_vec();
        std::fs::write(dir.path().join("picture"), &png).unwrap();
        let config = Config::new().mount_point(dir.path());

        let res = build_res(&get("/picture"), &config).await;

        assert_eq!(res.get_header("Content-Type"), Some("image/png"));
        assert_eq!(body_of(res).await, png);
    }

    #[tokio::test]
    async fn bad_request_still_gets_trailing_headers() {
        let config = Config::new().cors_all();
        let (mut client, mut server) = tokio::io::duplex(4096);

        tokio::io::AsyncWriteExt::write_all(&mut client, b"NONSENSE\r\n\r\n")
            .await
            .unwrap();
        parse_request(&mut server, "127.0.0.1:1".parse().unwrap(), &config).await;
        drop(server);

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n\r\n"));
    }
}
