use std::{future::Future, io, net::SocketAddr, path::PathBuf, pin::Pin, sync::Arc};

use tokio::{net::TcpListener, runtime::Runtime};

use crate::{browser, error::ServeError, http::start_http};

pub const DEFAULT_PORT: u16 = 8000;

pub struct HttpListener {
    pub(crate) socket: TcpListener,
    pub config: Arc<Config>,
}

impl HttpListener {
    pub fn new<P: Into<TcpListener>>(socket: P, config: Config) -> HttpListener {
        HttpListener {
            socket: socket.into(),
            config: Arc::new(config),
        }
    }

    /// Binds `host:port` from the config.
    ///
    /// Must be called from inside a tokio runtime.
    pub async fn bind(config: Config) -> Result<HttpListener, ServeError> {
        let addr = format!("{}:{}", config.get_host(), config.get_port());
        let socket = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;

        #[cfg(feature = "log")]
        log::debug!("bound to {:?}", socket.local_addr());

        Ok(HttpListener::new(socket, config))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves until Ctrl+C.
    pub async fn start(self) {
        self.start_with_shutdown(async {
            if let Err(_e) = tokio::signal::ctrl_c().await {
                #[cfg(feature = "log")]
                log::warn!("cannot listen for Ctrl+C, serving until killed: {}", _e);

                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    /// Serves until `shutdown` resolves. Connections still in flight at that
    /// point are dropped along with the runtime.
    pub async fn start_with_shutdown<F: Future<Output = ()>>(self, shutdown: F) {
        tokio::pin!(shutdown);

        // the Ctrl+C handler is installed on first poll, before the browser starts
        if arm(shutdown.as_mut()).await {
            return;
        }

        if self.config.get_open_browser() {
            browser::open_browser(&self.config.url());
        }

        start_http(self, shutdown).await;
    }
}

/// Polls `shutdown` once. Returns true if it already resolved.
async fn arm<F: Future<Output = ()>>(shutdown: Pin<&mut F>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown => true,
        _ = std::future::ready(()) => false,
    }
}

/// Server settings.
///
/// ### Example:
/// ```ignore
/// let config = Config::new().mount_point(".").cors_all();
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    mount_point: Option<PathBuf>,
    host: String,
    port: u16,
    headers: Vec<(String, String)>,
    dir_listing: bool,
    open_browser: bool,
    threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Config {
    /// Generates default settings: all interfaces, port 8000, no mount point,
    /// directory listing on, no extra headers.
    ///
    /// Without a mount point every request is answered with 404.
    pub fn new() -> Config {
        #[cfg(feature = "log")]
        log::debug!("quickserve version: {}", env!("CARGO_PKG_VERSION"));

        Config {
            mount_point: None,
            host: String::from("0.0.0.0"),
            port: DEFAULT_PORT,
            headers: Vec::new(),
            dir_listing: true,
            open_browser: false,
            threads: num_cpus::get(),
        }
    }

    /// Directory whose contents are served
    ///
    /// ### Example:
    /// ```ignore
    /// let config = Config::new().mount_point(".")
    /// /// if index.html exists in current directory, it will be returned if "/" or "/index.html" is requested.
    /// ```
    pub fn mount_point<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.mount_point = Some(path.into());
        self
    }

    pub fn host<P: Into<String>>(mut self, host: P) -> Self {
        self.host = host.into();
        self
    }

    /// Port 0 lets the OS pick one, see [`HttpListener::local_addr`].
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Define headers appended to every response, after the response's own.
    ///
    /// Setting a header twice keeps the last value. Lines without a `:` are
    /// skipped.
    ///
    /// ```ignore
    /// let config = Config::new().headers(vec!["Access-Control-Allow-Origin: *".into()]);
    /// ```
    pub fn headers(mut self, headers: Vec<String>) -> Self {
        for line in headers {
            match line.split_once(':') {
                Some((name, value)) => self.set_header(name.trim(), value.trim()),
                None => {
                    #[cfg(feature = "log")]
                    log::warn!("ignoring malformed header {:?}", line);
                }
            }
        }
        self
    }

    /// Shorthand for `Access-Control-Allow-Origin: *`
    pub fn cors_all(mut self) -> Self {
        self.set_header("Access-Control-Allow-Origin", "*");
        self
    }

    pub fn dir_listing(mut self, res: bool) -> Self {
        self.dir_listing = res;
        self
    }

    /// Open the default browser at [`Config::url`] once the socket is bound
    pub fn open_browser(mut self, res: bool) -> Self {
        self.open_browser = res;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Runtime the server runs on, sized by [`Config::threads`].
    pub fn build_runtime(&self) -> Result<Runtime, ServeError> {
        #[cfg(feature = "log")]
        log::debug!("Using {} threads", self.threads);

        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.threads)
            .enable_all()
            .build()
            .map_err(ServeError::Runtime)
    }

    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn get_mount(&self) -> Option<&PathBuf> {
        self.mount_point.as_ref()
    }
    pub fn get_host(&self) -> &str {
        &self.host
    }
    pub fn get_port(&self) -> u16 {
        self.port
    }
    pub fn get_headers(&self) -> &[(String, String)] {
        &self.headers
    }
    pub fn get_dir_listing(&self) -> bool {
        self.dir_listing
    }
    pub fn get_open_browser(&self) -> bool {
        self.open_browser
    }
    pub fn get_threads(&self) -> usize {
        self.threads
    }
}
