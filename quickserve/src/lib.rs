//! # quickserve
//!
//! `quickserve` serves a directory over plain HTTP and adds
//! `Access-Control-Allow-Origin: *` to every response, so pages loaded from it
//! can `fetch` their own assets from any origin.
//!
//! The `quickserve` binary serves the directory it lives in on port 8000 and
//! tries to open a browser there. The library lets you do the same with any
//! directory and port.

//! # Example
//! ```no_run
//! use quickserve::prelude::*;
//!
//! fn main() -> Result<(), ServeError> {
//!     let config = Config::new().mount_point(".").port(9001).cors_all();
//!     let runtime = config.build_runtime()?;
//!
//!     runtime.block_on(async move {
//!         let http = HttpListener::bind(config).await?;
//!         http.start().await;
//!         Ok::<(), ServeError>(())
//!     })
//! }
//! ```

pub use quickserve_internal as internal;

pub mod prelude {
    pub use quickserve_internal::config::*;
    pub use quickserve_internal::error::ServeError;
    pub use quickserve_internal::request::Request;
    pub use quickserve_internal::response::{Response, Status};
}
