use std::io;

use thiserror::Error;

/// Errors that stop the server from starting.
///
/// Anything that goes wrong while answering a single request is turned into
/// an HTTP response instead, see [`crate::request::RequestError`].
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("could not bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("could not enter the serving directory: {0}")]
    Root(#[source] io::Error),
    #[error("could not start the async runtime: {0}")]
    Runtime(#[source] io::Error),
}
