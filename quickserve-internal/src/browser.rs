/// Tries to open `url` in the default browser without waiting for it.
///
/// Returns whether a launcher was started. Failures (no display, no browser,
/// sandboxing) are only visible at debug level and never reach the caller.
pub fn open_browser(url: &str) -> bool {
    match open::that_detached(url) {
        Ok(()) => {
            #[cfg(feature = "log")]
            log::debug!("opened browser at {}", url);

            true
        }
        Err(_e) => {
            #[cfg(feature = "log")]
            log::debug!("could not open browser at {}: {}", url, _e);

            false
        }
    }
}
