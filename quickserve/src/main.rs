use std::{
    io,
    path::{Path, PathBuf},
    process::ExitCode,
};

use quickserve::prelude::*;

const PORT: u16 = DEFAULT_PORT;

fn main() -> ExitCode {
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("quickserve: could not set up logging: {}", e);
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("quickserve: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), ServeError> {
    let root = serving_root()?;
    std::env::set_current_dir(&root).map_err(ServeError::Root)?;

    let config = Config::new()
        .mount_point(root)
        .port(PORT)
        .cors_all()
        .open_browser(true);
    let runtime = config.build_runtime()?;

    runtime.block_on(async move {
        let http = HttpListener::bind(config).await?;

        println!("Serving at {}", http.config.url());
        println!("Press Ctrl+C to stop the server");

        http.start().await;
        Ok::<(), ServeError>(())
    })
}

/// Directory holding the running executable
fn serving_root() -> Result<PathBuf, ServeError> {
    let exe = std::env::current_exe().map_err(ServeError::Root)?;
    let exe = exe.canonicalize().map_err(ServeError::Root)?;

    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        ServeError::Root(io::Error::new(
            io::ErrorKind::NotFound,
            "executable has no parent directory",
        ))
    })
}
