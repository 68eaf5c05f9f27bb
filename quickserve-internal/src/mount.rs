//! Maps request targets onto the mount point.
//!
//! `..` segments are resolved against the request path before it touches the
//! filesystem, so a translated path can never climb above the mount point.

use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

/// Enough bytes for every signature `infer` knows about.
const SNIFF_LEN: usize = 8192;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Translated {
    /// Location on disk, always under the mount point
    pub path: PathBuf,
    /// Path component of the target as the client sent it
    pub raw_path: String,
    /// Query string without the leading `?`
    pub query: Option<String>,
    /// Percent-decoded path, used in directory listings
    pub display_path: String,
    pub trailing_slash: bool,
}

impl Translated {
    /// Where to send a client that asked for a directory without the
    /// trailing slash.
    pub fn redirect_location(&self) -> String {
        match &self.query {
            Some(q) => format!("{}/?{}", self.raw_path, q),
            None => format!("{}/", self.raw_path),
        }
    }
}

pub fn translate_path<P: AsRef<Path>>(root: P, target: &str) -> Translated {
    let target = target.split('#').next().unwrap_or_default();
    let (raw_path, query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q.to_string())),
        None => (target, None),
    };

    let display_path = percent_decode(raw_path);
    let trailing_slash = display_path.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in display_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if s.contains('\\') => {}
            s => segments.push(s),
        }
    }

    let mut path = root.as_ref().to_path_buf();
    path.extend(segments);

    #[cfg(feature = "log")]
    log::trace!("translate_path -> {} => {}", raw_path, path.display());

    Translated {
        path,
        raw_path: raw_path.to_string(),
        query,
        display_path,
        trailing_slash,
    }
}

/// Decodes `%XX` escapes. Malformed escapes are kept as they are and the
/// result is read as UTF-8, lossily.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push(hex_value(bytes[i + 1]) << 4 | hex_value(bytes[i + 2]));
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// Content type for a file: by extension first, then by magic bytes read
/// from `file`. The file is rewound to the start afterwards.
pub async fn guess_mime(path: &Path, file: &mut File) -> io::Result<String> {
    if let Some(mime) = mime_guess::from_path(path).first_raw() {
        return Ok(mime.to_string());
    }

    Ok(sniff_mime(file)
        .await?
        .unwrap_or_else(|| "application/octet-stream".to_string()))
}

async fn sniff_mime(file: &mut File) -> io::Result<Option<String>> {
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    (&mut *file).take(SNIFF_LEN as u64).read_to_end(&mut buf).await?;
    file.seek(SeekFrom::Start(0)).await?;

    Ok(infer::get(&buf).map(|kind| kind.mime_type().to_string()))
}
