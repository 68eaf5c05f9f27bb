use std::{io, path::Path};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Reads `dir` and renders its HTML index page.
pub async fn list_directory(dir: &Path, display_path: &str) -> io::Result<String> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let file_type = entry.file_type().await?;
        // symlinked directories still link with a trailing slash
        let is_dir = if file_type.is_symlink() {
            tokio::fs::metadata(entry.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
        } else {
            file_type.is_dir()
        };

        entries.push(Entry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
            is_symlink: file_type.is_symlink(),
        });
    }

    Ok(render(entries, display_path))
}

pub fn render(mut entries: Vec<Entry>, display_path: &str) -> String {
    entries.sort_by_cached_key(|e| e.name.to_lowercase());

    let title = format!("Directory listing for {}", html_escape(display_path));
    let mut page = format!(
        "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"
    );

    for entry in entries {
        let mut link = entry.name.clone();
        if entry.is_dir {
            link.push('/');
        }
        let shown = if entry.is_symlink {
            format!("{}@", entry.name)
        } else {
            link.clone()
        };

        page += &format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            percent_encode(&link),
            html_escape(&shown)
        );
    }

    page += "</ul>\n<hr>\n</body>\n</html>\n";
    page
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes everything except unreserved characters and `/`.
pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(b as char)
            }
            b => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
