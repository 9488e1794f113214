//! Static file serving module
//!
//! Serves the frontend's own files from the base directory: plain files,
//! index files, and a directory listing when no index exists.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::fs;

use crate::config::AppState;
use crate::http::{self, mime};
use crate::logger;

/// Characters escaped in listing links
const HREF_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// Outcome of mapping a request path onto the base directory
#[derive(Debug, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    /// Directory requested without trailing slash
    Redirect(String),
    /// Directory without an index file
    Listing(PathBuf),
    NotFound,
}

/// Serve `request_path` from the configured base directory
pub async fn serve(
    request_path: &str,
    query: Option<&str>,
    is_head: bool,
    state: &AppState,
) -> Response<Full<Bytes>> {
    let resolved = resolve(
        &state.static_dir,
        request_path,
        &state.config.http.index_files,
    )
    .await;

    match resolved {
        Resolved::File(path) => serve_file(&path, is_head).await,
        Resolved::Redirect(target) => {
            http::build_redirect_response(&redirect_location(target, query))
        }
        Resolved::Listing(dir) => match render_listing(&dir, request_path).await {
            Some(html) => http::build_html_response(html, is_head),
            None => http::build_404_response(),
        },
        Resolved::NotFound => http::build_404_response(),
    }
}

/// Map a request path to a file, redirect, listing, or nothing
pub async fn resolve(base_dir: &Path, request_path: &str, index_files: &[String]) -> Resolved {
    let Some(decoded) = decode_path(request_path) else {
        return Resolved::NotFound;
    };

    let relative = Path::new(decoded.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        logger::log_warning(&format!("Path traversal attempt blocked: {request_path}"));
        return Resolved::NotFound;
    }

    let candidate = base_dir.join(relative);
    let Ok(metadata) = fs::metadata(&candidate).await else {
        return Resolved::NotFound;
    };

    if !within_base(base_dir, &candidate).await {
        logger::log_warning(&format!(
            "Path escapes static directory: {request_path} -> {}",
            candidate.display()
        ));
        return Resolved::NotFound;
    }

    if metadata.is_file() {
        return Resolved::File(candidate);
    }

    if !request_path.ends_with('/') {
        // A leading `//` would make the Location protocol-relative
        return Resolved::Redirect(format!("/{}/", request_path.trim_start_matches('/')));
    }

    for index_file in index_files {
        let index_path = candidate.join(index_file);
        if fs::metadata(&index_path).await.is_ok_and(|m| m.is_file()) {
            return Resolved::File(index_path);
        }
    }

    Resolved::Listing(candidate)
}

fn redirect_location(mut target: String, query: Option<&str>) -> String {
    if let Some(q) = query {
        target.push('?');
        target.push_str(q);
    }
    target
}

/// Percent-decode the path; `None` when it is not valid UTF-8
fn decode_path(request_path: &str) -> Option<String> {
    percent_decode_str(request_path)
        .decode_utf8()
        .ok()
        .map(std::borrow::Cow::into_owned)
}

/// Symlinks may still point outside the base directory
async fn within_base(base_dir: &Path, candidate: &Path) -> bool {
    let Ok(base) = fs::canonicalize(base_dir).await else {
        logger::log_warning(&format!(
            "Static directory not found or inaccessible '{}'",
            base_dir.display()
        ));
        return false;
    };
    fs::canonicalize(candidate)
        .await
        .is_ok_and(|resolved| resolved.starts_with(&base))
}

async fn serve_file(path: &Path, is_head: bool) -> Response<Full<Bytes>> {
    let content = match fs::read(path).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
            return http::build_404_response();
        }
    };

    let last_modified = fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
        .map(http_date);

    let content_type = mime::get_content_type(path.extension().and_then(|e| e.to_str()));
    http::build_file_response(content, content_type, last_modified.as_deref(), is_head)
}

/// Format a timestamp as an HTTP date (RFC 7231 IMF-fixdate)
fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Render an HTML listing of `dir`; entries sorted case-insensitively
async fn render_listing(dir: &Path, request_path: &str) -> Option<String> {
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) => {
            logger::log_error(&format!("Failed to list '{}': {e}", dir.display()));
            return None;
        }
    };

    let mut names = Vec::new();
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort_by_key(|n| n.to_lowercase());

    let title = format!(
        "Directory listing for {}",
        escape_html(&decode_path(request_path).unwrap_or_else(|| request_path.to_string()))
    );

    let mut html = format!(
        "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"
    );
    for name in &names {
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            utf8_percent_encode(name, HREF_ENCODE_SET),
            escape_html(name)
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    Some(html)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
