//! Front-end pages
//!
//! Serves the exported front-end from `server.static_dir` for every path
//! no API route claims. The request gate has already run by then.

use std::path::{Path, PathBuf};

use axum::{
    extract::State,
    http::{Uri, header},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::error::AppError;

/// Fallback handler resolving `/<path>` to `<path>.html`,
/// `<path>/index.html` or the file itself
pub async fn serve_page(State(state): State<AppState>, uri: Uri) -> Result<Response, AppError> {
    let Some(candidates) = candidate_paths(&state.config.server.static_dir, uri.path()) else {
        return Err(AppError::NotFound);
    };

    for candidate in candidates {
        match tokio::fs::read(&candidate).await {
            Ok(bytes) => {
                let content_type = content_type_for(&candidate);
                return Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response());
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
            // Directories and unreadable entries fall through to the next candidate.
            Err(error) => {
                tracing::debug!(path = %candidate.display(), %error, "Skipping page candidate");
            }
        }
    }

    Err(AppError::NotFound)
}

/// Files that may serve `path`, most specific first
///
/// Returns `None` for paths that try to leave the static directory.
fn candidate_paths(root: &Path, path: &str) -> Option<Vec<PathBuf>> {
    let relative = path.trim_matches('/');
    if relative
        .split('/')
        .any(|segment| segment == ".." || segment == "." || segment.contains('\\'))
    {
        return None;
    }

    if relative.is_empty() {
        return Some(vec![root.join("index.html")]);
    }

    let base = root.join(relative);
    Some(vec![
        root.join(format!("{relative}.html")),
        base.join("index.html"),
        base,
    ])
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
