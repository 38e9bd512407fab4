//! Textual path handling for the URL namespace.
//!
//! Paths come in two shapes: the *relative* path as seen by the client (URL
//! prefix already stripped) and the *absolute* path on the storage volume
//! (relative path appended to the configured root). All functions here are
//! pure string manipulation; mapping onto the mount directory and traversal
//! checks happen in the volume layer.

/// Returns the configured URL prefix with its leading slash, e.g. `/files`.
pub fn build_prefix(url_prefix: &str) -> String {
    format!("/{}", url_prefix.trim_matches('/'))
}

/// Strips the URL prefix from a request path.
///
/// A path that does not carry the prefix is returned unchanged rather than
/// rejected, so a server mounted without a prefix keeps working.
pub fn extract_relative(uri_path: &str, url_prefix: &str) -> String {
    let prefix = build_prefix(url_prefix);
    match uri_path.strip_prefix(prefix.as_str()) {
        Some(rest) => rest.to_string(),
        None => uri_path.to_string(),
    }
}

/// Joins the volume root and a relative path, collapsing `//` runs.
pub fn build_absolute(relative: &str, root: &str) -> String {
    let mut path = format!("{root}{relative}");
    while path.len() > 1 && path.contains("//") {
        path = path.replacen("//", "/", 1);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Strips the final `/segment`; root-ish inputs map to `/`.
pub fn parent_path(path: &str) -> &str {
    if path.is_empty() || path == "/" {
        return "/";
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &trimmed[..pos],
    }
}

/// Appends a file name below a base path.
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() || base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Content type by file extension. Exact, case-sensitive matches against a
/// fixed table; anything else is served as an opaque byte stream.
pub fn mime_type(path: &str) -> &'static str {
    let Some(pos) = path.rfind('.') else {
        return "application/octet-stream";
    };
    match &path[pos..] {
        ".html" | ".htm" => "text/html",
        ".css" => "text/css",
        ".js" => "application/javascript",
        ".json" => "application/json",
        ".txt" => "text/plain",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".svg" => "image/svg+xml",
        ".ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}
