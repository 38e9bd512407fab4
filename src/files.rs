//! Browse, download and delete handlers.

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::{DOWNLOAD_CHUNK_SIZE, ServerConfig};
use crate::error::ApiError;
use crate::paths;
use crate::volume::Volume;

/// GET dispatch: directories render a listing, everything else downloads.
pub async fn handle_get(
    uri: Uri,
    headers: HeaderMap,
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(volume): Extension<Arc<dyn Volume>>,
) -> Result<Response, ApiError> {
    let relative = paths::extract_relative(uri.path(), &config.url_prefix);
    let absolute = paths::build_absolute(&relative, &config.root_path);

    if volume.is_directory(&absolute).await {
        handle_index(&headers, &config, volume.as_ref(), &absolute, &relative).await
    } else {
        handle_download(&config, volume.as_ref(), &absolute).await
    }
}

/// Renders one directory as a complete HTML document, or as JSON when the
/// client asks for it.
async fn handle_index(
    headers: &HeaderMap,
    config: &ServerConfig,
    volume: &dyn Volume,
    absolute: &str,
    relative: &str,
) -> Result<Response, ApiError> {
    if !volume.is_directory(absolute).await {
        return Err(ApiError::NotFound("Not a directory".into()));
    }
    let entries = volume.list(absolute).await?;
    info!(path = relative, count = entries.len(), "list directory");

    if wants_json(headers) {
        return Ok(JsonResponse(entries).into_response());
    }

    let prefix = paths::build_prefix(&config.url_prefix);
    let shown = if relative.is_empty() || relative == "/" {
        "/"
    } else {
        relative
    };

    let mut page = String::with_capacity(4096);
    page.push_str(PAGE_HEAD);
    page.push_str(&format!("<h1>Contents of {}</h1>\n", escape_html(shown)));
    page.push_str("<table>\n<thead><tr><th></th><th>Name</th><th>Size</th><th>Modified</th><th>Actions</th></tr></thead>\n<tbody>\n");

    if !relative.is_empty() && relative != "/" {
        page.push_str(&format!(
            "<tr><td><span class='icon'>&#128193;</span></td><td colspan='4'><a href='{}{}'>..</a></td></tr>\n",
            prefix,
            escape_html(paths::parent_path(relative)),
        ));
    }

    for entry in &entries {
        let link = format!("{}{}", prefix, paths::join(relative, &entry.name));
        let name = escape_html(&entry.name);
        let href = escape_html(&link);
        let modified = entry.modified.as_deref().unwrap_or("-");
        if entry.is_dir {
            page.push_str(&format!(
                "<tr><td><span class='icon'>&#128193;</span></td><td><a href='{href}'>{name}</a></td><td>-</td><td>{modified}</td><td></td></tr>\n",
            ));
        } else {
            page.push_str(&format!(
                "<tr><td><span class='icon'>&#128441;</span></td><td><a href='{href}'>{name}</a></td><td>{} B</td><td>{modified}</td><td>",
                entry.size,
            ));
            if config.deletion_enabled {
                page.push_str(&format!(
                    "<a href='#' class='delete-btn' onclick='if(confirm(\"Delete {name}?\")){{fetch(\"{href}\",{{method:\"DELETE\"}}).then(()=>location.reload())}}'>Delete</a>",
                ));
            }
            page.push_str("</td></tr>\n");
        }
    }

    page.push_str("</tbody>\n</table>\n");
    if config.upload_enabled {
        page.push_str(UPLOAD_FORM);
    }
    page.push_str(PAGE_FOOT);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))],
        page,
    )
        .into_response())
}

/// Streams a file in fixed-size chunks with no predeclared length. A failed
/// chunk send drops the stream, and the read handle with it.
async fn handle_download(
    config: &ServerConfig,
    volume: &dyn Volume,
    absolute: &str,
) -> Result<Response, ApiError> {
    if !config.download_enabled {
        return Err(ApiError::Forbidden("download disabled".into()));
    }
    let reader = volume
        .open_for_read(absolute)
        .await
        .map_err(|_| ApiError::NotFound("file not found".into()))?;
    debug!(path = absolute, "download");

    let stream = ReaderStream::with_capacity(reader, DOWNLOAD_CHUNK_SIZE);
    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(paths::mime_type(absolute)),
        )],
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// Permission-gated removal. The removal call itself is the existence check.
pub async fn handle_delete(
    uri: Uri,
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(volume): Extension<Arc<dyn Volume>>,
) -> Result<Response, ApiError> {
    if !config.deletion_enabled {
        return Err(ApiError::Forbidden("deletion disabled".into()));
    }
    let relative = paths::extract_relative(uri.path(), &config.url_prefix);
    let absolute = paths::build_absolute(&relative, &config.root_path);
    if !volume.remove(&absolute).await {
        return Err(ApiError::Internal("failed to delete".into()));
    }
    info!(path = relative, "deleted");
    Ok((StatusCode::OK, "deleted").into_response())
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Storage Volume</title>
<style>
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 0; background-color: #f4f4f9; color: #333; }
.container { max-width: 800px; margin: 2rem auto; padding: 1rem; background-color: #fff; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
h1, h2 { color: #444; border-bottom: 2px solid #eee; padding-bottom: 10px; }
table { width: 100%; border-collapse: collapse; margin-top: 20px; }
th, td { padding: 12px 15px; text-align: left; border-bottom: 1px solid #ddd; }
th { background-color: #f8f8f8; }
tr:hover { background-color: #f1f1f1; }
a { text-decoration: none; color: #007bff; }
a:hover { text-decoration: underline; }
.icon { display: inline-block; width: 20px; text-align: center; margin-right: 10px; }
.delete-btn { color: #dc3545; cursor: pointer; }
.upload-form { margin-top: 30px; padding: 20px; background-color: #fdfdfd; border: 1px dashed #ccc; border-radius: 5px; }
.upload-form input[type='file'] { margin-bottom: 10px; }
.upload-form input[type='submit'] { padding: 10px 15px; background-color: #28a745; color: white; border: none; border-radius: 5px; cursor: pointer; }
.upload-form input[type='submit']:hover { background-color: #218838; }
</style>
</head>
<body>
<div class="container">
"#;

const UPLOAD_FORM: &str = r#"<div class="upload-form">
<h2>Upload</h2>
<form method='post' action='' enctype='multipart/form-data'>
<input type='file' name='file' required>
<input type='submit' value='Send'>
</form>
</div>
"#;

const PAGE_FOOT: &str = "</div>\n</body>\n</html>\n";
