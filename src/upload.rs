//! Streamed multipart upload handler.
//!
//! The request body is consumed buffer by buffer and pushed through
//! [`PartScanner`]; confirmed bytes go straight to the destination handle, so
//! an upload of any size holds only the scanner's bounded window in memory.

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures_util::stream::StreamExt;
use http_body_util::BodyExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::multipart::{PartEvent, PartScanner, boundary_from_content_type};
use crate::paths;
use crate::volume::{Volume, VolumeError, WriteHandle};

/// Receives one file from a `multipart/form-data` body and redirects back to
/// the listing that posted it. A body without a `filename=` part is drained
/// and answered with the same redirect.
pub async fn handle_upload(
    uri: Uri,
    headers: HeaderMap,
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(volume): Extension<Arc<dyn Volume>>,
    body: AxumBody,
) -> Result<Response, ApiError> {
    if !config.upload_enabled {
        return Err(ApiError::Forbidden("upload disabled".into()));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Content-Type header".into()))?;
    let boundary = boundary_from_content_type(content_type)
        .ok_or_else(|| ApiError::BadRequest("missing multipart boundary".into()))?;

    let relative_dir = paths::extract_relative(uri.path(), &config.url_prefix);
    let mut scanner = PartScanner::new(&boundary);
    let mut destination: Option<WriteHandle> = None;
    let mut events = Vec::new();

    // Any early return drops `destination`, releasing the partially-written
    // handle.
    let mut stream = BodyExt::into_data_stream(body);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| ApiError::Internal(err.to_string()))?;
        scanner.feed(&chunk, &mut events)?;
        apply_events(
            &mut events,
            &mut destination,
            volume.as_ref(),
            &config,
            &relative_dir,
        )
        .await?;
    }
    scanner.finish(&mut events);
    apply_events(
        &mut events,
        &mut destination,
        volume.as_ref(),
        &config,
        &relative_dir,
    )
    .await?;

    // Close a destination left open by a body that never carried its closing
    // boundary.
    if let Some(mut handle) = destination.take() {
        handle
            .shutdown()
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
    }

    let location = HeaderValue::from_str(&uri.to_string())
        .map_err(|_| ApiError::Internal("invalid redirect target".into()))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

async fn apply_events(
    events: &mut Vec<PartEvent>,
    destination: &mut Option<WriteHandle>,
    volume: &dyn Volume,
    config: &ServerConfig,
    relative_dir: &str,
) -> Result<(), ApiError> {
    for event in events.drain(..) {
        match event {
            PartEvent::FileOpen(name) => {
                let target = paths::build_absolute(
                    &paths::join(relative_dir, &name),
                    &config.root_path,
                );
                info!(name, target, "upload start");
                let handle = volume.open_for_write(&target).await.map_err(|err| match err {
                    VolumeError::InvalidPath => ApiError::BadRequest("invalid file name".into()),
                    VolumeError::Io(err) => ApiError::Internal(err.to_string()),
                })?;
                *destination = Some(handle);
            }
            PartEvent::Data(data) => {
                if let Some(handle) = destination.as_mut() {
                    handle
                        .write_all(&data)
                        .await
                        .map_err(|err| ApiError::Internal(err.to_string()))?;
                }
            }
            PartEvent::Done => {
                if let Some(mut handle) = destination.take() {
                    handle
                        .shutdown()
                        .await
                        .map_err(|err| ApiError::Internal(err.to_string()))?;
                    info!("upload complete");
                }
            }
        }
    }
    Ok(())
}
