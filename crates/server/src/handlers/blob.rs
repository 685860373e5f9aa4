//! Signed blob and archive-entry downloads.

use crate::content_type;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use satchel_core::CapabilityToken;
use satchel_mount::{ArchiveMount, EntryStream, MountError};
use satchel_storage::ObjectStream;
use std::sync::Arc;
use tracing::{debug, instrument};

/// GET /{token}/{signature}/{filename} - stream a blob or archive entry.
///
/// The token is verified before anything else is looked at. Archive tokens
/// serve the named entry from the mounted archive; plain tokens serve the
/// blob itself, provided the requested filename is the one the token names.
#[instrument(skip_all, fields(filename = %filename))]
pub async fn get_blob(
    State(state): State<AppState>,
    Path((token, signature, filename)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let token = match state.verifier.verify(&token, &signature) {
        Ok(token) => token,
        Err(e) => {
            let err = ApiError::from(e);
            metrics::record_blob_request("rejected", err.status_code());
            return Err(err);
        }
    };

    let (kind, result) = if token.is_archive {
        ("archive", serve_entry(&state, &token, &filename).await)
    } else {
        ("plain", serve_plain(&state, &token, &filename).await)
    };

    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status_code(),
    };
    metrics::record_blob_request(kind, status);
    result
}

async fn mount(state: &AppState, hash: &str) -> ApiResult<Arc<ArchiveMount>> {
    match state.mounts.get_with_outcome(hash).await {
        Ok((mount, outcome)) => {
            metrics::record_mount_load(outcome.as_str());
            Ok(mount)
        }
        Err(e) => {
            metrics::record_mount_load("failed");
            Err(e.into())
        }
    }
}

async fn open_entry(state: &AppState, hash: &str, filename: &str) -> ApiResult<EntryStream> {
    let archive = mount(state, hash).await?;
    match archive.open_entry_stream(filename).await {
        // Destroyed between lookup and open; the next lookup replaces it
        Err(MountError::NotActive(_)) => {
            debug!(hash = %hash, "Mount went inactive before open, retrying once");
            let archive = mount(state, hash).await?;
            Ok(archive.open_entry_stream(filename).await?)
        }
        other => Ok(other?),
    }
}

async fn serve_entry(
    state: &AppState,
    token: &CapabilityToken,
    filename: &str,
) -> ApiResult<Response> {
    let stream = open_entry(state, &token.hash, filename).await?;
    let length = stream.uncompressed_size();

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type::for_filename(filename)),
            (CONTENT_LENGTH, length.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn serve_plain(
    state: &AppState,
    token: &CapabilityToken,
    filename: &str,
) -> ApiResult<Response> {
    if token.filename.as_deref() != Some(filename) {
        return Err(ApiError::NotFound(format!("no such file: {filename}")));
    }

    let ObjectStream { meta, body } = state.blobs.fetch(&token.hash).await?;

    let content_type = token
        .content_type_header()
        .or(meta.content_type)
        .unwrap_or_else(|| content_type::for_filename(filename));

    let mut response = (
        StatusCode::OK,
        [(CONTENT_TYPE, content_type)],
        Body::from_stream(body),
    )
        .into_response();
    // Zero may mean unknown (S3 without a length); let the body be chunked
    if meta.size > 0 {
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, meta.size.into());
    }
    Ok(response)
}
